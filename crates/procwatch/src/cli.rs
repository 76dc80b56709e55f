use clap::{Args as ClapArgs, Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(
    name = "procwatch",
    version,
    about = "Watch, start and stop a remote process through its HTTP health and control endpoints"
)]
pub(crate) struct Args {
    /// TOML monitor config; built-in defaults are used when omitted.
    #[arg(long)]
    pub(crate) config: Option<PathBuf>,
    /// Candidate base url, tried in order. Replaces the configured list.
    #[arg(long = "candidate", value_name = "URL")]
    pub(crate) candidates: Vec<String>,
    #[arg(long, value_name = "URL")]
    pub(crate) stream_url: Option<String>,
    /// Remembers the last confirmed endpoint and tries it first next time.
    #[arg(long, value_name = "PATH")]
    pub(crate) prefs: Option<PathBuf>,
    #[arg(long)]
    pub(crate) log_dir: Option<PathBuf>,
    #[arg(long, default_value_t = false)]
    pub(crate) log_to_stderr: bool,
    #[command(subcommand)]
    pub(crate) command: Command,
}

#[derive(Subcommand, Debug)]
pub(crate) enum Command {
    /// Print status changes and progress events until Ctrl-C.
    Watch {
        /// Unit whose progress events are printed.
        #[arg(long = "unit", value_name = "ID")]
        units: Vec<String>,
    },
    /// Probe the candidates once and print the verdict.
    Probe,
    Start(WaitArgs),
    Stop(WaitArgs),
    /// Stop, pause, then start.
    Restart(WaitArgs),
    /// Read or write the service's tunable timeouts.
    Config {
        #[command(subcommand)]
        action: ConfigCommand,
    },
}

#[derive(ClapArgs, Debug)]
pub(crate) struct WaitArgs {
    /// How long to wait for the status to settle after the command.
    #[arg(long, default_value = "30s", value_parser = humantime::parse_duration)]
    pub(crate) wait: Duration,
}

#[derive(Subcommand, Debug)]
pub(crate) enum ConfigCommand {
    Show,
    Set {
        #[arg(long, value_name = "SECS")]
        generation_timeout: Option<u64>,
        #[arg(long, value_name = "SECS")]
        health_check_timeout: Option<u64>,
        #[arg(long, value_name = "SECS")]
        command_timeout: Option<u64>,
    },
}
