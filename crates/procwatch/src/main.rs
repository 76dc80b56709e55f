mod cli;
mod render;

use std::io::IsTerminal;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use procwatch::{
    fetch_service_timeouts, load_monitor_config, prefer_endpoint, save_service_timeouts,
    HttpTransport, Monitor, MonitorConfig, MonitorEvent, PreferenceStore, Preferences, Prober,
    ProcessStatus, TomlPreferenceStore, Transport,
};
use procwatch_protocol::ServiceTimeouts;
use tokio::sync::broadcast;
use tracing::{info, warn};

use crate::cli::{Args, Command, ConfigCommand, WaitArgs};

/// Upper bound on the reconcile interval while waiting for a command to settle.
const SETTLE_POLL_INTERVAL: Duration = Duration::from_secs(1);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let _log_guard = procwatch::logging::init_tracing(args.log_dir.as_deref(), args.log_to_stderr)?;

    let mut config = match &args.config {
        Some(path) => load_monitor_config(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => MonitorConfig::default(),
    };
    if !args.candidates.is_empty() {
        config.candidates = args.candidates.clone();
    }
    if let Some(stream_url) = &args.stream_url {
        config.stream_url = Some(stream_url.clone());
    }
    let prefs = args.prefs.as_ref().map(TomlPreferenceStore::new);
    if let Some(store) = &prefs {
        match store.load() {
            Ok(saved) => config.candidates = prefer_endpoint(&config.candidates, &saved),
            Err(err) => warn!(event = "prefs.load_failed", error = %err),
        }
    }
    config.validate()?;

    let transport: Arc<dyn Transport> =
        Arc::new(HttpTransport::new().context("failed to build http client")?);
    let color = std::io::stdout().is_terminal();

    info!(
        event = "procwatch.starting",
        command = ?args.command,
        candidates = ?config.candidates,
    );

    match args.command {
        Command::Watch { units } => {
            let status = watch(&config, transport, &units, color).await?;
            remember_endpoint(prefs.as_ref(), &status);
        }
        Command::Probe => {
            let prober = Prober::new(
                transport,
                config.health_path.clone(),
                config.timing.probe_timeout,
            );
            let result = prober.probe(&config.candidates).await;
            println!("{}", render::probe_verdict(&result, color));
            let reachable = result?;
            remember_endpoint(
                prefs.as_ref(),
                &ProcessStatus {
                    base: Some(reachable.base),
                    ..ProcessStatus::default()
                },
            );
        }
        Command::Start(wait) => {
            let status = run_command(&config, transport, Lifecycle::Start, wait, color).await?;
            remember_endpoint(prefs.as_ref(), &status);
        }
        Command::Stop(wait) => {
            let status = run_command(&config, transport, Lifecycle::Stop, wait, color).await?;
            remember_endpoint(prefs.as_ref(), &status);
        }
        Command::Restart(wait) => {
            let status = run_command(&config, transport, Lifecycle::Restart, wait, color).await?;
            remember_endpoint(prefs.as_ref(), &status);
        }
        Command::Config { action } => {
            let base = config.primary_base().to_string();
            let timeout = config.timing.probe_timeout;
            let timeouts = match action {
                ConfigCommand::Show => fetch_service_timeouts(transport.as_ref(), &base, timeout)
                    .await
                    .with_context(|| format!("failed to read config from {base}"))?,
                ConfigCommand::Set {
                    generation_timeout,
                    health_check_timeout,
                    command_timeout,
                } => {
                    let update = ServiceTimeouts {
                        generation_timeout_secs: generation_timeout,
                        health_check_timeout_secs: health_check_timeout,
                        command_timeout_secs: command_timeout,
                    };
                    if update.is_empty() {
                        anyhow::bail!("config set needs at least one value to change");
                    }
                    save_service_timeouts(transport.as_ref(), &base, &update, timeout)
                        .await
                        .with_context(|| format!("failed to write config to {base}"))?
                }
            };
            println!("{}", serde_json::to_string_pretty(&timeouts)?);
        }
    }
    Ok(())
}

#[derive(Clone, Copy, Debug)]
enum Lifecycle {
    Start,
    Stop,
    Restart,
}

async fn watch(
    config: &MonitorConfig,
    transport: Arc<dyn Transport>,
    units: &[String],
    color: bool,
) -> anyhow::Result<ProcessStatus> {
    let monitor = Monitor::mount(config, transport).await;
    let mut events = monitor.events();
    if !units.is_empty() {
        if monitor.listener().is_none() {
            warn!(event = "watch.no_stream", "no stream_url configured; progress is not shown");
        }
        for unit in units {
            monitor.subscribe(unit);
        }
        monitor.reconnect();
    }
    println!("{}", render::status_line(&monitor.status().view(), color));

    loop {
        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                signal.context("failed to listen for ctrl-c")?;
                break;
            }
            event = events.recv() => match event {
                Ok(MonitorEvent::StatusChanged { status }) => {
                    println!("{}", render::status_line(&status, color));
                }
                Ok(MonitorEvent::Progress { event }) => {
                    if units.iter().any(|unit| unit == &event.unit_id) {
                        println!("{}", render::progress_line(&event));
                    }
                }
                Ok(MonitorEvent::Stream { state }) => {
                    println!("{}", render::stream_line(state));
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(event = "watch.lagged", skipped);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
        }
    }

    let status = monitor.status();
    monitor.teardown().await;
    Ok(status)
}

async fn run_command(
    config: &MonitorConfig,
    transport: Arc<dyn Transport>,
    lifecycle: Lifecycle,
    wait: WaitArgs,
    color: bool,
) -> anyhow::Result<ProcessStatus> {
    let mut config = config.clone();
    config.timing.reconcile_interval = config.timing.reconcile_interval.min(SETTLE_POLL_INTERVAL);
    let monitor = Monitor::mount(&config, transport).await;
    let mut events = monitor.events();

    // Let the first probe land so commands go to the endpoint that answered.
    let first_probe_budget =
        monitor.timing().probe_timeout * config.candidates.len() as u32 + Duration::from_secs(1);
    let _ = tokio::time::timeout(first_probe_budget, next_status(&mut events)).await;
    println!("{}", render::status_line(&monitor.status().view(), color));

    let commands = monitor.commands();
    let result = match lifecycle {
        Lifecycle::Start => commands.start().await,
        Lifecycle::Stop => commands.stop().await,
        Lifecycle::Restart => commands.restart().await,
    };
    match &result {
        Ok(receipt) => {
            let message = receipt.message.as_deref().unwrap_or("accepted");
            println!("{}: {message}", receipt.command);
        }
        Err(err) => {
            let err = err.clone();
            println!("{}", render::status_line(&monitor.status().view(), color));
            monitor.teardown().await;
            return Err(err.into());
        }
    }

    let settled = tokio::time::timeout(wait.wait, async {
        loop {
            if !monitor.status().state.is_transitional() {
                break;
            }
            if next_status(&mut events).await.is_none() {
                break;
            }
        }
    })
    .await;
    let status = monitor.status();
    println!("{}", render::status_line(&status.view(), color));
    monitor.teardown().await;
    if settled.is_err() {
        anyhow::bail!(
            "status did not settle within {}",
            humantime::format_duration(wait.wait)
        );
    }
    Ok(status)
}

async fn next_status(
    events: &mut broadcast::Receiver<MonitorEvent>,
) -> Option<procwatch::StatusView> {
    loop {
        match events.recv().await {
            Ok(MonitorEvent::StatusChanged { status }) => return Some(status),
            Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => continue,
            Err(broadcast::error::RecvError::Closed) => return None,
        }
    }
}

fn remember_endpoint(store: Option<&TomlPreferenceStore>, status: &ProcessStatus) {
    let (Some(store), Some(base)) = (store, status.base.as_ref()) else {
        return;
    };
    let prefs = Preferences {
        last_endpoint: Some(base.clone()),
    };
    if let Err(err) = store.save(&prefs) {
        warn!(event = "prefs.save_failed", path = %store.path().display(), error = %err);
    }
}
