use anyhow::Context;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use procwatch_protocol::{ServiceTimeouts, DEFAULT_PROGRESS_TYPE};

const DEFAULT_CANDIDATES: &[&str] = &["http://localhost:5002", "http://127.0.0.1:5002"];
const DEFAULT_HEALTH_PATH: &str = "/health";
const DEFAULT_EVENT_LOG_CAPACITY: usize = 200;
const DEFAULT_RECONCILE_INTERVAL: Duration = Duration::from_secs(15);
const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(3);
const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_COMMAND_GRACE: Duration = Duration::from_secs(10);
const DEFAULT_RESTART_DELAY: Duration = Duration::from_secs(2);
const DEFAULT_START_HINT: &str =
    "start the backend manually (for example `python backend/server.py`), then wait for the next status check";
const DEFAULT_STOP_HINT: &str =
    "stop the backend process manually (Ctrl-C in its terminal or kill its pid)";

#[derive(Debug, Default, Deserialize)]
pub struct MonitorFileConfig {
    pub candidates: Option<Vec<String>>,
    pub health_path: Option<String>,
    pub stream_url: Option<String>,
    pub manual_start_hint: Option<String>,
    pub manual_stop_hint: Option<String>,
    pub offline_error_threshold: Option<u32>,
    pub fetch_remote_config: Option<bool>,
    pub timing: Option<TimingFileConfig>,
    pub stream: Option<StreamFileConfig>,
}

#[derive(Debug, Default, Deserialize)]
pub struct TimingFileConfig {
    pub reconcile_interval: Option<String>,
    pub probe_timeout: Option<String>,
    pub command_timeout: Option<String>,
    pub command_grace: Option<String>,
    pub restart_delay: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct StreamFileConfig {
    pub event_log_capacity: Option<usize>,
    pub progress_type: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Timing {
    pub reconcile_interval: Duration,
    pub probe_timeout: Duration,
    pub command_timeout: Duration,
    /// How long a command may stay in flight before the loop probes anyway.
    pub command_grace: Duration,
    pub restart_delay: Duration,
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            reconcile_interval: DEFAULT_RECONCILE_INTERVAL,
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
            command_timeout: DEFAULT_COMMAND_TIMEOUT,
            command_grace: DEFAULT_COMMAND_GRACE,
            restart_delay: DEFAULT_RESTART_DELAY,
        }
    }
}

impl Timing {
    /// Remote `/config` values win over the local file.
    pub fn apply_remote(&mut self, remote: &ServiceTimeouts) {
        if let Some(timeout) = remote.health_check_timeout() {
            self.probe_timeout = timeout;
        }
        if let Some(timeout) = remote.command_timeout() {
            self.command_timeout = timeout;
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ManualHints {
    pub start: String,
    pub stop: String,
}

impl Default for ManualHints {
    fn default() -> Self {
        Self {
            start: DEFAULT_START_HINT.to_string(),
            stop: DEFAULT_STOP_HINT.to_string(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MonitorConfig {
    /// Base urls tried in order, e.g. `http://localhost:5002`.
    pub candidates: Vec<String>,
    pub health_path: String,
    pub stream_url: Option<String>,
    pub hints: ManualHints,
    pub timing: Timing,
    pub event_log_capacity: usize,
    pub progress_type: String,
    pub offline_error_threshold: Option<u32>,
    pub fetch_remote_config: bool,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            candidates: DEFAULT_CANDIDATES
                .iter()
                .map(|candidate| candidate.to_string())
                .collect(),
            health_path: DEFAULT_HEALTH_PATH.to_string(),
            stream_url: None,
            hints: ManualHints::default(),
            timing: Timing::default(),
            event_log_capacity: DEFAULT_EVENT_LOG_CAPACITY,
            progress_type: DEFAULT_PROGRESS_TYPE.to_string(),
            offline_error_threshold: None,
            fetch_remote_config: false,
        }
    }
}

impl MonitorConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.candidates.is_empty() {
            anyhow::bail!("config must include at least one candidate endpoint");
        }
        if let Some(empty) = self.candidates.iter().position(|c| c.trim().is_empty()) {
            anyhow::bail!("candidate #{empty} is empty");
        }
        if self.event_log_capacity == 0 {
            anyhow::bail!("stream.event_log_capacity must be at least 1");
        }
        if self.timing.reconcile_interval.is_zero() {
            anyhow::bail!("timing.reconcile_interval must be greater than zero");
        }
        if self.timing.probe_timeout.is_zero() || self.timing.command_timeout.is_zero() {
            anyhow::bail!("timing timeouts must be greater than zero");
        }
        if self.offline_error_threshold == Some(0) {
            anyhow::bail!("offline_error_threshold must be at least 1 when set");
        }
        Ok(())
    }

    /// Base used for lifecycle and config calls when nothing is confirmed yet.
    pub fn primary_base(&self) -> &str {
        self.candidates
            .first()
            .map(String::as_str)
            .unwrap_or(DEFAULT_CANDIDATES[0])
    }
}

pub fn load_monitor_config(path: &Path) -> anyhow::Result<MonitorConfig> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config {}", path.display()))?;
    let file: MonitorFileConfig = toml::from_str(&raw)
        .with_context(|| format!("failed to parse config {}", path.display()))?;
    resolve_monitor_config(file)
}

pub fn resolve_monitor_config(file: MonitorFileConfig) -> anyhow::Result<MonitorConfig> {
    let defaults = MonitorConfig::default();
    let timing_file = file.timing.unwrap_or_default();
    let stream_file = file.stream.unwrap_or_default();
    let timing = Timing {
        reconcile_interval: parse_duration_field(
            "timing.reconcile_interval",
            timing_file.reconcile_interval,
            defaults.timing.reconcile_interval,
        )?,
        probe_timeout: parse_duration_field(
            "timing.probe_timeout",
            timing_file.probe_timeout,
            defaults.timing.probe_timeout,
        )?,
        command_timeout: parse_duration_field(
            "timing.command_timeout",
            timing_file.command_timeout,
            defaults.timing.command_timeout,
        )?,
        command_grace: parse_duration_field(
            "timing.command_grace",
            timing_file.command_grace,
            defaults.timing.command_grace,
        )?,
        restart_delay: parse_duration_field(
            "timing.restart_delay",
            timing_file.restart_delay,
            defaults.timing.restart_delay,
        )?,
    };
    let config = MonitorConfig {
        candidates: file.candidates.unwrap_or(defaults.candidates),
        health_path: file.health_path.unwrap_or(defaults.health_path),
        stream_url: file.stream_url.filter(|url| !url.trim().is_empty()),
        hints: ManualHints {
            start: file.manual_start_hint.unwrap_or(defaults.hints.start),
            stop: file.manual_stop_hint.unwrap_or(defaults.hints.stop),
        },
        timing,
        event_log_capacity: stream_file
            .event_log_capacity
            .unwrap_or(defaults.event_log_capacity),
        progress_type: stream_file.progress_type.unwrap_or(defaults.progress_type),
        offline_error_threshold: file.offline_error_threshold,
        fetch_remote_config: file.fetch_remote_config.unwrap_or(false),
    };
    config.validate()?;
    Ok(config)
}

fn parse_duration_field(
    field: &str,
    raw: Option<String>,
    default: Duration,
) -> anyhow::Result<Duration> {
    match raw {
        None => Ok(default),
        Some(raw) => humantime::parse_duration(raw.trim())
            .with_context(|| format!("invalid duration for {field}: {raw:?}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_uses_defaults() {
        let file: MonitorFileConfig = toml::from_str("").expect("parse");
        let config = resolve_monitor_config(file).expect("resolve");
        assert_eq!(config, MonitorConfig::default());
        assert_eq!(config.primary_base(), "http://localhost:5002");
    }

    #[test]
    fn parses_humantime_durations() {
        let file: MonitorFileConfig = toml::from_str(
            r#"
candidates = ["http://10.0.0.5:8000"]
stream_url = "ws://10.0.0.5:8000/ws"
offline_error_threshold = 4

[timing]
reconcile_interval = "5s"
probe_timeout = "750ms"

[stream]
event_log_capacity = 3
progress_type = "orchestration_step"
"#,
        )
        .expect("parse");
        let config = resolve_monitor_config(file).expect("resolve");
        assert_eq!(config.timing.reconcile_interval, Duration::from_secs(5));
        assert_eq!(config.timing.probe_timeout, Duration::from_millis(750));
        assert_eq!(config.timing.command_timeout, DEFAULT_COMMAND_TIMEOUT);
        assert_eq!(config.event_log_capacity, 3);
        assert_eq!(config.progress_type, "orchestration_step");
        assert_eq!(config.offline_error_threshold, Some(4));
        assert_eq!(config.stream_url.as_deref(), Some("ws://10.0.0.5:8000/ws"));
    }

    #[test]
    fn rejects_invalid_values() {
        let file: MonitorFileConfig = toml::from_str("candidates = []").expect("parse");
        assert!(resolve_monitor_config(file).is_err());

        let file: MonitorFileConfig =
            toml::from_str("[stream]\nevent_log_capacity = 0").expect("parse");
        assert!(resolve_monitor_config(file).is_err());

        let file: MonitorFileConfig =
            toml::from_str("[timing]\nprobe_timeout = \"soon\"").expect("parse");
        let err = resolve_monitor_config(file).unwrap_err();
        assert!(err.to_string().contains("timing.probe_timeout"));
    }

    #[test]
    fn remote_timeouts_override_local_ones() {
        let mut timing = Timing::default();
        timing.apply_remote(&ServiceTimeouts {
            health_check_timeout_secs: Some(1),
            command_timeout_secs: Some(90),
            generation_timeout_secs: Some(300),
        });
        assert_eq!(timing.probe_timeout, Duration::from_secs(1));
        assert_eq!(timing.command_timeout, Duration::from_secs(90));
    }
}
