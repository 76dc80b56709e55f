use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::SystemTime;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessState {
    Stopped,
    Starting,
    Running,
    Stopping,
    Error,
}

impl ProcessState {
    pub fn badge(self) -> Badge {
        match self {
            ProcessState::Running => Badge::Online,
            ProcessState::Stopped => Badge::Offline,
            ProcessState::Starting => Badge::Starting,
            ProcessState::Stopping => Badge::Stopping,
            ProcessState::Error => Badge::Error,
        }
    }

    pub fn is_transitional(self) -> bool {
        matches!(self, ProcessState::Starting | ProcessState::Stopping)
    }
}

/// What the user sees: one colored badge.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Badge {
    Online,
    Offline,
    Starting,
    Stopping,
    Error,
}

impl fmt::Display for Badge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Badge::Online => "online",
            Badge::Offline => "offline",
            Badge::Starting => "starting",
            Badge::Stopping => "stopping",
            Badge::Error => "error",
        };
        f.pad(label)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ProcessStatus {
    pub state: ProcessState,
    pub detail: Option<String>,
    /// Health url last confirmed reachable.
    pub endpoint: Option<String>,
    /// Base of `endpoint`, used for lifecycle and config calls.
    pub base: Option<String>,
    pub last_confirmed_at: Option<SystemTime>,
    pub last_failed_at: Option<SystemTime>,
    pub generation: u64,
}

impl Default for ProcessStatus {
    fn default() -> Self {
        Self {
            state: ProcessState::Stopped,
            detail: None,
            endpoint: None,
            base: None,
            last_confirmed_at: None,
            last_failed_at: None,
            generation: 0,
        }
    }
}

impl ProcessStatus {
    pub fn view(&self) -> StatusView {
        StatusView {
            state: self.state,
            badge: self.state.badge(),
            detail: self.detail.clone(),
            endpoint: self.endpoint.clone(),
            last_confirmed_at: self.last_confirmed_at.map(format_time),
            generation: self.generation,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct StatusView {
    pub state: ProcessState,
    pub badge: Badge,
    pub detail: Option<String>,
    pub endpoint: Option<String>,
    pub last_confirmed_at: Option<String>,
    pub generation: u64,
}

fn format_time(time: SystemTime) -> String {
    humantime::format_rfc3339_seconds(time).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn badge_honors_width_and_alignment() {
        assert_eq!(format!("{:<8}|", Badge::Error), "error   |");
        assert_eq!(format!("{:>8}|", Badge::Online), "  online|");
        assert_eq!(Badge::Stopping.to_string(), "stopping");
    }
}
