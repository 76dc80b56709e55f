use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Operator-tunable timeouts served on `GET <base>/config`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceTimeouts {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generation_timeout_secs: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub health_check_timeout_secs: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command_timeout_secs: Option<u64>,
}

impl ServiceTimeouts {
    pub fn health_check_timeout(&self) -> Option<Duration> {
        positive_secs(self.health_check_timeout_secs)
    }

    pub fn command_timeout(&self) -> Option<Duration> {
        positive_secs(self.command_timeout_secs)
    }

    /// Overlays every field set in `update`.
    pub fn apply(&mut self, update: &ServiceTimeouts) {
        if update.generation_timeout_secs.is_some() {
            self.generation_timeout_secs = update.generation_timeout_secs;
        }
        if update.health_check_timeout_secs.is_some() {
            self.health_check_timeout_secs = update.health_check_timeout_secs;
        }
        if update.command_timeout_secs.is_some() {
            self.command_timeout_secs = update.command_timeout_secs;
        }
    }

    pub fn is_empty(&self) -> bool {
        self == &ServiceTimeouts::default()
    }
}

fn positive_secs(value: Option<u64>) -> Option<Duration> {
    value.filter(|secs| *secs > 0).map(Duration::from_secs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn apply_only_overrides_present_fields() {
        let mut current: ServiceTimeouts =
            serde_json::from_str(r#"{"generation_timeout_secs":120,"health_check_timeout_secs":5}"#)
                .expect("deserialize");
        current.apply(&ServiceTimeouts {
            health_check_timeout_secs: Some(2),
            ..ServiceTimeouts::default()
        });
        assert_eq!(current.generation_timeout_secs, Some(120));
        assert_eq!(current.health_check_timeout(), Some(Duration::from_secs(2)));
        assert_eq!(current.command_timeout(), None);
    }

    #[test]
    fn zero_seconds_means_unset() {
        let timeouts = ServiceTimeouts {
            command_timeout_secs: Some(0),
            ..ServiceTimeouts::default()
        };
        assert_eq!(timeouts.command_timeout(), None);
        assert!(!timeouts.is_empty());
    }
}
