use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleCommand {
    Start,
    Stop,
}

impl LifecycleCommand {
    pub fn path(self) -> &'static str {
        match self {
            LifecycleCommand::Start => "/start",
            LifecycleCommand::Stop => "/stop",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            LifecycleCommand::Start => "start",
            LifecycleCommand::Stop => "stop",
        }
    }
}

impl fmt::Display for LifecycleCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Optional body of a 2xx lifecycle response. Acceptance, not completion.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LifecycleAck {
    #[serde(default)]
    pub message: Option<String>,
}

impl LifecycleAck {
    /// Lenient: an empty or non-json body is an ack without a message.
    pub fn from_body(body: &str) -> Self {
        serde_json::from_str(body).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ack_tolerates_empty_body() {
        assert_eq!(LifecycleAck::from_body(""), LifecycleAck::default());
        assert_eq!(
            LifecycleAck::from_body(r#"{"message":"starting"}"#).message.as_deref(),
            Some("starting")
        );
    }
}
