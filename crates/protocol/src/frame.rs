use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Frame `type` carrying agent progress unless the monitor is configured otherwise.
pub const DEFAULT_PROGRESS_TYPE: &str = "agent_progress";

/// One progress item pushed for a unit of work (a run, an agent execution).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProgressEvent {
    #[serde(alias = "unitId", alias = "run_id", alias = "runId")]
    pub unit_id: String,
    #[serde(alias = "step", alias = "event")]
    pub kind: String,
    #[serde(default)]
    pub payload: Value,
    /// Event time exactly as the source reported it.
    pub timestamp: Value,
    /// Seconds since the unit started, when the source reports it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub elapsed: Option<f64>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum PushFrame {
    Progress(ProgressEvent),
    Other { kind: String },
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum FrameError {
    #[error("frame is not valid json: {0}")]
    NotJson(String),
    #[error("frame has no string type field")]
    MissingType,
    #[error("invalid progress frame: {0}")]
    InvalidProgress(String),
}

/// Parses one text frame from the push channel.
///
/// Frames whose `type` differs from `progress_type` are returned as
/// [`PushFrame::Other`] without further validation.
pub fn parse_push_frame(text: &str, progress_type: &str) -> Result<PushFrame, FrameError> {
    let value: Value =
        serde_json::from_str(text).map_err(|err| FrameError::NotJson(err.to_string()))?;
    let Value::Object(mut fields) = value else {
        return Err(FrameError::MissingType);
    };
    let kind = match fields.remove("type") {
        Some(Value::String(kind)) => kind,
        _ => return Err(FrameError::MissingType),
    };
    if kind != progress_type {
        return Ok(PushFrame::Other { kind });
    }
    let event: ProgressEvent = serde_json::from_value(Value::Object(fields))
        .map_err(|err| FrameError::InvalidProgress(err.to_string()))?;
    validate_progress(&event)?;
    Ok(PushFrame::Progress(event))
}

fn validate_progress(event: &ProgressEvent) -> Result<(), FrameError> {
    if event.unit_id.trim().is_empty() {
        return Err(FrameError::InvalidProgress("empty unit id".to_string()));
    }
    if event.kind.trim().is_empty() {
        return Err(FrameError::InvalidProgress("empty kind".to_string()));
    }
    if !matches!(event.timestamp, Value::String(_) | Value::Number(_)) {
        return Err(FrameError::InvalidProgress(
            "timestamp must be a string or number".to_string(),
        ));
    }
    if let Some(elapsed) = event.elapsed {
        if !elapsed.is_finite() || elapsed < 0.0 {
            return Err(FrameError::InvalidProgress(
                "elapsed must be a non-negative number".to_string(),
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_progress_frame_with_camel_case_fields() {
        let frame = parse_push_frame(
            r#"{"type":"agent_progress","unitId":"abc","step":"plan","payload":{"n":1},"timestamp":"2024-05-01T10:00:00Z","elapsed":1.5}"#,
            DEFAULT_PROGRESS_TYPE,
        )
        .expect("parse");
        let PushFrame::Progress(event) = frame else {
            panic!("expected progress frame");
        };
        assert_eq!(event.unit_id, "abc");
        assert_eq!(event.kind, "plan");
        assert_eq!(event.elapsed, Some(1.5));
        assert_eq!(event.payload["n"], 1);
    }

    #[test]
    fn other_types_are_not_validated() {
        let frame = parse_push_frame(r#"{"type":"heartbeat"}"#, DEFAULT_PROGRESS_TYPE)
            .expect("parse");
        assert_eq!(
            frame,
            PushFrame::Other {
                kind: "heartbeat".to_string()
            }
        );
    }

    #[test]
    fn rejects_garbage_and_incomplete_progress() {
        assert!(matches!(
            parse_push_frame("not json", DEFAULT_PROGRESS_TYPE),
            Err(FrameError::NotJson(_))
        ));
        assert_eq!(
            parse_push_frame(r#"{"unit_id":"abc"}"#, DEFAULT_PROGRESS_TYPE),
            Err(FrameError::MissingType)
        );
        assert!(matches!(
            parse_push_frame(
                r#"{"type":"agent_progress","unit_id":"abc","timestamp":1}"#,
                DEFAULT_PROGRESS_TYPE
            ),
            Err(FrameError::InvalidProgress(_))
        ));
        assert!(matches!(
            parse_push_frame(
                r#"{"type":"agent_progress","unit_id":"","kind":"x","timestamp":1}"#,
                DEFAULT_PROGRESS_TYPE
            ),
            Err(FrameError::InvalidProgress(_))
        ));
    }

    #[test]
    fn honours_custom_progress_type() {
        let frame = parse_push_frame(
            r#"{"type":"orchestration_step","run_id":"r1","kind":"done","timestamp":42}"#,
            "orchestration_step",
        )
        .expect("parse");
        assert!(matches!(frame, PushFrame::Progress(event) if event.unit_id == "r1"));
    }
}
