use serde::Serialize;
use serde_json::{Map, Value};

const UNHEALTHY_STATUSES: &[&str] = &["error", "down", "unhealthy"];

/// Validated body of a health endpoint.
///
/// A document counts as healthy when it is a JSON object carrying at least
/// one liveness field (`uptime` or `timestamp`) and does not declare itself
/// unhealthy through `status`. Unknown fields are preserved in `extra`.
///
/// A bare `{"status": "healthy"}` is rejected: without a liveness field a
/// proxy or placeholder page answering 2xx would pass for the process.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct HealthReport {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uptime: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum HealthError {
    #[error("health body is not valid json: {0}")]
    NotJson(String),
    #[error("health body must be a json object")]
    NotObject,
    #[error("health body has neither uptime nor timestamp")]
    MissingLiveness,
    #[error("health uptime must be a non-negative number")]
    InvalidUptime,
    #[error("health timestamp must be a string or number")]
    InvalidTimestamp,
    #[error("service reports status {0:?}")]
    Unhealthy(String),
}

impl HealthReport {
    pub fn parse(body: &str) -> Result<Self, HealthError> {
        let value: Value =
            serde_json::from_str(body).map_err(|err| HealthError::NotJson(err.to_string()))?;
        Self::from_value(value)
    }

    pub fn from_value(value: Value) -> Result<Self, HealthError> {
        let Value::Object(mut fields) = value else {
            return Err(HealthError::NotObject);
        };
        let uptime = match fields.remove("uptime") {
            None | Some(Value::Null) => None,
            Some(Value::Number(number)) => Some(
                number
                    .as_f64()
                    .filter(|value| value.is_finite() && *value >= 0.0)
                    .ok_or(HealthError::InvalidUptime)?,
            ),
            Some(_) => return Err(HealthError::InvalidUptime),
        };
        let timestamp = match fields.remove("timestamp") {
            None | Some(Value::Null) => None,
            Some(value @ (Value::String(_) | Value::Number(_))) => Some(value),
            Some(_) => return Err(HealthError::InvalidTimestamp),
        };
        if uptime.is_none() && timestamp.is_none() {
            return Err(HealthError::MissingLiveness);
        }
        let status = match fields.remove("status") {
            None | Some(Value::Null) => None,
            Some(Value::String(status)) => Some(status),
            Some(other) => Some(other.to_string()),
        };
        if let Some(status) = status.as_deref() {
            if UNHEALTHY_STATUSES
                .iter()
                .any(|unhealthy| status.eq_ignore_ascii_case(unhealthy))
            {
                return Err(HealthError::Unhealthy(status.to_string()));
            }
        }
        let version = match fields.remove("version") {
            Some(Value::String(version)) => Some(version),
            Some(Value::Number(version)) => Some(version.to_string()),
            _ => None,
        };
        Ok(Self {
            uptime,
            timestamp,
            status,
            version,
            extra: fields,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_uptime_only_document() {
        let report = HealthReport::parse(r#"{ "uptime": 120 }"#).expect("parse");
        assert_eq!(report.uptime, Some(120.0));
        assert!(report.timestamp.is_none());
    }

    #[test]
    fn keeps_unknown_fields() {
        let report = HealthReport::parse(
            r#"{ "timestamp": "2024-05-01T10:00:00Z", "status": "ok", "models": 3 }"#,
        )
        .expect("parse");
        assert_eq!(report.status.as_deref(), Some("ok"));
        assert_eq!(report.extra.get("models"), Some(&Value::from(3)));
    }

    #[test]
    fn rejects_plain_text_ok() {
        let err = HealthReport::parse("ok").unwrap_err();
        assert!(matches!(err, HealthError::NotJson(_)));
    }

    #[test]
    fn rejects_documents_without_liveness() {
        assert_eq!(
            HealthReport::parse(r#"{ "status": "ok" }"#).unwrap_err(),
            HealthError::MissingLiveness
        );
        assert_eq!(
            HealthReport::parse(r#"{ "status": "healthy" }"#).unwrap_err(),
            HealthError::MissingLiveness
        );
        assert_eq!(
            HealthReport::parse("[1, 2]").unwrap_err(),
            HealthError::NotObject
        );
    }

    #[test]
    fn rejects_negative_uptime_and_unhealthy_status() {
        assert_eq!(
            HealthReport::parse(r#"{ "uptime": -1 }"#).unwrap_err(),
            HealthError::InvalidUptime
        );
        assert_eq!(
            HealthReport::parse(r#"{ "uptime": "soon" }"#).unwrap_err(),
            HealthError::InvalidUptime
        );
        assert_eq!(
            HealthReport::parse(r#"{ "uptime": 5, "status": "DOWN" }"#).unwrap_err(),
            HealthError::Unhealthy("DOWN".to_string())
        );
    }
}
