use std::time::Duration;

use procwatch_protocol::ServiceTimeouts;
use tracing::{debug, info};

use crate::http::{join_base_path, truncate_for_log, with_deadline, Transport, TransportError};

const CONFIG_PATH: &str = "/config";

#[derive(Debug, thiserror::Error)]
pub enum RemoteConfigError {
    #[error("invalid base url: {0}")]
    InvalidBase(String),
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("config endpoint answered {status_line}: {body}")]
    Status { status_line: String, body: String },
    #[error("config body is not valid: {0}")]
    Invalid(#[from] serde_json::Error),
}

/// Reads the service's tunable timeouts from `GET <base>/config`.
pub async fn fetch_service_timeouts(
    transport: &dyn Transport,
    base: &str,
    timeout: Duration,
) -> Result<ServiceTimeouts, RemoteConfigError> {
    let url = join_base_path(base, CONFIG_PATH).map_err(RemoteConfigError::InvalidBase)?;
    let reply = with_deadline(&url, timeout, transport.get(&url, timeout)).await?;
    if !reply.is_success() {
        return Err(RemoteConfigError::Status {
            status_line: reply.status_line(),
            body: truncate_for_log(reply.body.trim()),
        });
    }
    let timeouts: ServiceTimeouts = serde_json::from_str(&reply.body)?;
    debug!(event = "config.fetched", url = %url, timeouts = ?timeouts);
    Ok(timeouts)
}

/// Writes `update` to `POST <base>/config` and returns what the service
/// reports back. Services that answer with an empty body are assumed to
/// have stored the update as sent.
pub async fn save_service_timeouts(
    transport: &dyn Transport,
    base: &str,
    update: &ServiceTimeouts,
    timeout: Duration,
) -> Result<ServiceTimeouts, RemoteConfigError> {
    let url = join_base_path(base, CONFIG_PATH).map_err(RemoteConfigError::InvalidBase)?;
    let body = serde_json::to_value(update)?;
    let reply = with_deadline(&url, timeout, transport.post(&url, Some(body), timeout)).await?;
    if !reply.is_success() {
        return Err(RemoteConfigError::Status {
            status_line: reply.status_line(),
            body: truncate_for_log(reply.body.trim()),
        });
    }
    info!(event = "config.saved", url = %url);
    if reply.body.trim().is_empty() {
        return Ok(update.clone());
    }
    Ok(serde_json::from_str(&reply.body)?)
}
