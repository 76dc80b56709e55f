use procwatch_protocol::ProgressEvent;
use serde::Serialize;

use crate::status::StatusView;
use crate::stream::StreamState;

/// Everything a monitor pushes to whoever renders it.
#[derive(Clone, Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MonitorEvent {
    StatusChanged { status: StatusView },
    Progress { event: ProgressEvent },
    Stream { state: StreamState },
}
