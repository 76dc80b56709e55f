//! Keeps a local belief about a remote process's lifecycle state in line
//! with what its health endpoint actually reports, lets callers start and
//! stop it, and collects its progress events from a push channel.

pub mod config;
pub mod events;
pub mod http;
pub mod lifecycle;
pub mod logging;
pub mod monitor;
pub mod preferences;
pub mod prober;
mod reconcile;
pub mod remote_config;
pub mod status;
pub mod stream;

#[cfg(test)]
mod test_support;

pub use config::{load_monitor_config, ManualHints, MonitorConfig, Timing};
pub use events::MonitorEvent;
pub use http::{HttpReply, HttpTransport, Transport, TransportError};
pub use lifecycle::{CommandError, CommandReceipt, LifecycleCommands};
pub use monitor::Monitor;
pub use preferences::{
    prefer_endpoint, MemoryPreferenceStore, PreferenceStore, Preferences, TomlPreferenceStore,
};
pub use prober::{ProbeFailure, ProbeFailureKind, Prober, Reachable};
pub use remote_config::{fetch_service_timeouts, save_service_timeouts, RemoteConfigError};
pub use status::{Badge, Mutation, ProcessState, ProcessStatus, SharedStatus, StatusView};
pub use stream::{BoundedLog, EventStreamListener, ProgressFeed, StreamState};
