use std::sync::Arc;

use procwatch_protocol::ServiceTimeouts;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::{MonitorConfig, Timing};
use crate::events::MonitorEvent;
use crate::http::Transport;
use crate::lifecycle::LifecycleCommands;
use crate::prober::Prober;
use crate::reconcile::ReconcileLoop;
use crate::remote_config::fetch_service_timeouts;
use crate::status::{ProcessStatus, SharedStatus, StatusStore};
use crate::stream::{EventStreamListener, ProgressFeed, StreamState};

const EVENT_CHANNEL_CAPACITY: usize = 512;

/// One mounted view of a remote process: its status store, the loop that
/// keeps it reconciled, the lifecycle commands and, when configured, the
/// push-channel listener.
///
/// Dropping a monitor stops its background work; [`Monitor::teardown`]
/// additionally waits for it to finish.
pub struct Monitor {
    id: Uuid,
    status: SharedStatus,
    event_tx: broadcast::Sender<MonitorEvent>,
    commands: LifecycleCommands,
    listener: Option<EventStreamListener>,
    timing: Timing,
    remote_timeouts: Option<ServiceTimeouts>,
    shutdown: CancellationToken,
    reconcile: Option<JoinHandle<()>>,
}

impl Monitor {
    /// Mounts a monitor and starts reconciling at once; the first probe runs
    /// without waiting for an interval.
    pub async fn mount(config: &MonitorConfig, transport: Arc<dyn Transport>) -> Self {
        let id = Uuid::new_v4();
        let mut timing = config.timing.clone();
        let remote_timeouts = if config.fetch_remote_config {
            match fetch_service_timeouts(
                transport.as_ref(),
                config.primary_base(),
                timing.probe_timeout,
            )
            .await
            {
                Ok(remote) => {
                    timing.apply_remote(&remote);
                    Some(remote)
                }
                Err(err) => {
                    warn!(event = "config.fetch_failed", error = %err, "using local timeouts");
                    None
                }
            }
        } else {
            None
        };

        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let status = SharedStatus::new(
            StatusStore::new(config.offline_error_threshold),
            event_tx.clone(),
        );
        let shutdown = CancellationToken::new();
        let commands = LifecycleCommands::new(
            Arc::clone(&transport),
            status.clone(),
            config.primary_base().to_string(),
            config.hints.clone(),
            timing.command_timeout,
            timing.restart_delay,
            shutdown.clone(),
        );
        let listener = config.stream_url.as_ref().map(|url| {
            EventStreamListener::new(
                url.clone(),
                config.progress_type.clone(),
                config.event_log_capacity,
                event_tx.clone(),
                shutdown.child_token(),
            )
        });
        let reconcile = ReconcileLoop {
            prober: Prober::new(transport, config.health_path.clone(), timing.probe_timeout),
            status: status.clone(),
            candidates: Arc::new(config.candidates.clone()),
            interval: timing.reconcile_interval,
            command_grace: timing.command_grace,
        };
        let reconcile = tokio::spawn(reconcile.run(shutdown.clone()));

        info!(
            event = "monitor.mounted",
            monitor_id = %id,
            candidates = ?config.candidates,
            interval = %humantime::format_duration(timing.reconcile_interval),
            stream = config.stream_url.is_some(),
        );

        Self {
            id,
            status,
            event_tx,
            commands,
            listener,
            timing,
            remote_timeouts,
            shutdown,
            reconcile: Some(reconcile),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn status(&self) -> ProcessStatus {
        self.status.snapshot()
    }

    pub fn status_handle(&self) -> SharedStatus {
        self.status.clone()
    }

    /// Events published after this call.
    pub fn events(&self) -> broadcast::Receiver<MonitorEvent> {
        self.event_tx.subscribe()
    }

    pub fn commands(&self) -> &LifecycleCommands {
        &self.commands
    }

    /// Effective timing after remote overrides.
    pub fn timing(&self) -> &Timing {
        &self.timing
    }

    pub fn remote_timeouts(&self) -> Option<&ServiceTimeouts> {
        self.remote_timeouts.as_ref()
    }

    pub fn listener(&self) -> Option<&EventStreamListener> {
        self.listener.as_ref()
    }

    /// Subscribes to progress for `unit_id`. Returns `None` when no push
    /// channel is configured.
    pub fn subscribe(&self, unit_id: &str) -> Option<ProgressFeed> {
        self.listener.as_ref().map(|listener| listener.subscribe(unit_id))
    }

    /// Opens the push channel, or reopens it after a drop.
    pub fn reconnect(&self) -> bool {
        self.listener
            .as_ref()
            .map(EventStreamListener::connect)
            .unwrap_or(false)
    }

    pub fn stream_state(&self) -> Option<StreamState> {
        self.listener.as_ref().map(EventStreamListener::state)
    }

    /// Stops every timer, request and socket owned by this monitor and
    /// waits for them to wind down. Nothing touches the store afterwards.
    pub async fn teardown(mut self) {
        let stream = self.release();
        if let Some(handle) = self.reconcile.take() {
            if let Err(err) = handle.await {
                warn!(event = "monitor.join_failed", monitor_id = %self.id, error = %err);
            }
        }
        if let Some(handle) = stream {
            if let Err(err) = handle.await {
                warn!(event = "monitor.join_failed", monitor_id = %self.id, error = %err);
            }
        }
        info!(event = "monitor.torn_down", monitor_id = %self.id);
    }

    fn release(&mut self) -> Option<JoinHandle<()>> {
        self.status.close();
        let stream = self.listener.as_ref().and_then(EventStreamListener::close);
        self.shutdown.cancel();
        stream
    }
}

impl Drop for Monitor {
    fn drop(&mut self) {
        if !self.shutdown.is_cancelled() {
            self.release();
        }
    }
}
