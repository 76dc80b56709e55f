use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures_util::StreamExt;
use procwatch_protocol::{parse_push_frame, FrameError, ProgressEvent, PushFrame};
use serde::Serialize;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use super::log::EventLogs;
use crate::events::MonitorEvent;

const PROGRESS_CHANNEL_CAPACITY: usize = 256;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamState {
    Idle,
    Connecting,
    Connected,
    Disconnected,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum FrameDisposition {
    Appended,
    Unsubscribed,
    Ignored,
    Dropped,
}

struct ListenerShared {
    progress_type: String,
    subscriptions: Mutex<HashSet<String>>,
    logs: Mutex<EventLogs>,
    state: Mutex<StreamState>,
    progress_tx: broadcast::Sender<ProgressEvent>,
    event_tx: broadcast::Sender<MonitorEvent>,
    closed: AtomicBool,
}

impl ListenerShared {
    fn handle_frame(&self, text: &str) -> FrameDisposition {
        if self.closed.load(Ordering::SeqCst) {
            return FrameDisposition::Ignored;
        }
        match parse_push_frame(text, &self.progress_type) {
            Ok(PushFrame::Progress(event)) => {
                if !lock(&self.subscriptions).contains(&event.unit_id) {
                    trace!(unit_id = %event.unit_id, "progress for unsubscribed unit");
                    return FrameDisposition::Unsubscribed;
                }
                lock(&self.logs).append(event.clone());
                let _ = self.progress_tx.send(event.clone());
                let _ = self.event_tx.send(MonitorEvent::Progress { event });
                FrameDisposition::Appended
            }
            Ok(PushFrame::Other { kind }) => {
                trace!(kind = %kind, "ignoring push frame");
                FrameDisposition::Ignored
            }
            Err(err @ FrameError::InvalidProgress(_)) => {
                warn!(event = "stream.frame_dropped", error = %err);
                FrameDisposition::Dropped
            }
            Err(err) => {
                debug!(event = "stream.frame_dropped", error = %err);
                FrameDisposition::Dropped
            }
        }
    }

    fn set_state(&self, state: StreamState) {
        if self.closed.load(Ordering::SeqCst) {
            return;
        }
        *lock(&self.state) = state;
        let _ = self.event_tx.send(MonitorEvent::Stream { state });
    }
}

/// Push-channel client for one monitor.
///
/// The socket is opened by [`EventStreamListener::connect`] and is not
/// reopened after a drop; callers see `StreamState::Disconnected` and call
/// `connect` again to resubscribe.
pub struct EventStreamListener {
    url: String,
    shared: Arc<ListenerShared>,
    shutdown: CancellationToken,
    connection: Mutex<Option<JoinHandle<()>>>,
}

impl EventStreamListener {
    pub(crate) fn new(
        url: String,
        progress_type: String,
        log_capacity: usize,
        event_tx: broadcast::Sender<MonitorEvent>,
        shutdown: CancellationToken,
    ) -> Self {
        let (progress_tx, _) = broadcast::channel(PROGRESS_CHANNEL_CAPACITY);
        Self {
            url,
            shared: Arc::new(ListenerShared {
                progress_type,
                subscriptions: Mutex::new(HashSet::new()),
                logs: Mutex::new(EventLogs::new(log_capacity)),
                state: Mutex::new(StreamState::Idle),
                progress_tx,
                event_tx,
                closed: AtomicBool::new(false),
            }),
            shutdown,
            connection: Mutex::new(None),
        }
    }

    pub fn state(&self) -> StreamState {
        *lock(&self.shared.state)
    }

    /// Starts receiving progress for `unit_id`; events pushed before this
    /// call are not replayed.
    pub fn subscribe(&self, unit_id: &str) -> ProgressFeed {
        lock(&self.shared.subscriptions).insert(unit_id.to_string());
        ProgressFeed {
            unit_id: unit_id.to_string(),
            rx: self.shared.progress_tx.subscribe(),
        }
    }

    pub fn unsubscribe(&self, unit_id: &str) {
        lock(&self.shared.subscriptions).remove(unit_id);
        lock(&self.shared.logs).forget(unit_id);
    }

    /// Bounded log of `unit_id` in arrival order.
    pub fn log(&self, unit_id: &str) -> Vec<ProgressEvent> {
        lock(&self.shared.logs).entries(unit_id)
    }

    /// Opens the socket unless one is already open. Returns whether a new
    /// connection attempt was started.
    pub fn connect(&self) -> bool {
        if self.shutdown.is_cancelled() || self.shared.closed.load(Ordering::SeqCst) {
            return false;
        }
        let mut connection = lock(&self.connection);
        if let Some(handle) = connection.as_ref() {
            if !handle.is_finished() {
                return false;
            }
        }
        let shared = Arc::clone(&self.shared);
        let url = self.url.clone();
        let shutdown = self.shutdown.clone();
        *connection = Some(tokio::spawn(run_stream(shared, url, shutdown)));
        true
    }

    pub(crate) fn close(&self) -> Option<JoinHandle<()>> {
        self.shared.closed.store(true, Ordering::SeqCst);
        self.shutdown.cancel();
        lock(&self.connection).take()
    }

    #[cfg(test)]
    pub(crate) fn feed_frame(&self, text: &str) -> FrameDisposition {
        self.shared.handle_frame(text)
    }
}

/// Lazy per-unit view of the progress stream. Dropping it and subscribing
/// again restarts it from the next pushed event.
pub struct ProgressFeed {
    unit_id: String,
    rx: broadcast::Receiver<ProgressEvent>,
}

impl ProgressFeed {
    pub fn unit_id(&self) -> &str {
        &self.unit_id
    }

    /// Next event for this unit; `None` once the listener is gone.
    pub async fn next(&mut self) -> Option<ProgressEvent> {
        loop {
            match self.rx.recv().await {
                Ok(event) if event.unit_id == self.unit_id => return Some(event),
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(unit_id = %self.unit_id, skipped, "progress feed lagged");
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

async fn run_stream(shared: Arc<ListenerShared>, url: String, shutdown: CancellationToken) {
    shared.set_state(StreamState::Connecting);
    let connected = tokio::select! {
        _ = shutdown.cancelled() => return,
        result = tokio_tungstenite::connect_async(url.as_str()) => result,
    };
    match connected {
        Ok((mut stream, _)) => {
            shared.set_state(StreamState::Connected);
            info!(event = "stream.connected", url = %url);
            loop {
                let message = tokio::select! {
                    _ = shutdown.cancelled() => {
                        let _ = stream.close(None).await;
                        return;
                    }
                    message = stream.next() => message,
                };
                match message {
                    Some(Ok(Message::Text(text))) => {
                        shared.handle_frame(&text);
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(err)) => {
                        warn!(event = "stream.error", url = %url, error = %err);
                        break;
                    }
                }
            }
        }
        Err(err) => {
            warn!(event = "stream.connect_failed", url = %url, error = %err);
        }
    }
    shared.set_state(StreamState::Disconnected);
    info!(
        event = "stream.disconnected",
        url = %url,
        "push channel closed; reconnect explicitly to resume"
    );
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
