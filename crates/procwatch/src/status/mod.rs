mod model;
mod store;

pub use model::{Badge, ProcessState, ProcessStatus, StatusView};
pub use store::{Mutation, StatusStore};

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::time::Instant;

use procwatch_protocol::LifecycleCommand;
use tokio::sync::broadcast;

use crate::events::MonitorEvent;

/// Store handle shared by the loop, the commands and the owning monitor.
///
/// The lock is never held across an await point; a change in the visible
/// status is announced as [`MonitorEvent::StatusChanged`] before the lock is
/// released, so the last event received always matches [`Self::snapshot`].
#[derive(Clone)]
pub struct SharedStatus {
    store: Arc<Mutex<StatusStore>>,
    event_tx: broadcast::Sender<MonitorEvent>,
}

impl SharedStatus {
    pub fn new(store: StatusStore, event_tx: broadcast::Sender<MonitorEvent>) -> Self {
        Self {
            store: Arc::new(Mutex::new(store)),
            event_tx,
        }
    }

    pub fn snapshot(&self) -> ProcessStatus {
        self.lock().status().clone()
    }

    pub fn generation(&self) -> u64 {
        self.lock().generation()
    }

    pub fn is_closed(&self) -> bool {
        self.lock().is_closed()
    }

    pub fn probes_started(&self) -> u64 {
        self.lock().probes_started()
    }

    pub fn close(&self) {
        self.lock().close();
    }

    pub fn should_skip_tick(&self, grace: Duration) -> bool {
        self.lock().should_skip_tick(Instant::now(), grace)
    }

    pub fn mark_probing(&self) -> Option<u64> {
        self.lock().mark_probing()
    }

    pub fn begin_command(&self, command: LifecycleCommand) -> Option<u64> {
        let mut store = self.lock();
        let generation = store.begin_command(command, Instant::now());
        if generation.is_some() {
            let status = store.status().view();
            let _ = self.event_tx.send(MonitorEvent::StatusChanged { status });
        }
        generation
    }

    pub fn command_accepted(&self, generation: u64) -> Mutation {
        self.update(|store| store.command_accepted(generation))
    }

    pub fn command_failed(&self, generation: u64, detail: String) -> Mutation {
        self.update(|store| store.command_failed(generation, detail))
    }

    pub fn mark_confirmed(&self, generation: u64, endpoint: String, base: String) -> Mutation {
        self.update(|store| store.mark_confirmed(generation, endpoint, base))
    }

    pub fn mark_unreachable(&self, generation: u64, detail: String) -> Mutation {
        self.update(|store| store.mark_unreachable(generation, detail))
    }

    pub fn mark_error(&self, generation: u64, detail: String) -> Mutation {
        self.update(|store| store.mark_error(generation, detail))
    }

    fn update<F>(&self, mutate: F) -> Mutation
    where
        F: FnOnce(&mut StatusStore) -> Mutation,
    {
        // Publish under the lock so events leave in commit order.
        let mut store = self.lock();
        let before = store.status().view();
        let outcome = mutate(&mut store);
        let after = store.status().view();
        if before != after {
            let _ = self.event_tx.send(MonitorEvent::StatusChanged { status: after });
        }
        outcome
    }

    fn lock(&self) -> MutexGuard<'_, StatusStore> {
        self.store.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
