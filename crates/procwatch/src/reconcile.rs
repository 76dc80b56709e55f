use std::sync::Arc;
use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::prober::{ProbeFailure, Prober, Reachable};
use crate::status::{Mutation, SharedStatus};

pub(crate) struct ReconcileLoop {
    pub(crate) prober: Prober,
    pub(crate) status: SharedStatus,
    pub(crate) candidates: Arc<Vec<String>>,
    pub(crate) interval: Duration,
    pub(crate) command_grace: Duration,
}

impl ReconcileLoop {
    /// Probes immediately, then once per interval until `shutdown` fires.
    ///
    /// Probes run inline, so ticks never overlap; ticks missed while a probe
    /// was outstanding are skipped rather than replayed.
    pub(crate) async fn run(self, shutdown: CancellationToken) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {}
            }
            if self.status.should_skip_tick(self.command_grace) {
                debug!(event = "reconcile.skip", "command in flight, skipping probe");
                continue;
            }
            let Some(generation) = self.status.mark_probing() else {
                break;
            };
            let result = tokio::select! {
                _ = shutdown.cancelled() => break,
                result = self.prober.probe(&self.candidates) => result,
            };
            if apply_probe_result(&self.status, generation, result) == Mutation::Closed {
                break;
            }
        }
        info!(event = "reconcile.stopped", "reconciliation loop stopped");
    }
}

pub(crate) fn apply_probe_result(
    status: &SharedStatus,
    generation: u64,
    result: Result<Reachable, ProbeFailure>,
) -> Mutation {
    let outcome = match result {
        Ok(reachable) => status.mark_confirmed(generation, reachable.endpoint, reachable.base),
        Err(failure) => status.mark_unreachable(generation, failure.to_string()),
    };
    if outcome == Mutation::Stale {
        debug!(event = "reconcile.stale", generation, "discarding probe result from older generation");
    }
    outcome
}
