use std::time::{Duration, SystemTime};

use tokio::time::Instant;

use procwatch_protocol::LifecycleCommand;

use super::model::{ProcessState, ProcessStatus};

const EMPTY_ERROR_DETAIL: &str = "unknown error";

/// Result of a store mutation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Mutation {
    Applied,
    /// Written under an older generation than the current one; discarded.
    Stale,
    /// The owning monitor was torn down; discarded.
    Closed,
}

#[derive(Clone, Debug)]
struct PendingCommand {
    generation: u64,
    command: LifecycleCommand,
    issued_at: Instant,
    in_flight: bool,
    grace_used: bool,
}

/// Believed lifecycle state of one remote process.
///
/// Every result-carrying mutation names the generation that was current when
/// its async work began; `begin_command` bumps the generation so results of
/// probes or commands started earlier are discarded on arrival.
#[derive(Debug)]
pub struct StatusStore {
    status: ProcessStatus,
    generation: u64,
    pending: Option<PendingCommand>,
    consecutive_failures: u32,
    offline_error_threshold: Option<u32>,
    probes_started: u64,
    closed: bool,
}

impl StatusStore {
    pub fn new(offline_error_threshold: Option<u32>) -> Self {
        Self {
            status: ProcessStatus::default(),
            generation: 0,
            pending: None,
            consecutive_failures: 0,
            offline_error_threshold,
            probes_started: 0,
            closed: false,
        }
    }

    pub fn status(&self) -> &ProcessStatus {
        &self.status
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn pending_command(&self) -> Option<LifecycleCommand> {
        self.pending.as_ref().map(|pending| pending.command)
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    pub fn close(&mut self) {
        self.closed = true;
    }

    /// True while a command request is outstanding and younger than `grace`.
    pub fn should_skip_tick(&self, now: Instant, grace: Duration) -> bool {
        self.pending
            .as_ref()
            .map(|pending| pending.in_flight && now.duration_since(pending.issued_at) < grace)
            .unwrap_or(false)
    }

    /// Starts a command: new generation plus the optimistic transition.
    pub fn begin_command(&mut self, command: LifecycleCommand, now: Instant) -> Option<u64> {
        if self.closed {
            return None;
        }
        self.generation += 1;
        self.pending = Some(PendingCommand {
            generation: self.generation,
            command,
            issued_at: now,
            in_flight: true,
            grace_used: false,
        });
        self.consecutive_failures = 0;
        self.status.state = match command {
            LifecycleCommand::Start => ProcessState::Starting,
            LifecycleCommand::Stop => ProcessState::Stopping,
        };
        self.status.detail = None;
        self.status.generation = self.generation;
        Some(self.generation)
    }

    /// The control endpoint accepted the command; wait for a probe to confirm.
    pub fn command_accepted(&mut self, generation: u64) -> Mutation {
        if let Some(rejected) = self.guard(generation) {
            return rejected;
        }
        if let Some(pending) = self.pending.as_mut() {
            if pending.generation == generation {
                pending.in_flight = false;
            }
        }
        Mutation::Applied
    }

    pub fn command_failed(&mut self, generation: u64, detail: String) -> Mutation {
        if let Some(rejected) = self.guard(generation) {
            return rejected;
        }
        self.pending = None;
        self.set_error(detail);
        Mutation::Applied
    }

    /// Informational; returns the generation the probe runs under.
    pub fn mark_probing(&mut self) -> Option<u64> {
        if self.closed {
            return None;
        }
        self.probes_started += 1;
        Some(self.generation)
    }

    pub fn probes_started(&self) -> u64 {
        self.probes_started
    }

    pub fn mark_confirmed(&mut self, generation: u64, endpoint: String, base: String) -> Mutation {
        if let Some(rejected) = self.guard(generation) {
            return rejected;
        }
        let now = SystemTime::now();
        self.consecutive_failures = 0;
        self.status.endpoint = Some(endpoint);
        self.status.base = Some(base);
        self.status.last_confirmed_at = Some(confirmation_time(now, self.status.last_failed_at));
        if let Some(pending) = self.pending.as_mut() {
            if pending.command == LifecycleCommand::Stop && !pending.grace_used {
                // The process may still be shutting down; give it one tick.
                pending.grace_used = true;
                return Mutation::Applied;
            }
        }
        self.pending = None;
        self.status.state = ProcessState::Running;
        self.status.detail = None;
        self.status.generation = generation;
        Mutation::Applied
    }

    pub fn mark_unreachable(&mut self, generation: u64, detail: String) -> Mutation {
        if let Some(rejected) = self.guard(generation) {
            return rejected;
        }
        self.status.last_failed_at = Some(SystemTime::now());
        let hold_starting = match self.pending.as_mut() {
            Some(pending) if pending.command == LifecycleCommand::Start && !pending.grace_used => {
                // Not up yet; keep the optimistic `starting` for one tick.
                pending.grace_used = true;
                true
            }
            _ => false,
        };
        if hold_starting {
            return Mutation::Applied;
        }
        if self.pending.take().is_none() {
            self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        }
        self.status.generation = generation;
        match self.offline_error_threshold {
            Some(threshold) if self.consecutive_failures >= threshold => {
                self.set_error(format!(
                    "unreachable for {} consecutive probes: {detail}",
                    self.consecutive_failures
                ));
            }
            _ => {
                self.status.state = ProcessState::Stopped;
                self.status.detail = Some(detail);
            }
        }
        Mutation::Applied
    }

    pub fn mark_error(&mut self, generation: u64, detail: String) -> Mutation {
        if let Some(rejected) = self.guard(generation) {
            return rejected;
        }
        self.pending = None;
        self.status.generation = generation;
        self.set_error(detail);
        Mutation::Applied
    }

    fn guard(&self, generation: u64) -> Option<Mutation> {
        if self.closed {
            Some(Mutation::Closed)
        } else if generation < self.generation {
            Some(Mutation::Stale)
        } else {
            None
        }
    }

    fn set_error(&mut self, detail: String) {
        self.status.state = ProcessState::Error;
        self.status.detail = Some(if detail.trim().is_empty() {
            EMPTY_ERROR_DETAIL.to_string()
        } else {
            detail
        });
    }
}

fn confirmation_time(now: SystemTime, last_failed_at: Option<SystemTime>) -> SystemTime {
    match last_failed_at {
        Some(failed) if failed >= now => failed + Duration::from_millis(1),
        _ => now,
    }
}
