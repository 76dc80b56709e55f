use std::sync::Arc;
use std::time::Duration;

use procwatch_protocol::{LifecycleAck, LifecycleCommand};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::ManualHints;
use crate::http::{join_base_path, truncate_for_log, with_deadline, Transport};
use crate::status::SharedStatus;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommandReceipt {
    pub command: LifecycleCommand,
    pub generation: u64,
    pub message: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum CommandError {
    #[error("{command} rejected with HTTP {status}: {detail}")]
    Rejected {
        command: LifecycleCommand,
        status: u16,
        detail: String,
    },
    #[error("{command} could not reach the control endpoint: {detail}")]
    Unavailable {
        command: LifecycleCommand,
        detail: String,
    },
    #[error("monitor was torn down")]
    Closed,
}

/// Sends start/stop/restart to the control endpoint and applies the
/// optimistic transition; the next probe confirms or corrects it.
#[derive(Clone)]
pub struct LifecycleCommands {
    transport: Arc<dyn Transport>,
    status: SharedStatus,
    fallback_base: String,
    hints: ManualHints,
    command_timeout: Duration,
    restart_delay: Duration,
    shutdown: CancellationToken,
}

impl LifecycleCommands {
    pub(crate) fn new(
        transport: Arc<dyn Transport>,
        status: SharedStatus,
        fallback_base: String,
        hints: ManualHints,
        command_timeout: Duration,
        restart_delay: Duration,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            transport,
            status,
            fallback_base,
            hints,
            command_timeout,
            restart_delay,
            shutdown,
        }
    }

    pub async fn start(&self) -> Result<CommandReceipt, CommandError> {
        self.issue(LifecycleCommand::Start).await
    }

    pub async fn stop(&self) -> Result<CommandReceipt, CommandError> {
        self.issue(LifecycleCommand::Stop).await
    }

    /// Stop, wait `restart_delay`, start. Start is attempted even if stop failed.
    pub async fn restart(&self) -> Result<CommandReceipt, CommandError> {
        match self.stop().await {
            Ok(_) => {}
            Err(CommandError::Closed) => return Err(CommandError::Closed),
            Err(err) => {
                warn!(event = "command.restart.stop_failed", error = %err, "continuing with start");
            }
        }
        tokio::select! {
            _ = self.shutdown.cancelled() => return Err(CommandError::Closed),
            _ = tokio::time::sleep(self.restart_delay) => {}
        }
        self.start().await
    }

    fn control_base(&self) -> String {
        self.status
            .snapshot()
            .base
            .unwrap_or_else(|| self.fallback_base.clone())
    }

    fn manual_hint(&self, command: LifecycleCommand) -> &str {
        match command {
            LifecycleCommand::Start => &self.hints.start,
            LifecycleCommand::Stop => &self.hints.stop,
        }
    }

    async fn issue(&self, command: LifecycleCommand) -> Result<CommandReceipt, CommandError> {
        let base = self.control_base();
        let Some(generation) = self.status.begin_command(command) else {
            return Err(CommandError::Closed);
        };
        let url = match join_base_path(&base, command.path()) {
            Ok(url) => url,
            Err(err) => {
                let detail = format!("{err}; {}", self.manual_hint(command));
                self.status.command_failed(generation, detail.clone());
                return Err(CommandError::Unavailable { command, detail });
            }
        };
        info!(event = "command.issue", command = %command, generation, url = %url);
        let result = tokio::select! {
            _ = self.shutdown.cancelled() => return Err(CommandError::Closed),
            result = with_deadline(
                &url,
                self.command_timeout,
                self.transport.post(&url, None, self.command_timeout),
            ) => result,
        };
        match result {
            Ok(reply) if reply.is_success() => {
                let ack = LifecycleAck::from_body(&reply.body);
                info!(
                    event = "command.accepted",
                    command = %command,
                    generation,
                    message = ?ack.message
                );
                self.status.command_accepted(generation);
                Ok(CommandReceipt {
                    command,
                    generation,
                    message: ack.message,
                })
            }
            Ok(reply) => {
                let mut detail = format!("{command} rejected: {}", reply.status_line());
                if !reply.body.trim().is_empty() {
                    detail.push_str(&format!(" ({})", truncate_for_log(reply.body.trim())));
                }
                warn!(event = "command.rejected", command = %command, generation, detail = %detail);
                self.status.command_failed(generation, detail.clone());
                Err(CommandError::Rejected {
                    command,
                    status: reply.status,
                    detail,
                })
            }
            Err(err) => {
                let detail = format!(
                    "control endpoint unavailable ({err}); {}",
                    self.manual_hint(command)
                );
                warn!(event = "command.unavailable", command = %command, generation, error = %err);
                self.status.command_failed(generation, detail.clone());
                Err(CommandError::Unavailable { command, detail })
            }
        }
    }
}
