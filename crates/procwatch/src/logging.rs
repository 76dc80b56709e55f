use std::io;
use std::path::Path;

use anyhow::Context;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

/// Installs the global subscriber. With `log_dir`, JSON lines go to a daily
/// rolling `procwatch.log` there and stderr output becomes opt-in; without
/// it, human-readable logs go to stderr. Keep the returned guard alive until
/// exit so buffered lines are flushed.
pub fn init_tracing(log_dir: Option<&Path>, log_to_stderr: bool) -> anyhow::Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let Some(log_dir) = log_dir else {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .with_writer(io::stderr)
                    .with_target(false),
            )
            .try_init()
            .context("failed to install tracing subscriber")?;
        return Ok(None);
    };

    std::fs::create_dir_all(log_dir)
        .with_context(|| format!("failed to create log dir {}", log_dir.display()))?;
    let file_appender = tracing_appender::rolling::daily(log_dir, "procwatch.log");
    let (file_writer, file_guard) = tracing_appender::non_blocking(file_appender);

    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(file_writer)
        .with_target(false)
        .json();

    let registry = tracing_subscriber::registry().with(filter).with(file_layer);

    if log_to_stderr {
        let stderr_layer = tracing_subscriber::fmt::layer()
            .with_writer(io::stderr)
            .with_target(false);
        registry
            .with(stderr_layer)
            .try_init()
            .context("failed to install tracing subscriber")?;
    } else {
        registry
            .try_init()
            .context("failed to install tracing subscriber")?;
    }

    Ok(Some(file_guard))
}
