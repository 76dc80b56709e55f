use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use procwatch_protocol::HealthReport;
use serde::Serialize;
use tracing::{debug, info};

use crate::http::{join_base_path, truncate_for_log, with_deadline, Transport};

#[derive(Clone, Debug, PartialEq)]
pub struct Reachable {
    pub base: String,
    /// Health url that answered.
    pub endpoint: String,
    pub report: HealthReport,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProbeFailureKind {
    Unreachable,
    MalformedResponse,
}

impl fmt::Display for ProbeFailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProbeFailureKind::Unreachable => f.write_str("unreachable"),
            ProbeFailureKind::MalformedResponse => f.write_str("malformed response"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("{kind} after {attempts} attempt(s): {last_error}")]
pub struct ProbeFailure {
    pub kind: ProbeFailureKind,
    pub attempts: usize,
    pub last_error: String,
}

/// Reduces health checks against ordered candidates to one verdict.
#[derive(Clone)]
pub struct Prober {
    transport: Arc<dyn Transport>,
    health_path: String,
    attempt_timeout: Duration,
}

impl Prober {
    pub fn new(transport: Arc<dyn Transport>, health_path: String, attempt_timeout: Duration) -> Self {
        Self {
            transport,
            health_path,
            attempt_timeout,
        }
    }

    /// Tries each candidate base in order and returns on the first healthy one.
    pub async fn probe(&self, candidates: &[String]) -> Result<Reachable, ProbeFailure> {
        let mut failure = ProbeFailure {
            kind: ProbeFailureKind::Unreachable,
            attempts: 0,
            last_error: "no candidate endpoints configured".to_string(),
        };
        for base in candidates {
            failure.attempts += 1;
            let endpoint = match join_base_path(base, &self.health_path) {
                Ok(endpoint) => endpoint,
                Err(err) => {
                    failure.kind = ProbeFailureKind::Unreachable;
                    failure.last_error = format!("{base:?}: {err}");
                    continue;
                }
            };
            match self.probe_one(&endpoint).await {
                Ok(report) => {
                    debug!(event = "probe.ok", endpoint = %endpoint, uptime = ?report.uptime);
                    return Ok(Reachable {
                        base: base.trim().trim_end_matches('/').to_string(),
                        endpoint,
                        report,
                    });
                }
                Err((kind, message)) => {
                    debug!(event = "probe.attempt_failed", endpoint = %endpoint, kind = %kind, error = %message);
                    failure.kind = kind;
                    failure.last_error = message;
                }
            }
        }
        info!(
            event = "probe.failed",
            attempts = failure.attempts,
            kind = %failure.kind,
            error = %failure.last_error,
            "no candidate endpoint is healthy"
        );
        Err(failure)
    }

    async fn probe_one(&self, endpoint: &str) -> Result<HealthReport, (ProbeFailureKind, String)> {
        let reply = with_deadline(
            endpoint,
            self.attempt_timeout,
            self.transport.get(endpoint, self.attempt_timeout),
        )
        .await
        .map_err(|err| (ProbeFailureKind::Unreachable, err.to_string()))?;
        if !reply.is_success() {
            return Err((
                ProbeFailureKind::MalformedResponse,
                format!("{endpoint} answered {}", reply.status_line()),
            ));
        }
        HealthReport::parse(&reply.body).map_err(|err| {
            (
                ProbeFailureKind::MalformedResponse,
                format!(
                    "{endpoint}: {err} (body: {})",
                    truncate_for_log(&reply.body)
                ),
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{FakeRoute, FakeTransport};

    const LOCALHOST: &str = "http://localhost:5002";
    const LOOPBACK: &str = "http://127.0.0.1:5002";

    fn candidates() -> Vec<String> {
        vec![LOCALHOST.to_string(), LOOPBACK.to_string()]
    }

    #[tokio::test(start_paused = true)]
    async fn repeated_probes_return_same_endpoint() {
        let transport = FakeTransport::new();
        transport.route(
            "http://localhost:5002/health",
            FakeRoute::ok(r#"{"uptime": 5}"#),
        );
        let prober = Prober::new(transport.clone(), "/health".to_string(), Duration::from_secs(2));
        for _ in 0..3 {
            let reachable = prober.probe(&candidates()).await.expect("reachable");
            assert_eq!(reachable.endpoint, "http://localhost:5002/health");
            assert_eq!(reachable.base, LOCALHOST);
        }
        assert_eq!(transport.calls().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn falls_back_after_timeout_and_stops_at_first_success() {
        let transport = FakeTransport::new();
        transport.route("http://localhost:5002/health", FakeRoute::Hang);
        transport.route("http://127.0.0.1:5002/health", FakeRoute::ok(r#"{"uptime": 120}"#));
        transport.route("http://10.0.0.9:5002/health", FakeRoute::ok(r#"{"uptime": 1}"#));
        let prober = Prober::new(transport.clone(), "/health".to_string(), Duration::from_secs(2));
        let mut list = candidates();
        list.push("http://10.0.0.9:5002".to_string());

        let started = tokio::time::Instant::now();
        let reachable = prober.probe(&list).await.expect("reachable");
        assert_eq!(reachable.endpoint, "http://127.0.0.1:5002/health");
        assert_eq!(reachable.report.uptime, Some(120.0));
        assert!(started.elapsed() < Duration::from_secs(3));
        assert_eq!(
            transport.calls(),
            vec![
                "GET http://localhost:5002/health".to_string(),
                "GET http://127.0.0.1:5002/health".to_string(),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn malformed_body_fails_candidate() {
        let transport = FakeTransport::new();
        transport.route("http://localhost:5002/health", FakeRoute::ok("ok"));
        transport.route("http://127.0.0.1:5002/health", FakeRoute::ok(r#"{"status":"ok"}"#));
        let prober = Prober::new(transport, "/health".to_string(), Duration::from_secs(2));
        let failure = prober.probe(&candidates()).await.unwrap_err();
        assert_eq!(failure.kind, ProbeFailureKind::MalformedResponse);
        assert_eq!(failure.attempts, 2);
        assert!(failure.last_error.contains("neither uptime nor timestamp"));
    }

    #[tokio::test(start_paused = true)]
    async fn aggregates_last_error_when_all_fail() {
        let transport = FakeTransport::new();
        transport.route("http://localhost:5002/health", FakeRoute::status(503, ""));
        let prober = Prober::new(transport, "/health".to_string(), Duration::from_secs(2));
        let failure = prober.probe(&candidates()).await.unwrap_err();
        assert_eq!(failure.kind, ProbeFailureKind::Unreachable);
        assert!(failure.last_error.contains("127.0.0.1:5002"));

        let empty = prober.probe(&[]).await.unwrap_err();
        assert_eq!(empty.attempts, 0);
        assert_eq!(empty.kind, ProbeFailureKind::Unreachable);
    }
}
