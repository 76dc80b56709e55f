use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::Client;
use serde_json::Value;
use tracing::debug;

const HTTP_CONNECT_TIMEOUT: Duration = Duration::from_secs(2);
const LOG_BODY_LIMIT: usize = 512;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HttpReply {
    pub status: u16,
    pub reason: String,
    pub body: String,
}

impl HttpReply {
    pub fn is_success(&self) -> bool {
        self.status / 100 == 2
    }

    pub fn status_line(&self) -> String {
        if self.reason.is_empty() {
            format!("HTTP {}", self.status)
        } else {
            format!("HTTP {} {}", self.status, self.reason)
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("request to {url} timed out after {timeout_ms}ms")]
    Timeout { url: String, timeout_ms: u128 },
    #[error("failed to connect to {url}: {message}")]
    Connect { url: String, message: String },
    #[error("request to {url} failed: {message}")]
    Request { url: String, message: String },
}

/// HTTP seam used by the prober, the lifecycle commands and remote config.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn get(&self, url: &str, timeout: Duration) -> Result<HttpReply, TransportError>;

    async fn post(
        &self,
        url: &str,
        body: Option<Value>,
        timeout: Duration,
    ) -> Result<HttpReply, TransportError>;
}

pub struct HttpTransport {
    client: Client,
    request_id: AtomicU64,
}

impl HttpTransport {
    pub fn new() -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .connect_timeout(HTTP_CONNECT_TIMEOUT)
            .build()?;
        Ok(Self {
            client,
            request_id: AtomicU64::new(1),
        })
    }

    async fn send(
        &self,
        method: &str,
        url: &str,
        body: Option<Value>,
        timeout: Duration,
    ) -> Result<HttpReply, TransportError> {
        let request_id = self.request_id.fetch_add(1, Ordering::Relaxed);
        debug!(method, request_id, url, "http request start");
        let mut request = match body {
            None if method == "GET" => self.client.get(url),
            None => self.client.post(url),
            Some(body) => self
                .client
                .post(url)
                .header(CONTENT_TYPE, "application/json")
                .body(body.to_string()),
        };
        request = request
            .header(ACCEPT, "application/json")
            .timeout(timeout);
        let response = request.send().await.map_err(|err| {
            debug!(
                method,
                request_id,
                timeout = err.is_timeout(),
                connect = err.is_connect(),
                error = %err,
                "http request failed"
            );
            map_reqwest_error(url, timeout, &err)
        })?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|err| map_reqwest_error(url, timeout, &err))?;
        debug!(
            method,
            request_id,
            status = status.as_u16(),
            body_len = body.len(),
            body = %truncate_for_log(&body),
            "http request done"
        );
        Ok(HttpReply {
            status: status.as_u16(),
            reason: status.canonical_reason().unwrap_or_default().to_string(),
            body,
        })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn get(&self, url: &str, timeout: Duration) -> Result<HttpReply, TransportError> {
        self.send("GET", url, None, timeout).await
    }

    async fn post(
        &self,
        url: &str,
        body: Option<Value>,
        timeout: Duration,
    ) -> Result<HttpReply, TransportError> {
        self.send("POST", url, body, timeout).await
    }
}

fn map_reqwest_error(url: &str, timeout: Duration, err: &reqwest::Error) -> TransportError {
    if err.is_timeout() {
        TransportError::Timeout {
            url: url.to_string(),
            timeout_ms: timeout.as_millis(),
        }
    } else if err.is_connect() {
        TransportError::Connect {
            url: url.to_string(),
            message: err.to_string(),
        }
    } else {
        TransportError::Request {
            url: url.to_string(),
            message: err.to_string(),
        }
    }
}

/// Bounds any transport future by `timeout`, whatever the transport does.
pub(crate) async fn with_deadline<F>(
    url: &str,
    timeout: Duration,
    request: F,
) -> Result<HttpReply, TransportError>
where
    F: Future<Output = Result<HttpReply, TransportError>>,
{
    match tokio::time::timeout(timeout, request).await {
        Ok(result) => result,
        Err(_) => Err(TransportError::Timeout {
            url: url.to_string(),
            timeout_ms: timeout.as_millis(),
        }),
    }
}

pub fn join_base_path(base: &str, path: &str) -> Result<String, String> {
    if base.trim().is_empty() {
        return Err("base url is empty".to_string());
    }
    let normalized_base = base.trim().trim_end_matches('/');
    let normalized_path = if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{path}")
    };
    Ok(format!("{normalized_base}{normalized_path}"))
}

pub(crate) fn truncate_for_log(body: &str) -> String {
    let escaped = body.replace('\n', "\\n").replace('\r', "\\r");
    if escaped.len() <= LOG_BODY_LIMIT {
        return escaped;
    }
    let mut end = LOG_BODY_LIMIT;
    while !escaped.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &escaped[..end])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn joins_base_and_path() {
        assert_eq!(
            join_base_path("http://127.0.0.1:5002/", "health").expect("join"),
            "http://127.0.0.1:5002/health"
        );
        assert_eq!(
            join_base_path("http://localhost:5002", "/start").expect("join"),
            "http://localhost:5002/start"
        );
        assert!(join_base_path("  ", "/health").is_err());
    }

    #[test]
    fn status_line_includes_reason() {
        let reply = HttpReply {
            status: 500,
            reason: "Internal Server Error".to_string(),
            body: String::new(),
        };
        assert_eq!(reply.status_line(), "HTTP 500 Internal Server Error");
        assert!(!reply.is_success());
    }

    #[test]
    fn truncates_long_bodies_on_char_boundary() {
        let body = "é".repeat(LOG_BODY_LIMIT);
        let truncated = truncate_for_log(&body);
        assert!(truncated.ends_with("..."));
        assert!(truncated.len() <= LOG_BODY_LIMIT + 3);
    }
}
