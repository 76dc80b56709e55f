use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::http::{HttpReply, Transport, TransportError};

#[derive(Clone, Debug)]
pub(crate) enum FakeRoute {
    Reply { status: u16, body: String },
    Hang,
}

impl FakeRoute {
    pub(crate) fn ok(body: &str) -> Self {
        FakeRoute::Reply {
            status: 200,
            body: body.to_string(),
        }
    }

    pub(crate) fn status(status: u16, body: &str) -> Self {
        FakeRoute::Reply {
            status,
            body: body.to_string(),
        }
    }
}

/// In-memory transport; unrouted urls behave like a refused connection.
#[derive(Default)]
pub(crate) struct FakeTransport {
    routes: Mutex<HashMap<String, FakeRoute>>,
    calls: Mutex<Vec<String>>,
    bodies: Mutex<Vec<Value>>,
}

impl FakeTransport {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn route(&self, url: &str, route: FakeRoute) {
        self.routes
            .lock()
            .expect("routes lock")
            .insert(url.to_string(), route);
    }

    pub(crate) fn calls(&self) -> Vec<String> {
        self.calls.lock().expect("calls lock").clone()
    }

    pub(crate) fn posted_bodies(&self) -> Vec<Value> {
        self.bodies.lock().expect("bodies lock").clone()
    }

    async fn answer(&self, method: &str, url: &str) -> Result<HttpReply, TransportError> {
        self.calls
            .lock()
            .expect("calls lock")
            .push(format!("{method} {url}"));
        let route = self.routes.lock().expect("routes lock").get(url).cloned();
        match route {
            Some(FakeRoute::Reply { status, body }) => Ok(HttpReply {
                status,
                reason: reason_for(status).to_string(),
                body,
            }),
            Some(FakeRoute::Hang) => std::future::pending().await,
            None => Err(TransportError::Connect {
                url: url.to_string(),
                message: "connection refused".to_string(),
            }),
        }
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn get(&self, url: &str, _timeout: Duration) -> Result<HttpReply, TransportError> {
        self.answer("GET", url).await
    }

    async fn post(
        &self,
        url: &str,
        body: Option<Value>,
        _timeout: Duration,
    ) -> Result<HttpReply, TransportError> {
        if let Some(body) = body {
            self.bodies.lock().expect("bodies lock").push(body);
        }
        self.answer("POST", url).await
    }
}

fn reason_for(status: u16) -> &'static str {
    match status {
        200 => "OK",
        202 => "Accepted",
        404 => "Not Found",
        500 => "Internal Server Error",
        503 => "Service Unavailable",
        _ => "",
    }
}
