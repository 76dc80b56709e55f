use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use procwatch::{
    CommandError, HttpTransport, Monitor, MonitorConfig, ProcessState, StreamState, Transport,
};
use serde_json::json;
use tokio::net::TcpListener;

async fn serve(app: Router) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("serve");
    });
    addr
}

/// A port nothing listens on.
async fn refused_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    listener.local_addr().expect("local addr").port()
}

fn transport() -> Arc<dyn Transport> {
    Arc::new(HttpTransport::new().expect("http client"))
}

fn config(candidates: Vec<String>) -> MonitorConfig {
    let mut config = MonitorConfig {
        candidates,
        ..MonitorConfig::default()
    };
    config.timing.reconcile_interval = Duration::from_secs(60);
    config.timing.probe_timeout = Duration::from_secs(2);
    config
}

async fn wait_until<F>(what: &str, mut ready: F)
where
    F: FnMut() -> bool,
{
    let waited = tokio::time::timeout(Duration::from_secs(10), async {
        while !ready() {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await;
    assert!(waited.is_ok(), "timed out waiting for {what}");
}

#[tokio::test]
async fn falls_back_to_the_candidate_that_answers() {
    let app = Router::new().route("/health", get(|| async { Json(json!({ "uptime": 120 })) }));
    let addr = serve(app).await;
    let refused = refused_port().await;

    let monitor = Monitor::mount(
        &config(vec![
            format!("http://localhost:{refused}"),
            format!("http://127.0.0.1:{}", addr.port()),
        ]),
        transport(),
    )
    .await;
    wait_until("running", || monitor.status().state == ProcessState::Running).await;

    let status = monitor.status();
    assert_eq!(
        status.endpoint.as_deref(),
        Some(format!("http://127.0.0.1:{}/health", addr.port()).as_str())
    );
    assert!(status.detail.is_none());
    assert!(status.last_confirmed_at.is_some());
    monitor.teardown().await;
}

#[tokio::test]
async fn rejected_start_shows_the_status_text() {
    let app = Router::new()
        .route("/health", get(|| async { StatusCode::SERVICE_UNAVAILABLE }))
        .route(
            "/start",
            post(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "model load failed") }),
        );
    let addr = serve(app).await;
    let monitor = Monitor::mount(
        &config(vec![format!("http://127.0.0.1:{}", addr.port())]),
        transport(),
    )
    .await;
    wait_until("first probe", || monitor.status().detail.is_some()).await;

    let err = monitor.commands().start().await.unwrap_err();
    assert!(matches!(err, CommandError::Rejected { status: 500, .. }));
    let status = monitor.status();
    assert_eq!(status.state, ProcessState::Error);
    let detail = status.detail.expect("error detail");
    assert!(detail.contains("Internal Server Error"), "detail was {detail}");
    assert!(detail.contains("model load failed"), "detail was {detail}");
    monitor.teardown().await;
}

async fn push_frames(ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.on_upgrade(send_frames)
}

async fn send_frames(mut socket: WebSocket) {
    let mut frames = vec![
        "not json at all".to_string(),
        json!({ "type": "heartbeat", "ts": 1 }).to_string(),
        json!({ "type": "agent_progress", "unit_id": "other", "kind": "noise", "timestamp": 1 })
            .to_string(),
    ];
    for step in 1..=5 {
        frames.push(
            json!({
                "type": "agent_progress",
                "unit_id": "abc",
                "kind": format!("step-{step}"),
                "payload": { "step": step },
                "timestamp": step,
            })
            .to_string(),
        );
    }
    frames.push(json!({ "type": "agent_progress", "unit_id": "abc" }).to_string());
    for frame in frames {
        if socket.send(Message::Text(frame)).await.is_err() {
            return;
        }
    }
    let _ = socket.send(Message::Close(None)).await;
}

#[tokio::test]
async fn keeps_the_last_progress_events_per_unit() {
    let addr = serve(Router::new().route("/ws", get(push_frames))).await;
    let mut config = config(vec![format!("http://127.0.0.1:{}", refused_port().await)]);
    config.stream_url = Some(format!("ws://127.0.0.1:{}/ws", addr.port()));
    config.event_log_capacity = 3;
    let monitor = Monitor::mount(&config, transport()).await;

    let _feed = monitor.subscribe("abc").expect("listener configured");
    assert!(monitor.reconnect());
    wait_until("stream to close", || {
        monitor.stream_state() == Some(StreamState::Disconnected)
    })
    .await;

    let listener = monitor.listener().expect("listener");
    let kinds: Vec<String> = listener.log("abc").into_iter().map(|event| event.kind).collect();
    assert_eq!(kinds, vec!["step-3", "step-4", "step-5"]);
    assert!(listener.log("other").is_empty());
    monitor.teardown().await;
}

#[tokio::test]
async fn stop_then_unreachable_settles_offline() {
    let app = Router::new().route("/stop", post(|| async { Json(json!({ "message": "bye" })) }));
    let addr = serve(app).await;
    let mut config = config(vec![format!("http://127.0.0.1:{}", addr.port())]);
    config.timing.reconcile_interval = Duration::from_millis(100);
    let monitor = Monitor::mount(&config, transport()).await;

    let receipt = monitor.commands().stop().await.expect("accepted");
    assert_eq!(receipt.message.as_deref(), Some("bye"));
    wait_until("stopped", || monitor.status().state == ProcessState::Stopped).await;
    assert!(monitor.status().generation >= receipt.generation);
    monitor.teardown().await;
}
