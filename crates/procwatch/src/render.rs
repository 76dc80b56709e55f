use crossterm::style::Stylize;
use procwatch::{Badge, ProbeFailure, Reachable, StatusView, StreamState};
use procwatch_protocol::ProgressEvent;
use serde_json::Value;

const PAYLOAD_PREVIEW_CHARS: usize = 160;

pub(crate) fn badge(badge: Badge, color: bool) -> String {
    let label = format!("{badge:<8}");
    if !color {
        return label;
    }
    match badge {
        Badge::Online => label.green().bold().to_string(),
        Badge::Offline => label.dark_grey().to_string(),
        Badge::Starting | Badge::Stopping => label.yellow().to_string(),
        Badge::Error => label.red().bold().to_string(),
    }
}

pub(crate) fn status_line(view: &StatusView, color: bool) -> String {
    let mut line = badge(view.badge, color);
    if let Some(endpoint) = &view.endpoint {
        line.push_str(&format!(" {endpoint}"));
    }
    if let Some(detail) = &view.detail {
        line.push_str(&format!(" - {detail}"));
    }
    line
}

pub(crate) fn probe_verdict(result: &Result<Reachable, ProbeFailure>, color: bool) -> String {
    match result {
        Ok(reachable) => {
            let mut line = format!("{} {}", badge(Badge::Online, color), reachable.endpoint);
            if let Some(uptime) = reachable.report.uptime {
                line.push_str(&format!(" (uptime {uptime:.0}s)"));
            }
            if let Some(version) = &reachable.report.version {
                line.push_str(&format!(" version {version}"));
            }
            line
        }
        Err(failure) => format!("{} {failure}", badge(Badge::Offline, color)),
    }
}

pub(crate) fn progress_line(event: &ProgressEvent) -> String {
    let payload = match &event.payload {
        Value::Null => String::new(),
        payload => format!(" {}", preview(&payload.to_string())),
    };
    format!("[{}] {}{payload}", event.unit_id, event.kind)
}

pub(crate) fn stream_line(state: StreamState) -> String {
    let label = match state {
        StreamState::Idle => "idle",
        StreamState::Connecting => "connecting",
        StreamState::Connected => "connected",
        StreamState::Disconnected => "disconnected (restart watch to resubscribe)",
    };
    format!("stream {label}")
}

fn preview(text: &str) -> String {
    if text.chars().count() <= PAYLOAD_PREVIEW_CHARS {
        return text.to_string();
    }
    let mut cut: String = text.chars().take(PAYLOAD_PREVIEW_CHARS).collect();
    cut.push_str("...");
    cut
}
