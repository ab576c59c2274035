use std::sync::atomic::Ordering;
use std::sync::{Arc, OnceLock};

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use regex::Regex;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::app::AppState;
use crate::format;
use crate::signature;

/// POST /slack/events — the Events API entry point.
///
/// Answers the URL-verification challenge, checks the request signature
/// when a signing secret is configured, and acknowledges event callbacks
/// immediately; the actual question handling runs in a spawned task so
/// Slack never sees a slow response.
pub async fn events_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    state.events_received.fetch_add(1, Ordering::Relaxed);

    if let Some(secret) = &state.config.bot.signing_secret {
        let timestamp = header_str(&headers, "x-slack-request-timestamp");
        let provided = header_str(&headers, "x-slack-signature");
        let body_str = std::str::from_utf8(&body).unwrap_or("");
        let now = chrono::Utc::now().timestamp();
        if !signature::verify(secret, timestamp, body_str, provided, now) {
            warn!("rejected event with invalid signature");
            return (StatusCode::UNAUTHORIZED, "invalid signature").into_response();
        }
    }

    let payload: Value = match serde_json::from_slice(&body) {
        Ok(v) => v,
        Err(_) => return (StatusCode::BAD_REQUEST, "invalid json").into_response(),
    };

    match payload.get("type").and_then(|t| t.as_str()) {
        Some("url_verification") => {
            let challenge = payload
                .get("challenge")
                .and_then(|c| c.as_str())
                .unwrap_or("")
                .to_string();
            challenge.into_response()
        }
        Some("event_callback") => {
            if let Some(event) = payload.get("event").cloned() {
                let state = state.clone();
                tokio::spawn(async move {
                    handle_event(state, event).await;
                });
            }
            Json(json!({ "ok": true })).into_response()
        }
        _ => Json(json!({ "ok": true })).into_response(),
    }
}

async fn handle_event(state: Arc<AppState>, event: Value) {
    let event_type = event.get("type").and_then(|t| t.as_str()).unwrap_or("");
    if event_type != "app_mention" && event_type != "message" {
        debug!(event_type, "ignoring unsupported event type");
        return;
    }
    // Never answer other bots (or ourselves)
    if event.get("bot_id").is_some() {
        return;
    }

    let text = event.get("text").and_then(|t| t.as_str()).unwrap_or("");
    let channel = event.get("channel").and_then(|c| c.as_str()).unwrap_or("");
    if text.is_empty() || channel.is_empty() {
        return;
    }
    let thread_ts = event
        .get("thread_ts")
        .or_else(|| event.get("ts"))
        .and_then(|t| t.as_str());

    let cleaned = strip_mentions(text);
    let vocabulary = state.skills.terms().await;
    let Some(intent) = state.parser.parse(&cleaned, &vocabulary) else {
        debug!(text = %cleaned, "no expert question found in message");
        return;
    };
    state.queries_handled.fetch_add(1, Ordering::Relaxed);
    info!(skills = ?intent.skills, query_type = intent.query_type, "answering expert question");

    let reply = match state.api.search_experts(&intent.skills, 5, 0.0).await {
        Ok(response) => format::expert_reply(&intent.skills, &response.results),
        Err(e) => {
            warn!("expert search failed: {e}");
            format::fallback_reply()
        }
    };

    match state.slack.post_message(channel, &reply, thread_ts).await {
        Ok(()) => {
            state.replies_sent.fetch_add(1, Ordering::Relaxed);
        }
        Err(e) => warn!(channel, "failed to post reply: {e}"),
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> &'a str {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
}

/// Drop `<@...>` mention tokens so the parser sees only the question.
fn strip_mentions(text: &str) -> String {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| Regex::new(r"<@[^>]+>").unwrap());
    re.replace_all(text, " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}
