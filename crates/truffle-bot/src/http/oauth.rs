use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::app::AppState;

/// GET /slack/oauth — completes the OAuth install flow by exchanging the
/// temporary code for a workspace token.
pub async fn oauth_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<Value>, (StatusCode, String)> {
    let code = params
        .get("code")
        .ok_or((StatusCode::BAD_REQUEST, "missing code parameter".to_string()))?;

    let (client_id, client_secret) = match (&state.config.bot.client_id, &state.config.bot.client_secret) {
        (Some(id), Some(secret)) => (id.clone(), secret.clone()),
        _ => {
            return Err((
                StatusCode::BAD_REQUEST,
                "oauth is not configured".to_string(),
            ))
        }
    };

    let response = reqwest::Client::new()
        .post("https://slack.com/api/oauth.v2.access")
        .form(&[
            ("code", code.as_str()),
            ("client_id", client_id.as_str()),
            ("client_secret", client_secret.as_str()),
        ])
        .send()
        .await
        .map_err(|e| (StatusCode::BAD_GATEWAY, e.to_string()))?;

    let body: Value = response
        .json()
        .await
        .map_err(|e| (StatusCode::BAD_GATEWAY, e.to_string()))?;

    if body.get("ok").and_then(|v| v.as_bool()).unwrap_or(false) {
        info!("oauth exchange completed");
        Ok(Json(json!({ "ok": true, "message": "installation complete" })))
    } else {
        let error = body
            .get("error")
            .and_then(|v| v.as_str())
            .unwrap_or("unknown_error");
        warn!(error, "oauth exchange failed");
        Err((StatusCode::BAD_REQUEST, error.to_string()))
    }
}
