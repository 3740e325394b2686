//! `POST /webhooks/github` (spec.md §6): verifies the HMAC signature,
//! decodes the event envelope, and hands it to
//! `dispatch_sync::process_webhook`.

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
};
use dispatch_sync::{parse_event, process_webhook, verify_signature};

use crate::error::ApiError;
use crate::state::AppState;

fn header(headers: &HeaderMap, name: &str) -> Result<String, ApiError> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .ok_or_else(|| ApiError::BadRequest(format!("missing {name} header")))
}

pub async fn github_webhook(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> Result<StatusCode, ApiError> {
    let signature = headers
        .get("X-Hub-Signature-256")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .ok_or_else(|| ApiError::Unauthorized("missing X-Hub-Signature-256 header".to_string()))?;
    if !verify_signature(state.config.webhook_secret.as_bytes(), &body, &signature) {
        return Err(ApiError::Unauthorized("invalid webhook signature".to_string()));
    }

    let event_kind = header(&headers, "X-GitHub-Event")?;
    let delivery_id = header(&headers, "X-GitHub-Delivery")?;
    let event = parse_event(&event_kind, &delivery_id, &body).map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let result = process_webhook(&event, state.store.as_ref(), &state.config.conventions).await?;
    if !result.errors.is_empty() {
        tracing::warn!(delivery_id, errors = result.errors.len(), "webhook processing reported errors");
    }
    Ok(StatusCode::OK)
}
