//! Webhook intake
//!
//! Verification happens over the exact raw body bytes, before any JSON
//! parsing. A payload that fails verification is never parsed; a payload
//! that verifies but is not valid JSON is a 400, distinct from the 401
//! signature failure.

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::Json;
use serde_json::json;
use tracing::{info, warn};

use outreach_common::db::get_setting;
use outreach_common::webhook::{verify_source, Verification, WebhookSource};

use super::ApiError;
use crate::AppState;

/// POST /api/webhooks/:source
pub async fn receive_webhook(
    State(state): State<AppState>,
    Path(source_slug): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<serde_json::Value>, ApiError> {
    let Some(source) = WebhookSource::from_slug(&source_slug) else {
        return Err(ApiError::UnknownWebhookSource(source_slug));
    };

    let secret = get_setting(&state.db, source.secret_setting_key())
        .await
        .map_err(ApiError::from)?;
    let signature = headers
        .get(source.signature_header())
        .and_then(|v| v.to_str().ok());

    if verify_source(source, secret.as_deref(), &body, signature) == Verification::Invalid {
        warn!(
            "Rejected webhook for source '{}' ({} byte body, signature {})",
            source.as_slug(),
            body.len(),
            if signature.is_some() { "present" } else { "absent" }
        );
        return Err(ApiError::WebhookSignatureInvalid);
    }

    // Only now is the body trusted enough to parse
    let payload: serde_json::Value = serde_json::from_slice(&body)
        .map_err(|e| ApiError::Validation(format!("malformed webhook payload: {}", e)))?;

    let event = payload
        .get("event")
        .and_then(|v| v.as_str())
        .unwrap_or("unknown");
    info!("Accepted '{}' webhook event from {}", event, source.as_slug());

    Ok(Json(json!({
        "received": true,
        "source": source.as_slug(),
        "event": event,
    })))
}
