//! Scheduled job triggers
//!
//! Jobs are triggered by an external scheduler that presents a shared
//! secret header. The secret comparison goes through SHA-256 digests so
//! the timing of the comparison reveals nothing about the secret.

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use serde_json::json;

use outreach_common::token::hash_token;

use super::ApiError;
use crate::notify::{notify_ops, RecoveryNotification};
use crate::recovery::{self, RecoveryConfig};
use crate::AppState;

const CRON_SECRET_HEADER: &str = "x-cron-secret";

fn cron_secret_matches(provided: Option<&str>, expected: &str) -> bool {
    match provided {
        Some(provided) if !expected.is_empty() => {
            // Digest comparison instead of string comparison keeps the
            // check constant-time in the secret contents
            hash_token(provided) == hash_token(expected)
        }
        _ => false,
    }
}

/// POST /api/jobs/recover-orphans
pub async fn recover_orphans(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<(StatusCode, Json<serde_json::Value>), ApiError> {
    let provided = headers
        .get(CRON_SECRET_HEADER)
        .and_then(|v| v.to_str().ok());
    if !cron_secret_matches(provided, &state.cron_secret) {
        return Err(ApiError::CronSecretInvalid);
    }

    let config = RecoveryConfig::load(&state.db).await?;
    let summary = recovery::run(&state.db, &config).await?;

    notify_ops(
        &state.db,
        &RecoveryNotification {
            event: "orphan_recovery_completed",
            sessions_checked: summary.sessions_checked,
            orphans_found: summary.orphans_found,
            recovered: summary.recovered,
            queued: summary.queued,
            errors: summary.errors,
            capped: summary.capped,
        },
    )
    .await;

    // Partial failure is still a 200 with per-item errors in the body;
    // only a run where every attempted recovery failed is a 500
    let total_failure = summary.orphans_found > 0 && summary.recovered == 0 && summary.errors > 0;
    let status = if total_failure {
        StatusCode::INTERNAL_SERVER_ERROR
    } else {
        StatusCode::OK
    };

    Ok((status, Json(json!(summary))))
}
