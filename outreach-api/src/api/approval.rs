//! Approval session endpoints
//!
//! Sessions are created in the caller's current workspace. Decide and
//! complete look the session up by id and run the row-level workspace
//! check before touching it, so session ids from other tenants 404.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::{Extension, Json};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::warn;

use outreach_common::db::models::ApprovalSession;

use super::{enforce_data_access, resolve_context, ApiError};
use crate::approval::{self, CandidateInput, Verdict};
use crate::optimizer;
use crate::tenant::guard::EntityType;
use crate::tenant::{Identity, TenantContext};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateSessionRequest {
    #[serde(default)]
    pub campaign_id: Option<String>,
    #[serde(default)]
    pub source_criteria: Option<String>,
    pub candidates: Vec<CandidateInput>,
}

/// POST /api/approval/sessions
pub async fn create_session(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Json(request): Json<CreateSessionRequest>,
) -> Result<(StatusCode, Json<ApprovalSession>), ApiError> {
    let path = "/api/approval/sessions";
    let context = resolve_context(&state, &identity, false, path).await?;
    let workspace_id = required_workspace(&context)?;

    // A target campaign must live in the caller's workspace
    if let Some(campaign_id) = &request.campaign_id {
        enforce_data_access(
            &state,
            &context,
            &workspace_id,
            EntityType::Campaign,
            campaign_id,
            path,
        )
        .await?;
    }

    let session = approval::create_session(
        &state.db,
        &workspace_id,
        &context.user_id,
        request.campaign_id.as_deref(),
        request.source_criteria.as_deref(),
        &request.candidates,
    )
    .await?;

    Ok((StatusCode::CREATED, Json(session)))
}

#[derive(Debug, Deserialize)]
pub struct DecideRequest {
    pub candidate_id: String,
    pub decision: Verdict,
}

#[derive(Debug, Serialize)]
pub struct DecideResponse {
    pub session_id: String,
    pub candidate_id: String,
    pub decision: &'static str,
    pub approved_count: i64,
    pub rejected_count: i64,
    pub pending_count: i64,
    pub session_completed: bool,
}

/// POST /api/approval/sessions/:session_id/decide
pub async fn decide_candidate(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(session_id): Path<String>,
    Json(request): Json<DecideRequest>,
) -> Result<Json<DecideResponse>, ApiError> {
    let path = format!("/api/approval/sessions/{}/decide", session_id);
    let context = resolve_context(&state, &identity, false, &path).await?;
    let workspace_id = required_workspace(&context)?;

    enforce_data_access(
        &state,
        &context,
        &workspace_id,
        EntityType::ApprovalSession,
        &session_id,
        &path,
    )
    .await?;

    let outcome = approval::decide(
        &state.db,
        &session_id,
        &request.candidate_id,
        request.decision,
    )
    .await?;

    if outcome.session_completed {
        retrain_after_completion(&state, &context, &workspace_id).await;
    }

    Ok(Json(DecideResponse {
        session_id: outcome.session_id,
        candidate_id: outcome.candidate_id,
        decision: outcome.verdict.as_str(),
        approved_count: outcome.approved_count,
        rejected_count: outcome.rejected_count,
        pending_count: outcome.pending_count,
        session_completed: outcome.session_completed,
    }))
}

/// POST /api/approval/sessions/:session_id/complete
pub async fn complete_session(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(session_id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let path = format!("/api/approval/sessions/{}/complete", session_id);
    let context = resolve_context(&state, &identity, false, &path).await?;
    let workspace_id = required_workspace(&context)?;

    enforce_data_access(
        &state,
        &context,
        &workspace_id,
        EntityType::ApprovalSession,
        &session_id,
        &path,
    )
    .await?;

    let completed = approval::complete_session(&state.db, &session_id).await?;
    if completed {
        retrain_after_completion(&state, &context, &workspace_id).await;
    }

    let session = approval::get_session(&state.db, &session_id)
        .await?
        .ok_or_else(|| ApiError::EntityNotFoundInScope("approval_session".to_string()))?;

    Ok(Json(json!({
        "completed": completed,
        "session": session,
    })))
}

fn required_workspace(context: &TenantContext) -> Result<String, ApiError> {
    context
        .workspace_id
        .clone()
        .ok_or(ApiError::WorkspaceRequired)
}

/// Retrain the caller's model after a session completes. Training failure
/// never fails the completion that triggered it.
async fn retrain_after_completion(state: &AppState, context: &TenantContext, workspace_id: &str) {
    if let Err(e) = optimizer::retrain(&state.db, &context.user_id, workspace_id).await {
        warn!(
            "Model retrain failed for user {} in workspace {}: {}",
            context.user_id, workspace_id, e
        );
    }
}
