//! Candidate optimization endpoints

use axum::extract::State;
use axum::{Extension, Json};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::SqlitePool;

use outreach_common::db::models::LearningModel;

use super::{resolve_context, ApiError};
use crate::optimizer::{optimize, Candidate, FeatureWeights, Model, OptimizeMode};
use crate::optimizer::score::ScoredCandidate;
use crate::tenant::Identity;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct OptimizeRequest {
    pub candidates: Vec<Candidate>,
    #[serde(default = "default_mode")]
    pub mode: OptimizeMode,
}

fn default_mode() -> OptimizeMode {
    OptimizeMode::Balanced
}

#[derive(Debug, Serialize)]
pub struct OptimizeResponse {
    pub candidates: Vec<ScoredCandidate>,
    pub optimization_applied: bool,
    pub input_count: usize,
    pub output_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_accuracy: Option<f64>,
}

/// Load the caller's trained model, if one exists
async fn load_model(
    db: &SqlitePool,
    user_id: &str,
    workspace_id: &str,
) -> Result<Option<(Model, LearningModel)>, ApiError> {
    let row = sqlx::query_as::<_, LearningModel>(
        r#"
        SELECT user_id, workspace_id, model_type, feature_weights,
               learned_preferences, accuracy_score, sessions_trained_on,
               last_trained_session
        FROM learning_models
        WHERE user_id = ? AND workspace_id = ? AND model_type = 'prospect_approval'
        "#,
    )
    .bind(user_id)
    .bind(workspace_id)
    .fetch_optional(db)
    .await?;

    let Some(row) = row else {
        return Ok(None);
    };

    let weights: FeatureWeights = serde_json::from_str(&row.feature_weights)
        .map_err(|e| ApiError::Internal(format!("stored weights unreadable: {}", e)))?;

    Ok(Some((
        Model {
            weights,
            accuracy_score: row.accuracy_score,
            sessions_trained_on: row.sessions_trained_on,
        },
        row,
    )))
}

/// POST /api/optimize
///
/// Without a trained model the batch passes through untouched with
/// `optimization_applied: false`.
pub async fn optimize_candidates(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Json(request): Json<OptimizeRequest>,
) -> Result<Json<OptimizeResponse>, ApiError> {
    let context = resolve_context(&state, &identity, false, "/api/optimize").await?;
    let workspace_id = context
        .workspace_id
        .clone()
        .ok_or(ApiError::WorkspaceRequired)?;

    let model = load_model(&state.db, &context.user_id, &workspace_id).await?;
    let input_count = request.candidates.len();

    let outcome = optimize(
        request.candidates,
        model.as_ref().map(|(m, _)| m),
        request.mode,
    );

    Ok(Json(OptimizeResponse {
        output_count: outcome.candidates.len(),
        input_count,
        optimization_applied: outcome.applied,
        model_accuracy: model.as_ref().map(|(m, _)| m.accuracy_score),
        candidates: outcome.candidates,
    }))
}

/// GET /api/optimize/stats
pub async fn optimize_stats(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let context = resolve_context(&state, &identity, false, "/api/optimize/stats").await?;
    let workspace_id = context
        .workspace_id
        .clone()
        .ok_or(ApiError::WorkspaceRequired)?;

    let model = load_model(&state.db, &context.user_id, &workspace_id).await?;

    let Some((model, row)) = model else {
        return Ok(Json(json!({ "model": null })));
    };

    let preferences: serde_json::Value =
        serde_json::from_str(&row.learned_preferences).unwrap_or(serde_json::Value::Null);

    Ok(Json(json!({
        "model": {
            "accuracy_score": model.accuracy_score,
            "sessions_trained_on": model.sessions_trained_on,
            "last_trained_session": row.last_trained_session,
            "learned_preferences": preferences,
        }
    })))
}
