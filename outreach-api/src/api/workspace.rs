//! Workspace-scoped entity reads

use axum::extract::{Path, State};
use axum::{Extension, Json};

use outreach_common::db::models::CampaignProspect;

use super::{enforce_data_access, enforce_workspace_access, resolve_context, ApiError};
use crate::tenant::guard::EntityType;
use crate::tenant::Identity;
use crate::AppState;

/// GET /api/workspace/:workspace_id/prospects/:prospect_id
///
/// The path workspace id is never trusted: membership is re-derived, and
/// the prospect row's own workspace_id is checked before anything is
/// returned.
pub async fn get_prospect(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path((workspace_id, prospect_id)): Path<(String, String)>,
) -> Result<Json<CampaignProspect>, ApiError> {
    let path = format!("/api/workspace/{}/prospects/{}", workspace_id, prospect_id);

    let context = resolve_context(&state, &identity, true, &path).await?;
    enforce_workspace_access(&state, &context, &workspace_id, &path).await?;
    enforce_data_access(
        &state,
        &context,
        &workspace_id,
        EntityType::Prospect,
        &prospect_id,
        &path,
    )
    .await?;

    let prospect = sqlx::query_as::<_, CampaignProspect>(
        r#"
        SELECT id, campaign_id, workspace_id, first_name, last_name, email,
               linkedin_url, title, company_name, connection_degree, status,
               source, source_session_id
        FROM campaign_prospects
        WHERE id = ? AND workspace_id = ?
        "#,
    )
    .bind(&prospect_id)
    .bind(&workspace_id)
    .fetch_optional(&state.db)
    .await?
    .ok_or_else(|| ApiError::EntityNotFoundInScope("prospect".to_string()))?;

    Ok(Json(prospect))
}
