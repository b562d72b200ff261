//! Database models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct User {
    pub id: String,
    pub email: String,
    pub display_name: Option<String>,
    pub current_workspace_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Workspace {
    pub id: String,
    pub organization_id: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct WorkspaceMember {
    pub workspace_id: String,
    pub user_id: String,
    pub role: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ApprovalSession {
    pub id: String,
    pub workspace_id: String,
    pub created_by: String,
    pub campaign_id: Option<String>,
    pub status: String,
    pub total_count: i64,
    pub approved_count: i64,
    pub rejected_count: i64,
    pub source_criteria: Option<String>,
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ApprovalCandidate {
    pub id: String,
    pub session_id: String,
    pub prospect_id: String,
    pub name: String,
    pub title: Option<String>,
    pub company_name: Option<String>,
    pub company_size: Option<String>,
    pub company_industry: Option<String>,
    pub email: Option<String>,
    pub linkedin_url: Option<String>,
    pub phone: Option<String>,
    pub connection_degree: Option<i64>,
    pub enrichment_score: Option<f64>,
    pub approval_status: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Campaign {
    pub id: String,
    pub workspace_id: String,
    pub name: String,
    pub status: String,
    pub outbound_channel: Option<String>,
    pub connection_template: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct CampaignProspect {
    pub id: String,
    pub campaign_id: String,
    pub workspace_id: String,
    pub first_name: String,
    pub last_name: String,
    pub email: Option<String>,
    pub linkedin_url: Option<String>,
    pub title: String,
    pub company_name: String,
    pub connection_degree: Option<String>,
    pub status: String,
    pub source: Option<String>,
    pub source_session_id: Option<String>,
}

/// Learned per-tenant scoring model row. `feature_weights` and
/// `learned_preferences` are JSON documents; the optimizer owns their
/// typed forms.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct LearningModel {
    pub user_id: String,
    pub workspace_id: String,
    pub model_type: String,
    pub feature_weights: String,
    pub learned_preferences: String,
    pub accuracy_score: f64,
    pub sessions_trained_on: i64,
    pub last_trained_session: Option<String>,
}
