//! API error responses
//!
//! Every error leaving the service carries a stable machine-readable code
//! alongside the human-readable message. Cross-tenant entity lookups
//! surface as `ENTITY_NOT_FOUND_IN_SCOPE` with a 404, identical to a
//! genuinely missing entity, so responses never reveal whether an id
//! exists in another workspace.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use tracing::error;

/// API error with its HTTP mapping
#[derive(Debug)]
pub enum ApiError {
    /// 401 - missing or invalid session credential
    AuthRequired,
    /// 400 - authenticated but no current workspace
    NoWorkspace,
    /// 400 - endpoint requires a workspace context
    WorkspaceRequired,
    /// 403 - current workspace has no membership row for the caller
    InvalidWorkspaceAccess,
    /// 403 - request referenced a workspace the caller does not belong to
    CrossTenantAccessDenied,
    /// 404 - entity missing or outside the caller's workspace
    EntityNotFoundInScope(String),
    /// 404 - plain missing resource (non-tenant-scoped)
    NotFound(String),
    /// 401 - webhook signature failed verification
    WebhookSignatureInvalid,
    /// 404 - unrecognized webhook source slug
    UnknownWebhookSource(String),
    /// 401 - job trigger secret mismatch
    CronSecretInvalid,
    /// 400 - malformed or invalid request payload
    Validation(String),
    /// 500 - everything else
    Internal(String),
}

impl ApiError {
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            ApiError::AuthRequired => (StatusCode::UNAUTHORIZED, "AUTH_REQUIRED"),
            ApiError::NoWorkspace => (StatusCode::BAD_REQUEST, "NO_WORKSPACE"),
            ApiError::WorkspaceRequired => (StatusCode::BAD_REQUEST, "WORKSPACE_REQUIRED"),
            ApiError::InvalidWorkspaceAccess => {
                (StatusCode::FORBIDDEN, "INVALID_WORKSPACE_ACCESS")
            }
            ApiError::CrossTenantAccessDenied => {
                (StatusCode::FORBIDDEN, "CROSS_TENANT_ACCESS_DENIED")
            }
            ApiError::EntityNotFoundInScope(_) => {
                (StatusCode::NOT_FOUND, "ENTITY_NOT_FOUND_IN_SCOPE")
            }
            ApiError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            ApiError::WebhookSignatureInvalid => {
                (StatusCode::UNAUTHORIZED, "WEBHOOK_SIGNATURE_INVALID")
            }
            ApiError::UnknownWebhookSource(_) => {
                (StatusCode::NOT_FOUND, "UNKNOWN_WEBHOOK_SOURCE")
            }
            ApiError::CronSecretInvalid => (StatusCode::UNAUTHORIZED, "CRON_SECRET_INVALID"),
            ApiError::Validation(_) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR"),
            ApiError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        }
    }

    fn message(&self) -> String {
        match self {
            ApiError::AuthRequired => "Authentication required".to_string(),
            ApiError::NoWorkspace => "No workspace selected for this account".to_string(),
            ApiError::WorkspaceRequired => "This operation requires a workspace".to_string(),
            ApiError::InvalidWorkspaceAccess => {
                "Current workspace is not accessible".to_string()
            }
            ApiError::CrossTenantAccessDenied => "Access denied".to_string(),
            ApiError::EntityNotFoundInScope(entity) | ApiError::NotFound(entity) => {
                format!("{} not found", entity)
            }
            ApiError::WebhookSignatureInvalid => "Invalid webhook signature".to_string(),
            ApiError::UnknownWebhookSource(slug) => {
                format!("Unknown webhook source: {}", slug)
            }
            ApiError::CronSecretInvalid => "Invalid job trigger secret".to_string(),
            ApiError::Validation(msg) => msg.clone(),
            ApiError::Internal(_) => "Internal server error".to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if let ApiError::Internal(detail) = &self {
            error!("Internal error: {}", detail);
        }

        let (status, code) = self.status_and_code();
        let body = Json(json!({
            "error": self.message(),
            "code": code,
        }));

        (status, body).into_response()
    }
}

impl From<outreach_common::Error> for ApiError {
    fn from(e: outreach_common::Error) -> Self {
        use outreach_common::Error;
        match e {
            Error::NotFound(what) => ApiError::NotFound(what),
            Error::InvalidInput(msg) => ApiError::Validation(msg),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(e: sqlx::Error) -> Self {
        ApiError::Internal(format!("database error: {}", e))
    }
}
