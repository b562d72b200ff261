//! HTTP API handlers

pub mod approval;
pub mod auth;
pub mod error;
pub mod health;
pub mod jobs;
pub mod optimize;
pub mod webhooks;
pub mod workspace;

pub use error::ApiError;

use crate::tenant::audit::{self, AuditEvent};
use crate::tenant::guard::{self, DataAccess, Decision, DenyReason, EntityType, GuardOptions};
use crate::tenant::resolver::{self, ResolveError};
use crate::tenant::{Identity, TenantContext};
use crate::AppState;

/// Resolve the caller's tenant context, mapping resolution failures to
/// their HTTP errors
pub(crate) async fn resolve_context(
    state: &AppState,
    identity: &Identity,
    allow_super_admin: bool,
    path: &str,
) -> Result<TenantContext, ApiError> {
    resolver::resolve(&state.db, identity, allow_super_admin, path)
        .await
        .map_err(|e| match e {
            ResolveError::NoWorkspace => ApiError::NoWorkspace,
            ResolveError::InvalidWorkspaceAccess => ApiError::InvalidWorkspaceAccess,
            ResolveError::Database => ApiError::Internal("tenant resolution failed".to_string()),
        })
}

/// Enforce the guard for a path-supplied workspace id
///
/// Re-derives membership for the target workspace (strict mode), records
/// an audit event for every denial before the error is returned.
pub(crate) async fn enforce_workspace_access(
    state: &AppState,
    context: &TenantContext,
    target_workspace: &str,
    path: &str,
) -> Result<(), ApiError> {
    let options = GuardOptions {
        allow_super_admin: true,
        ..GuardOptions::default()
    };

    let membership = resolver::verify_workspace_membership(
        &state.db,
        &context.user_id,
        target_workspace,
    )
    .await
    .map_err(|_| ApiError::Internal("membership lookup failed".to_string()))?;

    match guard::authorize(Some(context), &options, Some(target_workspace), Some(membership)) {
        Decision::Allow => Ok(()),
        Decision::Deny(reason) => {
            let event_type = match &reason {
                DenyReason::AuthRequired => "auth_required",
                DenyReason::WorkspaceRequired => "workspace_required",
                DenyReason::CrossTenant { .. } => "cross_tenant_denied",
            };
            audit::record(
                &state.db,
                AuditEvent {
                    user_id: Some(&context.user_id),
                    workspace_id: context.workspace_id.as_deref(),
                    attempted_workspace_id: Some(target_workspace),
                    path: Some(path),
                    ..AuditEvent::new(event_type)
                },
            )
            .await;

            Err(match reason {
                DenyReason::AuthRequired => ApiError::AuthRequired,
                DenyReason::WorkspaceRequired => ApiError::WorkspaceRequired,
                DenyReason::CrossTenant { .. } => ApiError::CrossTenantAccessDenied,
            })
        }
    }
}

/// Enforce row-level access to a workspace-scoped entity
///
/// Both "missing" and "exists elsewhere" collapse to the same 404; the
/// cross-tenant case additionally leaves an audit record.
pub(crate) async fn enforce_data_access(
    state: &AppState,
    context: &TenantContext,
    caller_workspace: &str,
    entity_type: EntityType,
    entity_id: &str,
    path: &str,
) -> Result<(), ApiError> {
    let access = guard::validate_data_access(&state.db, caller_workspace, entity_type, entity_id)
        .await
        .map_err(|_| ApiError::Internal("data access check failed".to_string()))?;

    match access {
        DataAccess::Granted => Ok(()),
        DataAccess::NotFound => {
            Err(ApiError::EntityNotFoundInScope(entity_type.as_str().to_string()))
        }
        DataAccess::CrossTenant { data_workspace } => {
            audit::record(
                &state.db,
                AuditEvent {
                    user_id: Some(&context.user_id),
                    workspace_id: Some(caller_workspace),
                    attempted_workspace_id: Some(&data_workspace),
                    entity_type: Some(entity_type.as_str()),
                    entity_id: Some(entity_id),
                    path: Some(path),
                    ..AuditEvent::new("cross_tenant_data_access")
                },
            )
            .await;
            Err(ApiError::EntityNotFoundInScope(entity_type.as_str().to_string()))
        }
    }
}
