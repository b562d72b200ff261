//! Tenant context resolution
//!
//! Maps an authenticated identity to its current workspace, role, and
//! parent organization. Platform admins get an unrestricted context, but
//! only when the calling endpoint explicitly allows it.

use sqlx::SqlitePool;

use super::audit::{self, AuditEvent};
use super::{Identity, Role, TenantContext};

/// Resolution failure reasons
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolveError {
    /// Identity has no current workspace and is not a (permitted) super-admin
    NoWorkspace,
    /// Identity's current workspace has no membership row for them
    InvalidWorkspaceAccess,
    /// Underlying query failed
    Database,
}

/// Check whether the identity is on the platform-admin set
///
/// The set is data (`platform_admins` table), not literals in guard code,
/// so it can be rotated and faked in tests.
pub async fn is_platform_admin(db: &SqlitePool, user_id: &str) -> Result<bool, sqlx::Error> {
    sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM platform_admins WHERE user_id = ?)")
        .bind(user_id)
        .fetch_one(db)
        .await
}

/// Resolve an identity's tenant context
///
/// `allow_super_admin` must be set per endpoint; it is never a blanket
/// bypass. `path` is recorded on audit events for failure forensics.
pub async fn resolve(
    db: &SqlitePool,
    identity: &Identity,
    allow_super_admin: bool,
    path: &str,
) -> Result<TenantContext, ResolveError> {
    let is_super = match is_platform_admin(db, &identity.user_id).await {
        Ok(v) => v,
        Err(_) => return Err(ResolveError::Database),
    };

    let current_workspace: Option<String> = match sqlx::query_scalar(
        "SELECT current_workspace_id FROM users WHERE id = ?",
    )
    .bind(&identity.user_id)
    .fetch_optional(db)
    .await
    {
        Ok(v) => v.flatten(),
        Err(_) => return Err(ResolveError::Database),
    };

    let Some(workspace_id) = current_workspace else {
        if is_super && allow_super_admin {
            return Ok(TenantContext {
                user_id: identity.user_id.clone(),
                workspace_id: None,
                organization_id: None,
                role: Role::SuperAdmin,
            });
        }

        // Audit before the caller turns this into a deny response
        audit::record(
            db,
            AuditEvent {
                user_id: Some(&identity.user_id),
                path: Some(path),
                ..AuditEvent::new("no_workspace_context")
            },
        )
        .await;
        return Err(ResolveError::NoWorkspace);
    };

    // Membership row for the current workspace, joined to the workspace's
    // parent organization
    let membership: Option<(String, String)> = match sqlx::query_as(
        r#"
        SELECT wm.role, w.organization_id
        FROM workspace_members wm
        JOIN workspaces w ON w.id = wm.workspace_id
        WHERE wm.user_id = ? AND wm.workspace_id = ?
        "#,
    )
    .bind(&identity.user_id)
    .bind(&workspace_id)
    .fetch_optional(db)
    .await
    {
        Ok(v) => v,
        Err(_) => return Err(ResolveError::Database),
    };

    match membership {
        Some((role, organization_id)) => Ok(TenantContext {
            user_id: identity.user_id.clone(),
            workspace_id: Some(workspace_id),
            organization_id: Some(organization_id),
            role: Role::from_membership(&role),
        }),
        None if is_super && allow_super_admin => Ok(TenantContext {
            user_id: identity.user_id.clone(),
            workspace_id: None,
            organization_id: None,
            role: Role::SuperAdmin,
        }),
        None => {
            audit::record(
                db,
                AuditEvent {
                    user_id: Some(&identity.user_id),
                    attempted_workspace_id: Some(&workspace_id),
                    path: Some(path),
                    ..AuditEvent::new("invalid_workspace_access")
                },
            )
            .await;
            Err(ResolveError::InvalidWorkspaceAccess)
        }
    }
}

/// Verify a user holds a membership row for a specific workspace
///
/// Used by the guard's strict mode to re-derive access for path-supplied
/// workspace ids instead of trusting the path value.
pub async fn verify_workspace_membership(
    db: &SqlitePool,
    user_id: &str,
    workspace_id: &str,
) -> Result<bool, sqlx::Error> {
    sqlx::query_scalar(
        "SELECT EXISTS(SELECT 1 FROM workspace_members WHERE user_id = ? AND workspace_id = ?)",
    )
    .bind(user_id)
    .bind(workspace_id)
    .fetch_one(db)
    .await
}
