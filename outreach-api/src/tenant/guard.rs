//! Tenant isolation guard
//!
//! `authorize` is a pure decision function over its inputs - no hidden
//! state, no I/O - so request handling stays single-request-scoped and the
//! decision matrix is unit-testable with synthetic contexts. Row-level
//! checks (`validate_data_access`) load the entity's own workspace_id and
//! are mandatory before any read/write of a workspace-scoped entity by id:
//! they are the last line of defense against a forged path parameter.

use sqlx::SqlitePool;

use super::TenantContext;

/// Per-endpoint guard options
#[derive(Debug, Clone, Copy)]
pub struct GuardOptions {
    /// Deny callers without a workspace context
    pub require_workspace: bool,
    /// Honor platform-admin bypass on this endpoint
    pub allow_super_admin: bool,
    /// Re-verify membership for workspace ids supplied in the path/body
    pub strict_mode: bool,
}

impl Default for GuardOptions {
    fn default() -> Self {
        GuardOptions {
            require_workspace: true,
            allow_super_admin: false,
            strict_mode: true,
        }
    }
}

/// Deny reasons, mirroring the error taxonomy
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DenyReason {
    /// No authenticated context at all
    AuthRequired,
    /// Caller has no workspace and the endpoint requires one
    WorkspaceRequired,
    /// Referenced workspace is not one the caller belongs to
    CrossTenant {
        caller_workspace: Option<String>,
        target_workspace: String,
    },
}

/// Guard decision
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny(DenyReason),
}

/// Decide whether a request may proceed
///
/// * `context` - resolved tenant context (None = unauthenticated)
/// * `target_workspace` - workspace id referenced by the request path or
///   body, if any. Never trusted: in strict mode the caller must supply
///   `target_membership`, the result of an explicit membership lookup for
///   that workspace id.
pub fn authorize(
    context: Option<&TenantContext>,
    options: &GuardOptions,
    target_workspace: Option<&str>,
    target_membership: Option<bool>,
) -> Decision {
    let Some(ctx) = context else {
        return Decision::Deny(DenyReason::AuthRequired);
    };

    let super_admin_bypass = ctx.is_super_admin() && options.allow_super_admin;

    if options.require_workspace && ctx.workspace_id.is_none() && !super_admin_bypass {
        return Decision::Deny(DenyReason::WorkspaceRequired);
    }

    if let Some(target) = target_workspace {
        if super_admin_bypass {
            return Decision::Allow;
        }

        if options.strict_mode {
            // Membership is re-derived per request; the path value alone
            // proves nothing, even when it matches the context workspace.
            if target_membership != Some(true) {
                return Decision::Deny(DenyReason::CrossTenant {
                    caller_workspace: ctx.workspace_id.clone(),
                    target_workspace: target.to_string(),
                });
            }
        } else if ctx.workspace_id.as_deref() != Some(target) {
            return Decision::Deny(DenyReason::CrossTenant {
                caller_workspace: ctx.workspace_id.clone(),
                target_workspace: target.to_string(),
            });
        }
    }

    Decision::Allow
}

/// Workspace-scoped entity kinds, each mapped to its table
///
/// A typed enum instead of a string-keyed map: adding an entity kind
/// extends the match and is compile-checked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityType {
    Campaign,
    Prospect,
    ApprovalSession,
}

impl EntityType {
    pub fn table(&self) -> &'static str {
        match self {
            EntityType::Campaign => "campaigns",
            EntityType::Prospect => "campaign_prospects",
            EntityType::ApprovalSession => "approval_sessions",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::Campaign => "campaign",
            EntityType::Prospect => "prospect",
            EntityType::ApprovalSession => "approval_session",
        }
    }
}

/// Row-level access outcome
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataAccess {
    Granted,
    /// Entity does not exist
    NotFound,
    /// Entity exists but belongs to another workspace. HTTP responses must
    /// collapse this to NotFound so existence never leaks across tenants;
    /// the distinction exists for the audit trail only.
    CrossTenant { data_workspace: String },
}

/// Compare an entity's own workspace_id column against the caller's
/// workspace. A mismatch is always denied, regardless of strict mode.
pub async fn validate_data_access(
    db: &SqlitePool,
    caller_workspace: &str,
    entity_type: EntityType,
    entity_id: &str,
) -> Result<DataAccess, sqlx::Error> {
    let sql = format!("SELECT workspace_id FROM {} WHERE id = ?", entity_type.table());
    let data_workspace: Option<String> = sqlx::query_scalar(&sql)
        .bind(entity_id)
        .fetch_optional(db)
        .await?;

    Ok(match data_workspace {
        None => DataAccess::NotFound,
        Some(ws) if ws == caller_workspace => DataAccess::Granted,
        Some(ws) => DataAccess::CrossTenant { data_workspace: ws },
    })
}
