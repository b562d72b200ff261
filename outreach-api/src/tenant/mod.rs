//! Tenant isolation layer
//!
//! Maps an authenticated identity to its workspace context, decides
//! whether a request may touch a given workspace or entity, and records
//! every boundary decision to an append-only audit log.

pub mod audit;
pub mod guard;
pub mod resolver;

use serde::{Deserialize, Serialize};

/// Authenticated identity, resolved from an opaque session credential.
/// Immutable once authenticated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Identity {
    pub user_id: String,
    pub email: String,
}

/// Caller's role within the resolved workspace
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Member,
    Admin,
    /// Platform administrator - no workspace restriction, honored only by
    /// endpoints that explicitly opt in
    SuperAdmin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Member => "member",
            Role::Admin => "admin",
            Role::SuperAdmin => "super_admin",
        }
    }

    /// Parse a membership row's role column (unknown values degrade to member)
    pub fn from_membership(role: &str) -> Self {
        match role {
            "admin" => Role::Admin,
            _ => Role::Member,
        }
    }
}

/// Workspace-scoped context for an authenticated request
///
/// `workspace_id` is None only for super-admins, which carry no workspace
/// restriction.
#[derive(Debug, Clone)]
pub struct TenantContext {
    pub user_id: String,
    pub workspace_id: Option<String>,
    pub organization_id: Option<String>,
    pub role: Role,
}

impl TenantContext {
    pub fn is_super_admin(&self) -> bool {
        self.role == Role::SuperAdmin
    }
}
