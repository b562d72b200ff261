//! Append-only tenant audit log
//!
//! Every boundary failure is written here BEFORE the deny response is
//! produced (audit-then-deny), so a violation is recorded even if a later
//! step fails. Audit write failures are logged and never mask the deny.

use sqlx::SqlitePool;
use tracing::warn;
use uuid::Uuid;

/// A single audit record. All fields beyond `event_type` are optional so
/// each failure path records whatever context it has.
#[derive(Debug, Default)]
pub struct AuditEvent<'a> {
    pub event_type: &'a str,
    pub user_id: Option<&'a str>,
    pub workspace_id: Option<&'a str>,
    pub attempted_workspace_id: Option<&'a str>,
    pub entity_type: Option<&'a str>,
    pub entity_id: Option<&'a str>,
    pub path: Option<&'a str>,
    pub detail: Option<&'a str>,
}

impl<'a> AuditEvent<'a> {
    pub fn new(event_type: &'a str) -> Self {
        AuditEvent {
            event_type,
            ..Default::default()
        }
    }
}

/// Insert an audit record. Never returns an error: a failed audit write
/// must not change the outcome of the request being audited.
pub async fn record(db: &SqlitePool, event: AuditEvent<'_>) {
    let result = sqlx::query(
        r#"
        INSERT INTO tenant_audit_log
            (id, event_type, user_id, workspace_id, attempted_workspace_id,
             entity_type, entity_id, path, detail)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(Uuid::new_v4().to_string())
    .bind(event.event_type)
    .bind(event.user_id)
    .bind(event.workspace_id)
    .bind(event.attempted_workspace_id)
    .bind(event.entity_type)
    .bind(event.entity_id)
    .bind(event.path)
    .bind(event.detail)
    .execute(db)
    .await;

    if let Err(e) = result {
        warn!("Failed to write tenant audit record '{}': {}", event.event_type, e);
    }
}
