//! Database initialization
//!
//! Creates the connection pool and the full schema on startup. All schema
//! statements are idempotent (`CREATE TABLE IF NOT EXISTS`), so restart
//! and first-run take the same code path.

use crate::Result;
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use std::path::Path;
use tracing::info;

/// Initialize database connection and create tables if needed
pub async fn init_database(db_path: &Path) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    // Create parent directory if it doesn't exist
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    let pool = SqlitePoolOptions::new()
        .max_connections(10)
        .min_connections(2)
        .connect(&db_url)
        .await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    // Enable foreign keys
    sqlx::query("PRAGMA foreign_keys = ON").execute(&pool).await?;

    // WAL mode allows concurrent readers with one writer
    sqlx::query("PRAGMA journal_mode = WAL").execute(&pool).await?;

    sqlx::query("PRAGMA busy_timeout = 5000").execute(&pool).await?;

    create_schema(&pool).await?;
    init_default_settings(&pool).await?;

    Ok(pool)
}

/// Initialize an in-memory database with the full schema (test use)
///
/// A single connection keeps the in-memory database alive for the pool's
/// lifetime; more connections would each see an empty database.
pub async fn init_memory_database() -> Result<SqlitePool> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await?;

    sqlx::query("PRAGMA foreign_keys = ON").execute(&pool).await?;

    create_schema(&pool).await?;
    init_default_settings(&pool).await?;

    Ok(pool)
}

/// Create all tables and indexes (idempotent)
pub async fn create_schema(pool: &SqlitePool) -> Result<()> {
    create_settings_table(pool).await?;
    create_users_table(pool).await?;
    create_auth_sessions_table(pool).await?;
    create_organizations_table(pool).await?;
    create_workspaces_table(pool).await?;
    create_workspace_members_table(pool).await?;
    create_platform_admins_table(pool).await?;
    create_tenant_audit_log_table(pool).await?;
    create_campaigns_table(pool).await?;
    create_campaign_prospects_table(pool).await?;
    create_send_queue_table(pool).await?;
    create_approval_sessions_table(pool).await?;
    create_approval_candidates_table(pool).await?;
    create_learning_models_table(pool).await?;

    Ok(())
}

async fn create_settings_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS settings (
            key TEXT PRIMARY KEY,
            value TEXT,
            updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_users_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS users (
            id TEXT PRIMARY KEY,
            email TEXT NOT NULL UNIQUE,
            display_name TEXT,
            current_workspace_id TEXT,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_users_email ON users(email)")
        .execute(pool)
        .await?;

    Ok(())
}

async fn create_auth_sessions_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS auth_sessions (
            token_hash TEXT PRIMARY KEY,
            user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            expires_at TIMESTAMP NOT NULL,
            CHECK (length(token_hash) = 64)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_auth_sessions_user ON auth_sessions(user_id)")
        .execute(pool)
        .await?;

    Ok(())
}

async fn create_organizations_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS organizations (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_workspaces_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS workspaces (
            id TEXT PRIMARY KEY,
            organization_id TEXT NOT NULL REFERENCES organizations(id) ON DELETE CASCADE,
            name TEXT NOT NULL,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_workspaces_org ON workspaces(organization_id)")
        .execute(pool)
        .await?;

    Ok(())
}

async fn create_workspace_members_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS workspace_members (
            workspace_id TEXT NOT NULL REFERENCES workspaces(id) ON DELETE CASCADE,
            user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            role TEXT NOT NULL DEFAULT 'member' CHECK (role IN ('member', 'admin')),
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            PRIMARY KEY (workspace_id, user_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_workspace_members_user ON workspace_members(user_id)")
        .execute(pool)
        .await?;

    Ok(())
}

/// Platform administrators bypass workspace checks on endpoints that opt in.
/// This is data, not code: the set rotates without a deploy.
async fn create_platform_admins_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS platform_admins (
            user_id TEXT PRIMARY KEY REFERENCES users(id) ON DELETE CASCADE,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Append-only record of tenant boundary decisions. Written before any
/// deny response is returned.
async fn create_tenant_audit_log_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS tenant_audit_log (
            id TEXT PRIMARY KEY,
            event_type TEXT NOT NULL,
            user_id TEXT,
            workspace_id TEXT,
            attempted_workspace_id TEXT,
            entity_type TEXT,
            entity_id TEXT,
            path TEXT,
            detail TEXT,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_tenant_audit_user ON tenant_audit_log(user_id)")
        .execute(pool)
        .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_tenant_audit_event ON tenant_audit_log(event_type, created_at)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_campaigns_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS campaigns (
            id TEXT PRIMARY KEY,
            workspace_id TEXT NOT NULL REFERENCES workspaces(id) ON DELETE CASCADE,
            name TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'draft' CHECK (status IN ('draft', 'active', 'paused', 'completed')),
            outbound_channel TEXT CHECK (outbound_channel IS NULL OR outbound_channel IN ('linkedin', 'email')),
            connection_template TEXT,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_campaigns_workspace ON campaigns(workspace_id)")
        .execute(pool)
        .await?;

    Ok(())
}

/// Campaign prospect rows
///
/// linkedin_url and email are stored normalized (trimmed, lowercased).
/// The UNIQUE constraints per campaign are the de-duplication boundary for
/// orphan recovery: a second reconciliation run over the same window
/// cannot insert the same contact twice.
async fn create_campaign_prospects_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS campaign_prospects (
            id TEXT PRIMARY KEY,
            campaign_id TEXT NOT NULL REFERENCES campaigns(id) ON DELETE CASCADE,
            workspace_id TEXT NOT NULL,
            first_name TEXT NOT NULL,
            last_name TEXT NOT NULL DEFAULT '',
            email TEXT,
            linkedin_url TEXT,
            title TEXT NOT NULL DEFAULT '',
            company_name TEXT NOT NULL DEFAULT '',
            connection_degree TEXT CHECK (connection_degree IS NULL OR connection_degree IN ('1st', '2nd', '3rd')),
            status TEXT NOT NULL DEFAULT 'pending',
            source TEXT,
            source_session_id TEXT,
            recovered_at TIMESTAMP,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            UNIQUE (campaign_id, linkedin_url),
            UNIQUE (campaign_id, email)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_campaign_prospects_campaign ON campaign_prospects(campaign_id)",
    )
    .execute(pool)
    .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_campaign_prospects_workspace ON campaign_prospects(workspace_id)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_send_queue_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS send_queue (
            id TEXT PRIMARY KEY,
            campaign_id TEXT NOT NULL REFERENCES campaigns(id) ON DELETE CASCADE,
            prospect_id TEXT NOT NULL REFERENCES campaign_prospects(id) ON DELETE CASCADE,
            message TEXT NOT NULL,
            scheduled_for TIMESTAMP NOT NULL,
            status TEXT NOT NULL DEFAULT 'pending' CHECK (status IN ('pending', 'sent', 'failed', 'cancelled')),
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_send_queue_campaign_status ON send_queue(campaign_id, status)",
    )
    .execute(pool)
    .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_send_queue_scheduled ON send_queue(scheduled_for)")
        .execute(pool)
        .await?;

    Ok(())
}

async fn create_approval_sessions_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS approval_sessions (
            id TEXT PRIMARY KEY,
            workspace_id TEXT NOT NULL REFERENCES workspaces(id) ON DELETE CASCADE,
            created_by TEXT NOT NULL REFERENCES users(id),
            campaign_id TEXT REFERENCES campaigns(id),
            status TEXT NOT NULL DEFAULT 'active' CHECK (status IN ('active', 'completed')),
            total_count INTEGER NOT NULL DEFAULT 0,
            approved_count INTEGER NOT NULL DEFAULT 0,
            rejected_count INTEGER NOT NULL DEFAULT 0,
            source_criteria TEXT,
            completed_at TIMESTAMP,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            CHECK (approved_count >= 0),
            CHECK (rejected_count >= 0),
            CHECK (approved_count + rejected_count <= total_count)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_approval_sessions_workspace ON approval_sessions(workspace_id)",
    )
    .execute(pool)
    .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_approval_sessions_status ON approval_sessions(status, completed_at)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_approval_candidates_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS approval_candidates (
            id TEXT PRIMARY KEY,
            session_id TEXT NOT NULL REFERENCES approval_sessions(id) ON DELETE CASCADE,
            prospect_id TEXT NOT NULL,
            name TEXT NOT NULL,
            title TEXT,
            company_name TEXT,
            company_size TEXT,
            company_industry TEXT,
            email TEXT,
            linkedin_url TEXT,
            phone TEXT,
            connection_degree INTEGER CHECK (connection_degree IS NULL OR connection_degree BETWEEN 1 AND 3),
            enrichment_score REAL,
            approval_status TEXT NOT NULL DEFAULT 'pending' CHECK (approval_status IN ('pending', 'approved', 'rejected')),
            decided_at TIMESTAMP,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_approval_candidates_session ON approval_candidates(session_id, approval_status)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_learning_models_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS learning_models (
            user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            workspace_id TEXT NOT NULL REFERENCES workspaces(id) ON DELETE CASCADE,
            model_type TEXT NOT NULL DEFAULT 'prospect_approval',
            feature_weights TEXT NOT NULL,
            learned_preferences TEXT NOT NULL,
            accuracy_score REAL NOT NULL DEFAULT 0.0,
            sessions_trained_on INTEGER NOT NULL DEFAULT 0,
            last_trained_session TEXT,
            updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            PRIMARY KEY (user_id, workspace_id, model_type),
            CHECK (accuracy_score >= 0.0 AND accuracy_score <= 1.0)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Initialize or update default settings
///
/// Ensures all required settings exist with default values. NULL values
/// are reset to defaults.
pub async fn init_default_settings(pool: &SqlitePool) -> Result<()> {
    // Session settings
    ensure_setting(pool, "session_ttl_seconds", "2592000").await?; // 30 days

    // HTTP settings
    ensure_setting(pool, "http_max_body_size_bytes", "1048576").await?;

    // Webhook source secrets (empty = unset)
    ensure_setting(pool, "webhook_secret_partner", "").await?;
    ensure_setting(pool, "webhook_secret_internal", "").await?;

    // Orphan recovery settings
    ensure_setting(pool, "recovery_lookback_days", "7").await?;
    ensure_setting(pool, "recovery_max_per_run", "500").await?;
    ensure_setting(pool, "recovery_base_delay_minutes", "30").await?;
    ensure_setting(pool, "recovery_spacing_minutes", "2").await?;

    // Operational notification channel (empty = disabled)
    ensure_setting(pool, "ops_webhook_url", "").await?;
    ensure_setting(pool, "notify_timeout_ms", "5000").await?;

    Ok(())
}

/// Ensure a setting exists with the specified default value
///
/// If the setting doesn't exist, it will be created with the default.
/// If the setting exists but has a NULL value, it will be reset to the default.
pub async fn ensure_setting(pool: &SqlitePool, key: &str, default_value: &str) -> Result<()> {
    let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM settings WHERE key = ?)")
        .bind(key)
        .fetch_one(pool)
        .await?;

    if !exists {
        // INSERT OR IGNORE handles concurrent initialization races
        sqlx::query("INSERT OR IGNORE INTO settings (key, value) VALUES (?, ?)")
            .bind(key)
            .bind(default_value)
            .execute(pool)
            .await?;

        return Ok(());
    }

    let value: Option<String> = sqlx::query_scalar("SELECT value FROM settings WHERE key = ?")
        .bind(key)
        .fetch_one(pool)
        .await?;

    if value.is_none() {
        sqlx::query("UPDATE settings SET value = ? WHERE key = ?")
            .bind(default_value)
            .bind(key)
            .execute(pool)
            .await?;
    }

    Ok(())
}

/// Read a setting value (None when unset or empty)
pub async fn get_setting(pool: &SqlitePool, key: &str) -> Result<Option<String>> {
    let value: Option<String> = sqlx::query_scalar("SELECT value FROM settings WHERE key = ?")
        .bind(key)
        .fetch_optional(pool)
        .await?
        .flatten();

    Ok(value.filter(|v| !v.is_empty()))
}

/// Read an integer setting, falling back to a default on unset/unparseable
pub async fn get_setting_i64(pool: &SqlitePool, key: &str, default: i64) -> Result<i64> {
    Ok(get_setting(pool, key)
        .await?
        .and_then(|v| v.parse::<i64>().ok())
        .unwrap_or(default))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_schema_creation_is_idempotent() {
        let pool = init_memory_database().await.expect("init should succeed");
        // Second pass over the same pool must not error
        create_schema(&pool).await.expect("re-create should succeed");
    }

    #[tokio::test]
    async fn test_default_settings_present() {
        let pool = init_memory_database().await.expect("init should succeed");

        let lookback = get_setting_i64(&pool, "recovery_lookback_days", 0)
            .await
            .expect("query should succeed");
        assert_eq!(lookback, 7);

        // Empty secret reads as None (unset)
        let secret = get_setting(&pool, "webhook_secret_partner")
            .await
            .expect("query should succeed");
        assert!(secret.is_none());
    }

    #[tokio::test]
    async fn test_ensure_setting_does_not_overwrite() {
        let pool = init_memory_database().await.expect("init should succeed");

        sqlx::query("UPDATE settings SET value = '14' WHERE key = 'recovery_lookback_days'")
            .execute(&pool)
            .await
            .expect("update should succeed");

        ensure_setting(&pool, "recovery_lookback_days", "7")
            .await
            .expect("ensure should succeed");

        let lookback = get_setting_i64(&pool, "recovery_lookback_days", 0)
            .await
            .expect("query should succeed");
        assert_eq!(lookback, 14);
    }
}
