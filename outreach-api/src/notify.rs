//! Operational notifications
//!
//! Best-effort POSTs to an operator-configured webhook URL. Delivery
//! failures are logged and swallowed; a broken notification channel must
//! never fail the job that triggered it.

use serde::Serialize;
use sqlx::SqlitePool;
use std::time::Duration;
use tracing::{debug, warn};

use outreach_common::db::{get_setting, get_setting_i64};

/// Payload sent to the ops webhook after a recovery run
#[derive(Debug, Serialize)]
pub struct RecoveryNotification<'a> {
    pub event: &'a str,
    pub sessions_checked: usize,
    pub orphans_found: usize,
    pub recovered: usize,
    pub queued: usize,
    pub errors: usize,
    pub capped: bool,
}

/// Send a notification to the configured ops webhook, if any
pub async fn notify_ops(db: &SqlitePool, notification: &RecoveryNotification<'_>) {
    let url = match get_setting(db, "ops_webhook_url").await {
        Ok(Some(url)) => url,
        Ok(None) => {
            debug!("Ops webhook not configured, skipping notification");
            return;
        }
        Err(e) => {
            warn!("Failed to read ops webhook setting: {}", e);
            return;
        }
    };

    let timeout_ms = match get_setting_i64(db, "notify_timeout_ms", 5000).await {
        Ok(v) => v.max(1) as u64,
        Err(_) => 5000,
    };

    let client = match reqwest::Client::builder()
        .timeout(Duration::from_millis(timeout_ms))
        .build()
    {
        Ok(c) => c,
        Err(e) => {
            warn!("Failed to build notification client: {}", e);
            return;
        }
    };

    match client.post(&url).json(notification).send().await {
        Ok(response) if response.status().is_success() => {
            debug!("Ops notification delivered: {}", notification.event);
        }
        Ok(response) => {
            warn!(
                "Ops webhook returned {} for event {}",
                response.status(),
                notification.event
            );
        }
        Err(e) => {
            warn!("Ops notification failed: {}", e);
        }
    }
}
