//! Orphan prospect reconciliation
//!
//! Finds approved candidates from completed approval sessions that never
//! became campaign prospects and recovers them. The job is idempotent: a
//! second run over the same window finds nothing, because recovered rows
//! are matched by normalized contact identity and additionally protected
//! by the prospect table's per-campaign UNIQUE constraints.

use chrono::{Duration, Utc};
use serde::Serialize;
use sqlx::SqlitePool;
use std::collections::HashSet;
use tracing::{info, warn};
use uuid::Uuid;

use outreach_common::db::get_setting_i64;
use outreach_common::Result;

/// Tuning knobs, read from the settings table per run
#[derive(Debug, Clone)]
pub struct RecoveryConfig {
    /// How many days of completed sessions to examine
    pub lookback_days: i64,
    /// Hard cap on prospects recovered in one run
    pub max_per_run: i64,
    /// Minutes before the first recovered send
    pub base_delay_minutes: i64,
    /// Minutes added per message already pending in the campaign's queue
    pub spacing_minutes: i64,
}

impl RecoveryConfig {
    pub async fn load(db: &SqlitePool) -> Result<Self> {
        Ok(RecoveryConfig {
            lookback_days: get_setting_i64(db, "recovery_lookback_days", 7).await?,
            max_per_run: get_setting_i64(db, "recovery_max_per_run", 500).await?,
            base_delay_minutes: get_setting_i64(db, "recovery_base_delay_minutes", 30).await?,
            spacing_minutes: get_setting_i64(db, "recovery_spacing_minutes", 2).await?,
        })
    }
}

/// Per-session outcome
#[derive(Debug, Clone, Serialize)]
pub struct SessionResult {
    pub session_id: String,
    pub campaign_id: String,
    pub orphans_found: usize,
    pub recovered: usize,
    pub queued: usize,
    pub errors: Vec<String>,
}

/// Whole-run outcome
#[derive(Debug, Clone, Serialize, Default)]
pub struct RecoverySummary {
    pub sessions_checked: usize,
    pub orphans_found: usize,
    pub recovered: usize,
    pub queued: usize,
    pub errors: usize,
    /// True when max_per_run stopped the run early
    pub capped: bool,
    pub results: Vec<SessionResult>,
}

/// Normalize a contact identity value for duplicate matching
fn normalize(value: &str) -> String {
    value.trim().to_lowercase()
}

/// Split a display name into (first, last)
fn split_name(name: &str) -> (String, String) {
    let mut parts = name.trim().split_whitespace();
    let first = parts.next().unwrap_or("").to_string();
    let last = parts.collect::<Vec<_>>().join(" ");
    (first, last)
}

/// Numeric connection degree to the stored label form
fn degree_label(degree: Option<i64>) -> Option<&'static str> {
    match degree {
        Some(1) => Some("1st"),
        Some(2) => Some("2nd"),
        Some(3) => Some("3rd"),
        _ => None,
    }
}

/// Substitute template placeholders for one prospect
fn render_template(template: &str, first_name: &str, company_name: &str) -> String {
    template
        .replace("{first_name}", first_name)
        .replace("{company_name}", company_name)
}

#[derive(sqlx::FromRow)]
struct OrphanCandidate {
    id: String,
    prospect_id: String,
    name: String,
    title: Option<String>,
    company_name: Option<String>,
    email: Option<String>,
    linkedin_url: Option<String>,
    connection_degree: Option<i64>,
}

#[derive(sqlx::FromRow)]
struct CampaignTarget {
    status: String,
    outbound_channel: Option<String>,
    connection_template: Option<String>,
}

/// Run one reconciliation pass
pub async fn run(db: &SqlitePool, config: &RecoveryConfig) -> Result<RecoverySummary> {
    let cutoff = Utc::now() - Duration::days(config.lookback_days);
    let mut summary = RecoverySummary::default();

    // Completed sessions in the window that targeted a campaign
    let sessions: Vec<(String, String)> = sqlx::query_as(
        r#"
        SELECT id, campaign_id FROM approval_sessions
        WHERE status = 'completed' AND campaign_id IS NOT NULL
          AND completed_at >= datetime(?)
        ORDER BY completed_at ASC
        "#,
    )
    .bind(cutoff)
    .fetch_all(db)
    .await?;

    summary.sessions_checked = sessions.len();

    'sessions: for (session_id, campaign_id) in sessions {
        let mut result = SessionResult {
            session_id: session_id.clone(),
            campaign_id: campaign_id.clone(),
            orphans_found: 0,
            recovered: 0,
            queued: 0,
            errors: Vec::new(),
        };

        let approved: Vec<OrphanCandidate> = sqlx::query_as(
            r#"
            SELECT id, prospect_id, name, title, company_name, email,
                   linkedin_url, connection_degree
            FROM approval_candidates
            WHERE session_id = ? AND approval_status = 'approved'
            "#,
        )
        .bind(&session_id)
        .fetch_all(db)
        .await?;

        // Existing contact identities in the campaign, normalized
        let existing: Vec<(Option<String>, Option<String>)> = sqlx::query_as(
            "SELECT linkedin_url, email FROM campaign_prospects WHERE campaign_id = ?",
        )
        .bind(&campaign_id)
        .fetch_all(db)
        .await?;

        let mut known_urls: HashSet<String> = HashSet::new();
        let mut known_emails: HashSet<String> = HashSet::new();
        for (url, email) in existing {
            if let Some(url) = url {
                known_urls.insert(normalize(&url));
            }
            if let Some(email) = email {
                known_emails.insert(normalize(&email));
            }
        }

        let campaign: Option<CampaignTarget> = sqlx::query_as(
            "SELECT status, outbound_channel, connection_template FROM campaigns WHERE id = ?",
        )
        .bind(&campaign_id)
        .fetch_optional(db)
        .await?;
        let Some(campaign) = campaign else {
            result
                .errors
                .push(format!("campaign {} no longer exists", campaign_id));
            summary.errors += result.errors.len();
            summary.results.push(result);
            continue;
        };

        for candidate in approved {
            let url = candidate.linkedin_url.as_deref().map(normalize);
            let email = candidate.email.as_deref().map(normalize);

            let already_present = url.as_ref().is_some_and(|u| known_urls.contains(u))
                || email.as_ref().is_some_and(|e| known_emails.contains(e));
            if already_present {
                continue;
            }
            // Candidates with no contact identity at all cannot be deduped
            // or contacted; skip rather than recover blind
            if url.is_none() && email.is_none() {
                continue;
            }

            // Cap check happens before the orphan is counted, so a capped
            // run's summary only reports orphans it actually attempted
            if summary.recovered as i64 >= config.max_per_run {
                summary.capped = true;
                summary.errors += result.errors.len();
                summary.results.push(result);
                break 'sessions;
            }

            result.orphans_found += 1;
            summary.orphans_found += 1;

            match recover_one(db, &campaign_id, &session_id, &candidate, &campaign, config)
                .await
            {
                Ok(queued) => {
                    result.recovered += 1;
                    summary.recovered += 1;
                    if queued {
                        result.queued += 1;
                        summary.queued += 1;
                    }
                    // The new row is now a known identity for this campaign
                    if let Some(u) = url {
                        known_urls.insert(u);
                    }
                    if let Some(e) = email {
                        known_emails.insert(e);
                    }
                }
                Err(e) => {
                    warn!(
                        "Failed to recover candidate {} from session {}: {}",
                        candidate.id, session_id, e
                    );
                    result.errors.push(format!("candidate {}: {}", candidate.id, e));
                }
            }
        }

        summary.errors += result.errors.len();
        summary.results.push(result);
    }

    info!(
        "Orphan recovery: {} sessions checked, {} orphans, {} recovered, {} queued, {} errors{}",
        summary.sessions_checked,
        summary.orphans_found,
        summary.recovered,
        summary.queued,
        summary.errors,
        if summary.capped { " (capped)" } else { "" }
    );

    Ok(summary)
}

/// Recover one orphaned candidate into its campaign. Returns whether a
/// send was queued.
async fn recover_one(
    db: &SqlitePool,
    campaign_id: &str,
    session_id: &str,
    candidate: &OrphanCandidate,
    campaign: &CampaignTarget,
    config: &RecoveryConfig,
) -> Result<bool> {
    let workspace_id: String =
        sqlx::query_scalar("SELECT workspace_id FROM campaigns WHERE id = ?")
            .bind(campaign_id)
            .fetch_one(db)
            .await?;

    let (first_name, last_name) = split_name(&candidate.name);
    let prospect_id = Uuid::new_v4().to_string();

    // OR IGNORE backstops the in-memory dedup sets against the UNIQUE
    // constraints under concurrent runs
    let inserted = sqlx::query(
        r#"
        INSERT OR IGNORE INTO campaign_prospects
            (id, campaign_id, workspace_id, first_name, last_name, email,
             linkedin_url, title, company_name, connection_degree, status,
             source, source_session_id, recovered_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 'pending', 'orphan_recovery', ?, CURRENT_TIMESTAMP)
        "#,
    )
    .bind(&prospect_id)
    .bind(campaign_id)
    .bind(&workspace_id)
    .bind(&first_name)
    .bind(&last_name)
    .bind(candidate.email.as_deref().map(normalize))
    .bind(candidate.linkedin_url.as_deref().map(normalize))
    .bind(candidate.title.as_deref().unwrap_or(""))
    .bind(candidate.company_name.as_deref().unwrap_or(""))
    .bind(degree_label(candidate.connection_degree))
    .bind(session_id)
    .execute(db)
    .await?
    .rows_affected();

    if inserted == 0 {
        // Lost a race against another run; not an error, not a queue
        return Ok(false);
    }

    // Only active campaigns with a channel and template get a scheduled send
    let schedulable = campaign.status == "active"
        && campaign.outbound_channel.is_some()
        && campaign
            .connection_template
            .as_deref()
            .is_some_and(|t| !t.is_empty());
    if !schedulable {
        return Ok(false);
    }

    let template = campaign.connection_template.as_deref().unwrap_or("");
    let message = render_template(
        template,
        &first_name,
        candidate.company_name.as_deref().unwrap_or(""),
    );

    let pending_depth: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM send_queue WHERE campaign_id = ? AND status = 'pending'",
    )
    .bind(campaign_id)
    .fetch_one(db)
    .await?;

    // Linear backoff: each already-queued message pushes the new one out
    let scheduled_for = Utc::now()
        + Duration::minutes(config.base_delay_minutes)
        + Duration::minutes(config.spacing_minutes * pending_depth);

    sqlx::query(
        r#"
        INSERT INTO send_queue (id, campaign_id, prospect_id, message, scheduled_for, status)
        VALUES (?, ?, ?, ?, ?, 'pending')
        "#,
    )
    .bind(Uuid::new_v4().to_string())
    .bind(campaign_id)
    .bind(&prospect_id)
    .bind(&message)
    .bind(scheduled_for)
    .execute(db)
    .await?;

    Ok(true)
}
