//! Prospect approval store
//!
//! Sessions batch candidates for human review. Candidates move
//! pending -> approved/rejected exactly once; a session auto-completes
//! when its last pending candidate is decided, and can also be closed
//! explicitly with pending candidates left undecided.

use serde::Deserialize;
use sqlx::SqlitePool;
use uuid::Uuid;

use outreach_common::db::models::{ApprovalCandidate, ApprovalSession};
use outreach_common::{Error, Result};

/// Candidate as submitted at session creation
#[derive(Debug, Clone, Deserialize)]
pub struct CandidateInput {
    pub prospect_id: String,
    pub name: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub company_name: Option<String>,
    #[serde(default)]
    pub company_size: Option<String>,
    #[serde(default)]
    pub company_industry: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub linkedin_url: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub connection_degree: Option<i64>,
    #[serde(default)]
    pub enrichment_score: Option<f64>,
}

/// A reviewer's verdict on one candidate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    Approved,
    Rejected,
}

impl Verdict {
    pub fn as_str(&self) -> &'static str {
        match self {
            Verdict::Approved => "approved",
            Verdict::Rejected => "rejected",
        }
    }
}

/// Outcome of recording a decision
#[derive(Debug, Clone)]
pub struct DecideOutcome {
    pub session_id: String,
    pub candidate_id: String,
    pub verdict: Verdict,
    pub approved_count: i64,
    pub rejected_count: i64,
    pub pending_count: i64,
    /// True when this decision was the last pending candidate and the
    /// session transitioned to completed
    pub session_completed: bool,
}

/// Create a session with its candidate batch
///
/// The candidate list may be empty; such a session completes on the first
/// explicit complete call.
pub async fn create_session(
    db: &SqlitePool,
    workspace_id: &str,
    created_by: &str,
    campaign_id: Option<&str>,
    source_criteria: Option<&str>,
    candidates: &[CandidateInput],
) -> Result<ApprovalSession> {
    let session_id = Uuid::new_v4().to_string();
    let mut tx = db.begin().await?;

    sqlx::query(
        r#"
        INSERT INTO approval_sessions
            (id, workspace_id, created_by, campaign_id, status, total_count, source_criteria)
        VALUES (?, ?, ?, ?, 'active', ?, ?)
        "#,
    )
    .bind(&session_id)
    .bind(workspace_id)
    .bind(created_by)
    .bind(campaign_id)
    .bind(candidates.len() as i64)
    .bind(source_criteria)
    .execute(&mut *tx)
    .await?;

    for candidate in candidates {
        sqlx::query(
            r#"
            INSERT INTO approval_candidates
                (id, session_id, prospect_id, name, title, company_name,
                 company_size, company_industry, email, linkedin_url, phone,
                 connection_degree, enrichment_score, approval_status)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 'pending')
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(&session_id)
        .bind(&candidate.prospect_id)
        .bind(&candidate.name)
        .bind(&candidate.title)
        .bind(&candidate.company_name)
        .bind(&candidate.company_size)
        .bind(&candidate.company_industry)
        .bind(&candidate.email)
        .bind(&candidate.linkedin_url)
        .bind(&candidate.phone)
        .bind(candidate.connection_degree)
        .bind(candidate.enrichment_score)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;

    get_session(db, &session_id)
        .await?
        .ok_or_else(|| Error::Internal("session vanished after insert".to_string()))
}

/// Load a session by id
pub async fn get_session(db: &SqlitePool, session_id: &str) -> Result<Option<ApprovalSession>> {
    let session = sqlx::query_as::<_, ApprovalSession>(
        r#"
        SELECT id, workspace_id, created_by, campaign_id, status, total_count,
               approved_count, rejected_count, source_criteria, completed_at
        FROM approval_sessions WHERE id = ?
        "#,
    )
    .bind(session_id)
    .fetch_optional(db)
    .await?;

    Ok(session)
}

/// Load a session's candidates
pub async fn list_candidates(
    db: &SqlitePool,
    session_id: &str,
) -> Result<Vec<ApprovalCandidate>> {
    let candidates = sqlx::query_as::<_, ApprovalCandidate>(
        r#"
        SELECT id, session_id, prospect_id, name, title, company_name,
               company_size, company_industry, email, linkedin_url, phone,
               connection_degree, enrichment_score, approval_status
        FROM approval_candidates WHERE session_id = ?
        ORDER BY created_at ASC, id ASC
        "#,
    )
    .bind(session_id)
    .fetch_all(db)
    .await?;

    Ok(candidates)
}

/// Record an approve/reject decision for one candidate
///
/// Only pending candidates on an active session accept a decision; a
/// second decision for the same candidate is rejected rather than
/// overwriting the first.
pub async fn decide(
    db: &SqlitePool,
    session_id: &str,
    candidate_id: &str,
    verdict: Verdict,
) -> Result<DecideOutcome> {
    let mut tx = db.begin().await?;

    let session_status: Option<String> =
        sqlx::query_scalar("SELECT status FROM approval_sessions WHERE id = ?")
            .bind(session_id)
            .fetch_optional(&mut *tx)
            .await?;

    match session_status.as_deref() {
        None => return Err(Error::NotFound(format!("approval session {}", session_id))),
        Some("active") => {}
        Some(_) => {
            return Err(Error::InvalidInput(
                "session is already completed".to_string(),
            ))
        }
    }

    // The pending guard in the WHERE clause makes the transition one-shot
    let updated = sqlx::query(
        r#"
        UPDATE approval_candidates
        SET approval_status = ?, decided_at = CURRENT_TIMESTAMP
        WHERE id = ? AND session_id = ? AND approval_status = 'pending'
        "#,
    )
    .bind(verdict.as_str())
    .bind(candidate_id)
    .bind(session_id)
    .execute(&mut *tx)
    .await?
    .rows_affected();

    if updated == 0 {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM approval_candidates WHERE id = ? AND session_id = ?)",
        )
        .bind(candidate_id)
        .bind(session_id)
        .fetch_one(&mut *tx)
        .await?;

        return Err(if exists {
            Error::InvalidInput(format!("candidate {} already decided", candidate_id))
        } else {
            Error::NotFound(format!("candidate {} in session {}", candidate_id, session_id))
        });
    }

    let count_column = match verdict {
        Verdict::Approved => "approved_count",
        Verdict::Rejected => "rejected_count",
    };
    let sql = format!(
        "UPDATE approval_sessions SET {} = {} + 1 WHERE id = ?",
        count_column, count_column
    );
    sqlx::query(&sql).bind(session_id).execute(&mut *tx).await?;

    let (approved, rejected, pending): (i64, i64, i64) = sqlx::query_as(
        r#"
        SELECT s.approved_count, s.rejected_count,
               (SELECT COUNT(*) FROM approval_candidates
                WHERE session_id = s.id AND approval_status = 'pending')
        FROM approval_sessions s WHERE s.id = ?
        "#,
    )
    .bind(session_id)
    .fetch_one(&mut *tx)
    .await?;

    let session_completed = pending == 0;
    if session_completed {
        sqlx::query(
            r#"
            UPDATE approval_sessions
            SET status = 'completed', completed_at = CURRENT_TIMESTAMP
            WHERE id = ? AND status = 'active'
            "#,
        )
        .bind(session_id)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;

    Ok(DecideOutcome {
        session_id: session_id.to_string(),
        candidate_id: candidate_id.to_string(),
        verdict,
        approved_count: approved,
        rejected_count: rejected,
        pending_count: pending,
        session_completed,
    })
}

/// Explicitly complete a session
///
/// Pending candidates stay pending; they simply never receive a decision.
/// Completing an already-completed session is a no-op returning false.
pub async fn complete_session(db: &SqlitePool, session_id: &str) -> Result<bool> {
    let exists: bool =
        sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM approval_sessions WHERE id = ?)")
            .bind(session_id)
            .fetch_one(db)
            .await?;
    if !exists {
        return Err(Error::NotFound(format!("approval session {}", session_id)));
    }

    let updated = sqlx::query(
        r#"
        UPDATE approval_sessions
        SET status = 'completed', completed_at = CURRENT_TIMESTAMP
        WHERE id = ? AND status = 'active'
        "#,
    )
    .bind(session_id)
    .execute(db)
    .await?
    .rows_affected();

    Ok(updated > 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use outreach_common::db::init_memory_database;

    async fn seed_workspace(pool: &SqlitePool) {
        sqlx::query("INSERT INTO organizations (id, name) VALUES ('org-1', 'Org')")
            .execute(pool)
            .await
            .unwrap();
        sqlx::query(
            "INSERT INTO workspaces (id, organization_id, name) VALUES ('ws-1', 'org-1', 'WS')",
        )
        .execute(pool)
        .await
        .unwrap();
        sqlx::query("INSERT INTO users (id, email) VALUES ('user-1', 'u@example.com')")
            .execute(pool)
            .await
            .unwrap();
    }

    fn input(prospect_id: &str) -> CandidateInput {
        CandidateInput {
            prospect_id: prospect_id.to_string(),
            name: format!("Prospect {}", prospect_id),
            title: None,
            company_name: None,
            company_size: None,
            company_industry: None,
            email: None,
            linkedin_url: None,
            phone: None,
            connection_degree: None,
            enrichment_score: None,
        }
    }

    #[tokio::test]
    async fn test_create_session_with_candidates() {
        let pool = init_memory_database().await.unwrap();
        seed_workspace(&pool).await;

        let candidates: Vec<_> = (0..3).map(|i| input(&format!("p-{}", i))).collect();
        let session = create_session(&pool, "ws-1", "user-1", None, None, &candidates)
            .await
            .unwrap();

        assert_eq!(session.status, "active");
        assert_eq!(session.total_count, 3);
        assert_eq!(session.approved_count, 0);
        assert_eq!(list_candidates(&pool, &session.id).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_decide_increments_counts_and_auto_completes() {
        let pool = init_memory_database().await.unwrap();
        seed_workspace(&pool).await;

        let candidates: Vec<_> = (0..2).map(|i| input(&format!("p-{}", i))).collect();
        let session = create_session(&pool, "ws-1", "user-1", None, None, &candidates)
            .await
            .unwrap();
        let loaded = list_candidates(&pool, &session.id).await.unwrap();

        let first = decide(&pool, &session.id, &loaded[0].id, Verdict::Approved)
            .await
            .unwrap();
        assert_eq!(first.approved_count, 1);
        assert_eq!(first.pending_count, 1);
        assert!(!first.session_completed);

        let second = decide(&pool, &session.id, &loaded[1].id, Verdict::Rejected)
            .await
            .unwrap();
        assert_eq!(second.rejected_count, 1);
        assert_eq!(second.pending_count, 0);
        assert!(second.session_completed);

        let session = get_session(&pool, &session.id).await.unwrap().unwrap();
        assert_eq!(session.status, "completed");
        assert!(session.completed_at.is_some());
    }

    #[tokio::test]
    async fn test_double_decision_rejected() {
        let pool = init_memory_database().await.unwrap();
        seed_workspace(&pool).await;

        let candidates = vec![input("p-0"), input("p-1")];
        let session = create_session(&pool, "ws-1", "user-1", None, None, &candidates)
            .await
            .unwrap();
        let loaded = list_candidates(&pool, &session.id).await.unwrap();

        decide(&pool, &session.id, &loaded[0].id, Verdict::Approved)
            .await
            .unwrap();
        let err = decide(&pool, &session.id, &loaded[0].id, Verdict::Rejected)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));

        // The first decision stands
        let loaded = list_candidates(&pool, &session.id).await.unwrap();
        assert_eq!(loaded[0].approval_status, "approved");
    }

    #[tokio::test]
    async fn test_decide_on_completed_session_rejected() {
        let pool = init_memory_database().await.unwrap();
        seed_workspace(&pool).await;

        let candidates = vec![input("p-0"), input("p-1")];
        let session = create_session(&pool, "ws-1", "user-1", None, None, &candidates)
            .await
            .unwrap();
        let loaded = list_candidates(&pool, &session.id).await.unwrap();

        assert!(complete_session(&pool, &session.id).await.unwrap());
        // Second completion is a no-op
        assert!(!complete_session(&pool, &session.id).await.unwrap());

        let err = decide(&pool, &session.id, &loaded[0].id, Verdict::Approved)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_unknown_candidate_is_not_found() {
        let pool = init_memory_database().await.unwrap();
        seed_workspace(&pool).await;

        let session = create_session(&pool, "ws-1", "user-1", None, None, &[input("p-0")])
            .await
            .unwrap();
        let err = decide(&pool, &session.id, "missing", Verdict::Approved)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }
}
