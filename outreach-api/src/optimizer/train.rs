//! Learning model training
//!
//! Recomputes feature weights from the cumulative approve/reject history
//! of a (user, workspace) pair. Category weights are plain approval rates;
//! the accuracy score is the agreement between the model's score-based
//! prediction and the actual human decisions over the same history.

use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use std::collections::HashMap;
use tracing::info;

use outreach_common::{Error, Result};

use super::score::{score_signals, ContactWeights, FeatureWeights, ScoreInput};

/// One historical approve/reject decision
#[derive(Debug, Clone)]
pub struct DecisionRecord {
    pub approved: bool,
    pub company_size: Option<String>,
    pub company_industry: Option<String>,
    pub connection_degree: Option<i64>,
    pub enrichment_score: Option<f64>,
    pub has_email: bool,
    pub has_phone: bool,
    pub title: Option<String>,
}

impl DecisionRecord {
    fn signals(&self) -> ScoreInput<'_> {
        ScoreInput {
            company_size: self.company_size.as_deref(),
            industry: self.company_industry.as_deref(),
            connection_degree: self.connection_degree,
            enrichment_score: self.enrichment_score,
            has_email: self.has_email,
            has_phone: self.has_phone,
            title: self.title.as_deref(),
        }
    }
}

/// Learned preference summary stored alongside the weights
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LearnedPreferences {
    pub total_decisions: usize,
    pub approval_rate: f64,
    pub preferred_company_sizes: Vec<String>,
    pub preferred_industries: Vec<String>,
    pub preferred_connection_degrees: Vec<i64>,
    pub requires_email: bool,
    pub prefers_phone: bool,
    pub min_enrichment_score: Option<f64>,
}

fn approval_rates<F>(records: &[DecisionRecord], key: F) -> HashMap<String, f64>
where
    F: Fn(&DecisionRecord) -> Option<String>,
{
    let mut approved: HashMap<String, u32> = HashMap::new();
    let mut rejected: HashMap<String, u32> = HashMap::new();

    for record in records {
        if let Some(k) = key(record) {
            if record.approved {
                *approved.entry(k).or_insert(0) += 1;
            } else {
                *rejected.entry(k).or_insert(0) += 1;
            }
        }
    }

    // Only values seen in approved records earn a weight
    approved
        .into_iter()
        .map(|(k, a)| {
            let r = rejected.get(&k).copied().unwrap_or(0);
            let rate = a as f64 / (a + r) as f64;
            (k, rate)
        })
        .collect()
}

/// Compute feature weights from decision history
pub fn train_weights(records: &[DecisionRecord]) -> FeatureWeights {
    let approved: Vec<&DecisionRecord> = records.iter().filter(|r| r.approved).collect();

    let company_size = approval_rates(records, |r| r.company_size.clone());
    let industry = approval_rates(records, |r| r.company_industry.clone());
    let connection_degree =
        approval_rates(records, |r| r.connection_degree.map(|d| d.to_string()));

    // Lowest enrichment score the user ever approved becomes the threshold
    let enrichment_score_threshold = approved
        .iter()
        .filter_map(|r| r.enrichment_score)
        .fold(None::<f64>, |min, s| {
            Some(match min {
                Some(m) if m <= s => m,
                _ => s,
            })
        })
        .unwrap_or(0.0);

    let contact = if approved.is_empty() {
        ContactWeights::default()
    } else {
        let with_email = approved.iter().filter(|r| r.has_email).count();
        let with_phone = approved.iter().filter(|r| r.has_phone).count();
        ContactWeights {
            email_weight: with_email as f64 / approved.len() as f64,
            phone_weight: with_phone as f64 / approved.len() as f64,
        }
    };

    // Top-10 title keywords by frequency among approved titles
    let mut word_counts: HashMap<String, u32> = HashMap::new();
    for record in &approved {
        if let Some(title) = &record.title {
            for word in title.to_lowercase().split_whitespace() {
                if word.len() > 2 {
                    *word_counts.entry(word.to_string()).or_insert(0) += 1;
                }
            }
        }
    }
    let mut ranked: Vec<(String, u32)> = word_counts.into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    let title_keywords = ranked
        .into_iter()
        .take(10)
        .map(|(word, count)| (word, count as f64 / approved.len().max(1) as f64))
        .collect();

    FeatureWeights {
        company_size,
        industry,
        connection_degree,
        enrichment_score_threshold,
        contact,
        title_keywords,
    }
}

/// Backtested agreement between model prediction (score >= 0.5 means
/// approve) and the actual decisions
pub fn model_accuracy(records: &[DecisionRecord], weights: &FeatureWeights) -> f64 {
    if records.is_empty() {
        return 0.0;
    }

    let correct = records
        .iter()
        .filter(|r| {
            let predicted_approve = score_signals(&r.signals(), weights) >= 0.5;
            predicted_approve == r.approved
        })
        .count();

    correct as f64 / records.len() as f64
}

/// Summarize preferences visible in the approved history
pub fn learned_preferences(records: &[DecisionRecord]) -> LearnedPreferences {
    let approved: Vec<&DecisionRecord> = records.iter().filter(|r| r.approved).collect();

    if approved.is_empty() {
        return LearnedPreferences {
            total_decisions: records.len(),
            approval_rate: 0.0,
            preferred_company_sizes: Vec::new(),
            preferred_industries: Vec::new(),
            preferred_connection_degrees: Vec::new(),
            requires_email: false,
            prefers_phone: false,
            min_enrichment_score: None,
        };
    }

    fn distinct<T: Clone + PartialEq>(values: impl Iterator<Item = T>) -> Vec<T> {
        let mut out = Vec::new();
        for v in values {
            if !out.contains(&v) {
                out.push(v);
            }
        }
        out
    }

    let email_rate =
        approved.iter().filter(|r| r.has_email).count() as f64 / approved.len() as f64;
    let phone_rate =
        approved.iter().filter(|r| r.has_phone).count() as f64 / approved.len() as f64;

    LearnedPreferences {
        total_decisions: records.len(),
        approval_rate: approved.len() as f64 / records.len() as f64,
        preferred_company_sizes: distinct(
            approved.iter().filter_map(|r| r.company_size.clone()),
        ),
        preferred_industries: distinct(
            approved.iter().filter_map(|r| r.company_industry.clone()),
        ),
        preferred_connection_degrees: distinct(
            approved.iter().filter_map(|r| r.connection_degree),
        ),
        requires_email: email_rate > 0.7,
        prefers_phone: phone_rate > 0.5,
        min_enrichment_score: approved
            .iter()
            .filter_map(|r| r.enrichment_score)
            .fold(None, |min, s| {
                Some(match min {
                    Some(m) if m <= s => m,
                    _ => s,
                })
            }),
    }
}

/// Retrain result summary
#[derive(Debug, Clone, Serialize)]
pub struct RetrainSummary {
    pub sessions_used: i64,
    pub decisions_analyzed: usize,
    pub accuracy_score: f64,
}

/// Rebuild the learning model for a (user, workspace) pair from all of
/// their completed sessions. Returns None when there is no decision
/// history to train on.
pub async fn retrain(
    db: &SqlitePool,
    user_id: &str,
    workspace_id: &str,
) -> Result<Option<RetrainSummary>> {
    let sessions: Vec<(String,)> = sqlx::query_as(
        r#"
        SELECT id FROM approval_sessions
        WHERE created_by = ? AND workspace_id = ? AND status = 'completed'
        ORDER BY completed_at ASC
        "#,
    )
    .bind(user_id)
    .bind(workspace_id)
    .fetch_all(db)
    .await?;

    if sessions.is_empty() {
        return Ok(None);
    }

    let rows: Vec<(
        String,
        Option<String>,
        Option<String>,
        Option<i64>,
        Option<f64>,
        Option<String>,
        Option<String>,
        Option<String>,
    )> = sqlx::query_as(
        r#"
        SELECT ac.approval_status, ac.company_size, ac.company_industry,
               ac.connection_degree, ac.enrichment_score, ac.email, ac.phone,
               ac.title
        FROM approval_candidates ac
        JOIN approval_sessions s ON s.id = ac.session_id
        WHERE s.created_by = ? AND s.workspace_id = ? AND s.status = 'completed'
          AND ac.approval_status IN ('approved', 'rejected')
        "#,
    )
    .bind(user_id)
    .bind(workspace_id)
    .fetch_all(db)
    .await?;

    if rows.is_empty() {
        return Ok(None);
    }

    let records: Vec<DecisionRecord> = rows
        .into_iter()
        .map(
            |(status, size, industry, degree, enrichment, email, phone, title)| DecisionRecord {
                approved: status == "approved",
                company_size: size,
                company_industry: industry,
                connection_degree: degree,
                enrichment_score: enrichment,
                has_email: email.is_some_and(|e| !e.is_empty()),
                has_phone: phone.is_some_and(|p| !p.is_empty()),
                title,
            },
        )
        .collect();

    let weights = train_weights(&records);
    let accuracy = model_accuracy(&records, &weights);
    let preferences = learned_preferences(&records);

    let weights_json = serde_json::to_string(&weights)
        .map_err(|e| Error::Internal(format!("serialize weights: {}", e)))?;
    let preferences_json = serde_json::to_string(&preferences)
        .map_err(|e| Error::Internal(format!("serialize preferences: {}", e)))?;
    let last_session = sessions.last().map(|(id,)| id.clone());

    sqlx::query(
        r#"
        INSERT INTO learning_models
            (user_id, workspace_id, model_type, feature_weights,
             learned_preferences, accuracy_score, sessions_trained_on,
             last_trained_session, updated_at)
        VALUES (?, ?, 'prospect_approval', ?, ?, ?, ?, ?, CURRENT_TIMESTAMP)
        ON CONFLICT (user_id, workspace_id, model_type) DO UPDATE SET
            feature_weights = excluded.feature_weights,
            learned_preferences = excluded.learned_preferences,
            accuracy_score = excluded.accuracy_score,
            sessions_trained_on = excluded.sessions_trained_on,
            last_trained_session = excluded.last_trained_session,
            updated_at = CURRENT_TIMESTAMP
        "#,
    )
    .bind(user_id)
    .bind(workspace_id)
    .bind(&weights_json)
    .bind(&preferences_json)
    .bind(accuracy)
    .bind(sessions.len() as i64)
    .bind(&last_session)
    .execute(db)
    .await?;

    info!(
        "Retrained model for user {} in workspace {}: {} sessions, {} decisions, accuracy {:.2}",
        user_id,
        workspace_id,
        sessions.len(),
        records.len(),
        accuracy
    );

    Ok(Some(RetrainSummary {
        sessions_used: sessions.len() as i64,
        decisions_analyzed: records.len(),
        accuracy_score: accuracy,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(approved: bool, size: &str, email: bool) -> DecisionRecord {
        DecisionRecord {
            approved,
            company_size: Some(size.to_string()),
            company_industry: None,
            connection_degree: None,
            enrichment_score: None,
            has_email: email,
            has_phone: false,
            title: None,
        }
    }

    #[test]
    fn test_category_weights_are_approval_rates() {
        let records = vec![
            record(true, "11-50", true),
            record(true, "11-50", true),
            record(false, "11-50", false),
            record(false, "1000+", false),
        ];

        let weights = train_weights(&records);
        // 2 approved / 3 total for "11-50"
        assert!((weights.company_size["11-50"] - 2.0 / 3.0).abs() < 1e-9);
        // "1000+" only appears rejected: no weight
        assert!(!weights.company_size.contains_key("1000+"));
    }

    #[test]
    fn test_enrichment_threshold_is_min_approved() {
        let mut a = record(true, "x", false);
        a.enrichment_score = Some(0.7);
        let mut b = record(true, "x", false);
        b.enrichment_score = Some(0.4);
        let mut c = record(false, "x", false);
        c.enrichment_score = Some(0.1);

        let weights = train_weights(&[a, b, c]);
        assert!((weights.enrichment_score_threshold - 0.4).abs() < 1e-9);
    }

    #[test]
    fn test_contact_weights_are_approved_fractions() {
        let records = vec![
            record(true, "x", true),
            record(true, "x", true),
            record(true, "x", false),
            record(false, "x", true),
        ];
        let weights = train_weights(&records);
        assert!((weights.contact.email_weight - 2.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_title_keywords_top_ten_with_short_words_skipped() {
        let mut records = Vec::new();
        for _ in 0..3 {
            let mut r = record(true, "x", false);
            r.title = Some("VP of Engineering".to_string());
            records.push(r);
        }

        let weights = train_weights(&records);
        // "of" is too short to count
        assert!(!weights.title_keywords.contains_key("of"));
        assert!((weights.title_keywords["engineering"] - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_accuracy_counts_neutral_scores_as_approve() {
        // Approvals all in a liked size, rejections in a disliked one
        let records = vec![
            record(true, "11-50", false),
            record(true, "11-50", false),
            record(false, "1000+", false),
            record(false, "1000+", false),
        ];
        let weights = train_weights(&records);
        // Approved records score 1.0 (their size's approval rate), rejected
        // records carry no weighted signals and land at neutral 0.5,
        // which still predicts "approve" at the 0.5 boundary
        let accuracy = model_accuracy(&records, &weights);
        assert!((accuracy - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_learned_preferences_thresholds() {
        let records = vec![
            record(true, "11-50", true),
            record(true, "51-200", true),
            record(true, "11-50", true),
            record(false, "1000+", false),
        ];
        let prefs = learned_preferences(&records);

        assert_eq!(prefs.total_decisions, 4);
        assert!((prefs.approval_rate - 0.75).abs() < 1e-9);
        assert_eq!(prefs.preferred_company_sizes, vec!["11-50", "51-200"]);
        // 3/3 approved have email: above the 0.7 requirement bar
        assert!(prefs.requires_email);
        assert!(!prefs.prefers_phone);
    }

    #[test]
    fn test_empty_history_yields_zero_accuracy() {
        let weights = train_weights(&[]);
        assert_eq!(model_accuracy(&[], &weights), 0.0);
    }
}
