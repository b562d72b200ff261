//! Candidate scoring and batch optimization modes
//!
//! Scores are a weighted average over the signals a candidate actually
//! carries: missing signals shrink the denominator instead of counting as
//! zero, so incomplete records are not penalized for being incomplete. A
//! candidate with no usable signals lands on the neutral 0.5.

use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashMap;

/// Candidate record as submitted for optimization
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Candidate {
    pub id: String,
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
    pub phone: Option<String>,
    #[serde(default)]
    pub linkedin_url: Option<String>,
    #[serde(default)]
    pub connection_degree: Option<i64>,
    #[serde(default)]
    pub enrichment_score: Option<f64>,
}

/// Contact-channel availability weights
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContactWeights {
    pub email_weight: f64,
    pub phone_weight: f64,
}

/// Learned feature weights
///
/// Category maps hold approval rates keyed by the category value;
/// connection degrees are keyed by their decimal string form (JSON object
/// keys are strings).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FeatureWeights {
    #[serde(default)]
    pub company_size: HashMap<String, f64>,
    #[serde(default)]
    pub industry: HashMap<String, f64>,
    #[serde(default)]
    pub connection_degree: HashMap<String, f64>,
    #[serde(default)]
    pub enrichment_score_threshold: f64,
    #[serde(default)]
    pub contact: ContactWeights,
    #[serde(default)]
    pub title_keywords: HashMap<String, f64>,
}

/// A loaded, ready-to-apply learning model
#[derive(Debug, Clone)]
pub struct Model {
    pub weights: FeatureWeights,
    pub accuracy_score: f64,
    pub sessions_trained_on: i64,
}

/// Optimization mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OptimizeMode {
    /// Drop candidates below the learned threshold, best first
    Filter,
    /// Keep everything, best first
    Rank,
    /// Keep the top band plus a random slice of the middle band
    Balanced,
}

/// Candidate with its model score attached
///
/// `score` is absent in the no-model passthrough, where output must equal
/// input unmodified.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredCandidate {
    #[serde(flatten)]
    pub candidate: Candidate,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
}

/// Optimization result
#[derive(Debug, Clone)]
pub struct OptimizeOutcome {
    pub candidates: Vec<ScoredCandidate>,
    /// False when no model existed and the batch passed through untouched
    pub applied: bool,
}

/// Signals extracted from a candidate or a historical decision record
pub(crate) struct ScoreInput<'a> {
    pub company_size: Option<&'a str>,
    pub industry: Option<&'a str>,
    pub connection_degree: Option<i64>,
    pub enrichment_score: Option<f64>,
    pub has_email: bool,
    pub has_phone: bool,
    pub title: Option<&'a str>,
}

impl Candidate {
    pub(crate) fn signals(&self) -> ScoreInput<'_> {
        ScoreInput {
            company_size: self.company_size.as_deref(),
            industry: self.company_industry.as_deref(),
            connection_degree: self.connection_degree,
            enrichment_score: self.enrichment_score,
            has_email: self.email.as_deref().is_some_and(|e| !e.is_empty()),
            has_phone: self.phone.as_deref().is_some_and(|p| !p.is_empty()),
            title: self.title.as_deref(),
        }
    }
}

/// Score one candidate against learned weights (0.0-1.0 range in practice)
pub fn score_candidate(candidate: &Candidate, weights: &FeatureWeights) -> f64 {
    score_signals(&candidate.signals(), weights)
}

pub(crate) fn score_signals(input: &ScoreInput<'_>, weights: &FeatureWeights) -> f64 {
    let mut score = 0.0;
    let mut factors = 0u32;

    if let Some(size) = input.company_size {
        if let Some(&w) = weights.company_size.get(size) {
            if w > 0.0 {
                score += w;
                factors += 1;
            }
        }
    }

    if let Some(industry) = input.industry {
        if let Some(&w) = weights.industry.get(industry) {
            if w > 0.0 {
                score += w;
                factors += 1;
            }
        }
    }

    if let Some(degree) = input.connection_degree {
        if let Some(&w) = weights.connection_degree.get(&degree.to_string()) {
            if w > 0.0 {
                score += w;
                factors += 1;
            }
        }
    }

    // Binary bonus for clearing the learned enrichment threshold
    if let Some(enrichment) = input.enrichment_score {
        if enrichment >= weights.enrichment_score_threshold {
            score += 0.8;
            factors += 1;
        }
    }

    if input.has_email && weights.contact.email_weight > 0.0 {
        score += weights.contact.email_weight;
        factors += 1;
    }

    if input.has_phone && weights.contact.phone_weight > 0.0 {
        score += weights.contact.phone_weight;
        factors += 1;
    }

    if let Some(title) = input.title {
        let mut title_score = 0.0;
        let mut title_factors = 0u32;
        for word in title.to_lowercase().split_whitespace() {
            if let Some(&w) = weights.title_keywords.get(word) {
                if w > 0.0 {
                    title_score += w;
                    title_factors += 1;
                }
            }
        }
        if title_factors > 0 {
            score += title_score / title_factors as f64;
            factors += 1;
        }
    }

    if factors > 0 {
        score / factors as f64
    } else {
        // No usable signals: neutral midpoint, not a penalty
        0.5
    }
}

fn sort_descending(candidates: &mut [ScoredCandidate]) {
    candidates.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(Ordering::Equal)
    });
}

/// Apply a learning model to a candidate batch
///
/// With no model this is a passthrough: the batch comes back unmodified
/// and `applied` is false, so callers never mistake unfiltered results for
/// optimized ones.
pub fn optimize(
    candidates: Vec<Candidate>,
    model: Option<&Model>,
    mode: OptimizeMode,
) -> OptimizeOutcome {
    let Some(model) = model else {
        return OptimizeOutcome {
            candidates: candidates
                .into_iter()
                .map(|candidate| ScoredCandidate {
                    candidate,
                    score: None,
                })
                .collect(),
            applied: false,
        };
    };

    let mut scored: Vec<ScoredCandidate> = candidates
        .into_iter()
        .map(|candidate| {
            let score = score_candidate(&candidate, &model.weights);
            ScoredCandidate {
                candidate,
                score: Some(score),
            }
        })
        .collect();

    let result = match mode {
        OptimizeMode::Filter => {
            let threshold = (model.accuracy_score * 0.7).max(0.3);
            scored.retain(|c| c.score.unwrap_or(0.0) >= threshold);
            sort_descending(&mut scored);
            scored
        }
        OptimizeMode::Rank => {
            sort_descending(&mut scored);
            scored
        }
        OptimizeMode::Balanced => {
            const TOP_THRESHOLD: f64 = 0.7;
            const MEDIUM_THRESHOLD: f64 = 0.4;

            let (top, rest): (Vec<_>, Vec<_>) = scored
                .into_iter()
                .partition(|c| c.score.unwrap_or(0.0) >= TOP_THRESHOLD);
            let mut medium: Vec<_> = rest
                .into_iter()
                .filter(|c| c.score.unwrap_or(0.0) >= MEDIUM_THRESHOLD)
                .collect();

            // Exploration slice: a fresh ~30% sample of the middle band on
            // every call, so repeat batches don't converge on one subset
            medium.shuffle(&mut rand::thread_rng());
            let sample_len = (medium.len() as f64 * 0.3).ceil() as usize;
            medium.truncate(sample_len);

            let mut kept = top;
            kept.extend(medium);
            sort_descending(&mut kept);
            kept
        }
    };

    OptimizeOutcome {
        candidates: result,
        applied: true,
    }
}
