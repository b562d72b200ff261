//! Preference learning and candidate optimization
//!
//! Builds a per-(user, workspace) scoring model from historical
//! approve/reject decisions and ranks or filters new candidate batches
//! against it.

pub mod score;
pub mod train;

pub use score::{optimize, score_candidate, Candidate, FeatureWeights, Model, OptimizeMode};
pub use train::{model_accuracy, retrain, train_weights, DecisionRecord};
