//! Scoring types, oracle-response parsing and aggregation.

pub mod aggregate;
pub mod parser;

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use aggregate::{aggregate, EvalMetadata};
pub use parser::{parse_response, ParseOutcome, ParsedEvaluation};

/// Version stamp embedded in every evaluation result, bumped whenever the
/// prompt set or parsing grammar changes in a way that affects scores.
pub const EVALUATOR_VERSION: &str = "1.3.0";

/// Score and feedback for a single evaluated question.
///
/// Immutable once written; a re-evaluation replaces the whole record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct QuestionScoreRecord {
    /// Numeric score, clamped to [0, 10].
    pub score: f64,
    /// Strength statements extracted from the oracle response.
    #[serde(default)]
    pub strengths: Vec<String>,
    /// Improvement statements extracted from the oracle response.
    #[serde(default)]
    pub improvements: Vec<String>,
    /// Raw oracle response text, retained for audit.
    #[serde(default)]
    pub raw_response: String,
    /// Whether the oracle call itself succeeded. Zero-score records
    /// produced for failed calls carry `false` here so they are
    /// distinguishable from genuine zero scores.
    #[serde(default = "default_true")]
    pub oracle_responded: bool,
}

fn default_true() -> bool {
    true
}

impl QuestionScoreRecord {
    /// Builds the placeholder record for a question whose oracle call
    /// failed: zero score with an explanatory improvement note.
    pub fn dispatch_failure(error: &str) -> Self {
        Self {
            score: 0.0,
            strengths: vec![],
            improvements: vec![format!("Evaluation could not be completed: {}", error)],
            raw_response: String::new(),
            oracle_responded: false,
        }
    }
}

/// Aggregate evaluation for one application. Replaces any prior result
/// wholesale on re-evaluation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EvaluationResult {
    /// Per-question records keyed by canonical question id.
    pub scores: BTreeMap<String, QuestionScoreRecord>,
    /// Arithmetic mean of all record scores, rounded to one decimal.
    pub average: f64,
    /// When the evaluation finished.
    pub completed_at: DateTime<Utc>,
    /// Provenance and coverage metadata.
    pub metadata: EvalMetadata,
}
