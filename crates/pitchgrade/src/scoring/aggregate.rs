//! Aggregation of per-question scores into one overall result.

use serde::{Deserialize, Serialize};

use super::QuestionScoreRecord;

/// Provenance and coverage metadata attached to every evaluation result.
///
/// `questions_scored` vs `questions_total` lets callers tell a sparse
/// evaluation apart from a full one.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EvalMetadata {
    /// Oracle model identifier used for this run.
    pub model: String,
    /// Version of the evaluator (prompt set + grammar).
    pub evaluator_version: String,
    /// Number of questions for which the oracle actually responded.
    pub questions_scored: u32,
    /// Size of the stage's full question set (0 when no stage resolved).
    pub questions_total: u32,
    /// Canonical stage the question set was selected for, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stage: Option<String>,
    /// Classifier warnings accumulated while resolving the stage.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

/// Computes the arithmetic mean of the record scores, rounded to one
/// decimal place. An empty input yields 0.0, never NaN and never an error.
pub fn aggregate(records: &[&QuestionScoreRecord]) -> f64 {
    if records.is_empty() {
        return 0.0;
    }
    let sum: f64 = records.iter().map(|r| r.score).sum();
    let mean = sum / records.len() as f64;
    (mean * 10.0).round() / 10.0
}
