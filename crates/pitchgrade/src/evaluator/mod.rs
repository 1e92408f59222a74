//! Evaluation pipeline: classify the stage, route answers to the
//! stage's question set, fan out to the scoring oracle, aggregate.
//!
//! One call to [`Evaluator::run`] is one job attempt. It is idempotent:
//! a re-run replaces the stored result wholesale.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use futures_util::future::join_all;
use thiserror::Error;

use crate::application::{answer_to_text, Application, EvalStatus};
use crate::db::{application_repo, Database, DatabaseError};
use crate::oracle::ScoringOracle;
use crate::questions::{self, QuestionSpec};
use crate::scoring::{
    aggregate, EvalMetadata, EvaluationResult, QuestionScoreRecord, EVALUATOR_VERSION,
};
use crate::stage::{classify, CanonicalStage};

/// Errors that fail one evaluation attempt. The worker turns these into
/// job retries.
#[derive(Debug, Error)]
pub enum EvalError {
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Application not found: {0}")]
    ApplicationNotFound(String),

    #[error("No questions produced a usable score for application {application_id}")]
    NoUsableScores { application_id: String },
}

/// Runs evaluations against a scoring oracle and persists results.
pub struct Evaluator {
    db: Database,
    oracle: Arc<dyn ScoringOracle>,
    /// Minimum number of oracle-backed scores for an attempt to count
    /// as successful.
    min_scored_questions: u32,
}

impl Evaluator {
    pub fn new(db: Database, oracle: Arc<dyn ScoringOracle>, min_scored_questions: u32) -> Self {
        Self {
            db,
            oracle,
            min_scored_questions,
        }
    }

    /// Evaluates one application end to end and stores the result.
    ///
    /// Works on a snapshot of the application taken at the start of the
    /// attempt; concurrent edits to the answers do not affect a running
    /// evaluation.
    pub async fn run(&self, application_id: &str) -> Result<EvaluationResult, EvalError> {
        let app = application_repo::find_by_id(&self.db, application_id)?
            .ok_or_else(|| EvalError::ApplicationNotFound(application_id.to_string()))?;

        application_repo::update_eval_status(&self.db, application_id, EvalStatus::Processing)?;

        let classification = classify(&app);
        let mut warnings = classification.warnings.clone();

        let result = match classification.stage {
            Some(stage) => {
                log::info!(
                    "Evaluating application {} as {} (from {})",
                    application_id,
                    stage,
                    classification.source.unwrap_or("unknown")
                );
                self.evaluate_stage(&app, stage, warnings).await?
            }
            None => {
                // Without a stage there is no question set to grade
                // against. This completes with an empty evaluation
                // rather than burning retries on an unclassifiable
                // application.
                warnings.push("no canonical stage could be derived".to_string());
                log::warn!(
                    "Application {} has no classifiable stage, storing empty evaluation",
                    application_id
                );
                EvaluationResult {
                    scores: BTreeMap::new(),
                    average: 0.0,
                    completed_at: Utc::now(),
                    metadata: EvalMetadata {
                        model: self.oracle.model_name().to_string(),
                        evaluator_version: EVALUATOR_VERSION.to_string(),
                        questions_scored: 0,
                        questions_total: 0,
                        stage: None,
                        warnings,
                    },
                }
            }
        };

        application_repo::store_result(&self.db, application_id, &result)?;
        Ok(result)
    }

    async fn evaluate_stage(
        &self,
        app: &Application,
        stage: CanonicalStage,
        mut warnings: Vec<String>,
    ) -> Result<EvaluationResult, EvalError> {
        let specs = questions_for_with_answers(app, stage, &mut warnings);
        let questions_total = questions::questions_for(stage).len() as u32;

        let calls = specs.iter().map(|(spec, answer)| {
            let oracle = Arc::clone(&self.oracle);
            let prompt = questions::full_prompt(spec);
            async move {
                match oracle.evaluate(&prompt, answer).await {
                    Ok(raw) => crate::scoring::parse_response(&raw).into_record(&raw),
                    Err(e) => {
                        log::warn!("Oracle call for question {} failed: {}", spec.id, e);
                        QuestionScoreRecord::dispatch_failure(&e.to_string())
                    }
                }
            }
        });
        let records: Vec<QuestionScoreRecord> = join_all(calls).await;

        let mut scores = BTreeMap::new();
        for ((spec, _), record) in specs.iter().zip(records) {
            scores.insert(spec.id.to_string(), record);
        }

        let questions_scored = scores.values().filter(|r| r.oracle_responded).count() as u32;
        if questions_scored < self.min_scored_questions {
            return Err(EvalError::NoUsableScores {
                application_id: app.id.clone(),
            });
        }

        let refs: Vec<&QuestionScoreRecord> = scores.values().collect();
        let average = aggregate(&refs);

        Ok(EvaluationResult {
            scores,
            average,
            completed_at: Utc::now(),
            metadata: EvalMetadata {
                model: self.oracle.model_name().to_string(),
                evaluator_version: EVALUATOR_VERSION.to_string(),
                questions_scored,
                questions_total,
                stage: Some(stage.as_str().to_string()),
                warnings,
            },
        })
    }
}

/// Pairs the stage's questions with answer text from the application.
///
/// For each question: the canonical id is tried as an exact answer key,
/// then any answer key that is a known legacy alias for the question.
/// Questions without a usable answer are skipped with a warning.
fn questions_for_with_answers(
    app: &Application,
    stage: CanonicalStage,
    warnings: &mut Vec<String>,
) -> Vec<(&'static QuestionSpec, String)> {
    let mut paired = Vec::new();

    for spec in questions::questions_for(stage) {
        let text = app
            .answer(spec.id)
            .and_then(answer_to_text)
            .or_else(|| {
                app.answers.iter().find_map(|(key, value)| {
                    if key == spec.id {
                        return None;
                    }
                    if questions::resolve_known(key, stage) == Some(spec.id) {
                        answer_to_text(value)
                    } else {
                        None
                    }
                })
            });

        match text {
            Some(text) => paired.push((spec, text)),
            None => warnings.push(format!("no answer for question '{}'", spec.id)),
        }
    }

    paired
}
