//! Application record: the unit of work for evaluation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::scoring::EvaluationResult;

/// Evaluation status of an application. Mutated only by the job queue
/// and worker once a job is in flight.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EvalStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl EvalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EvalStatus::Pending => "pending",
            EvalStatus::Processing => "processing",
            EvalStatus::Completed => "completed",
            EvalStatus::Failed => "failed",
        }
    }

    /// Parses a stored status string, defaulting unknown values to
    /// `Pending` with a warning rather than failing the read.
    pub fn parse(s: &str, application_id: &str) -> Self {
        match s {
            "pending" => EvalStatus::Pending,
            "processing" => EvalStatus::Processing,
            "completed" => EvalStatus::Completed,
            "failed" => EvalStatus::Failed,
            other => {
                log::warn!(
                    "Unknown eval status '{}' for application {}, defaulting to pending",
                    other,
                    application_id
                );
                EvalStatus::Pending
            }
        }
    }
}

impl std::fmt::Display for EvalStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An applicant submission.
///
/// The answer bag maps question keys (possibly legacy names) to arbitrary
/// JSON values. The raw stage indicator may live in the answer bag, in
/// the optional registration record, or in one of two legacy top-level
/// fields; the stage classifier probes them in a fixed order.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Application {
    /// Immutable identifier.
    pub id: String,
    /// Raw answers keyed by question key.
    #[serde(default)]
    pub answers: Map<String, Value>,
    /// Secondary registration record, when the applicant registered
    /// before submitting.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub registration: Option<Map<String, Value>>,
    /// Legacy top-level stage field.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stage: Option<String>,
    /// Legacy top-level stage field used by older intake forms.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub startup_stage: Option<String>,
    /// Current evaluation status.
    pub eval_status: EvalStatus,
    /// Overall score in [0, 10], set on completion.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub overall_score: Option<f64>,
    /// Structured evaluation payload, set on completion.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub evaluation: Option<EvaluationResult>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Application {
    /// Creates a fresh application with the given answers, pending
    /// evaluation.
    pub fn new(id: impl Into<String>, answers: Map<String, Value>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            answers,
            registration: None,
            stage: None,
            startup_stage: None,
            eval_status: EvalStatus::Pending,
            overall_score: None,
            evaluation: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Looks up an answer value by exact key.
    pub fn answer(&self, key: &str) -> Option<&Value> {
        self.answers.get(key)
    }
}

/// Renders an answer value as evaluation input text.
///
/// Strings pass through trimmed; scalars are formatted; arrays join their
/// rendered elements line by line; objects serialize to compact JSON.
/// Empty or null values yield `None`; there is nothing to evaluate.
pub fn answer_to_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                None
            } else {
                Some(trimmed.to_string())
            }
        }
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Array(items) => {
            let parts: Vec<String> = items.iter().filter_map(answer_to_text).collect();
            if parts.is_empty() {
                None
            } else {
                Some(parts.join("\n"))
            }
        }
        Value::Object(_) => serde_json::to_string(value).ok(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_status_round_trip() {
        for status in [
            EvalStatus::Pending,
            EvalStatus::Processing,
            EvalStatus::Completed,
            EvalStatus::Failed,
        ] {
            assert_eq!(EvalStatus::parse(status.as_str(), "app-1"), status);
        }
    }

    #[test]
    fn test_unknown_status_defaults_to_pending() {
        assert_eq!(EvalStatus::parse("bogus", "app-1"), EvalStatus::Pending);
    }

    #[test]
    fn test_new_application_is_pending() {
        let app = Application::new("app-1", Map::new());
        assert_eq!(app.eval_status, EvalStatus::Pending);
        assert!(app.overall_score.is_none());
        assert!(app.evaluation.is_none());
    }

    #[test]
    fn test_answer_to_text_string() {
        assert_eq!(
            answer_to_text(&json!("  hello  ")),
            Some("hello".to_string())
        );
        assert_eq!(answer_to_text(&json!("   ")), None);
        assert_eq!(answer_to_text(&Value::Null), None);
    }

    #[test]
    fn test_answer_to_text_scalars() {
        assert_eq!(answer_to_text(&json!(42)), Some("42".to_string()));
        assert_eq!(answer_to_text(&json!(true)), Some("true".to_string()));
    }

    #[test]
    fn test_answer_to_text_array() {
        assert_eq!(
            answer_to_text(&json!(["first", "second"])),
            Some("first\nsecond".to_string())
        );
        assert_eq!(answer_to_text(&json!([])), None);
    }

    #[test]
    fn test_answer_to_text_object() {
        let text = answer_to_text(&json!({"k": "v"})).unwrap();
        assert!(text.contains("\"k\""));
    }
}
