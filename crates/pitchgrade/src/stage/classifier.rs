//! Stage classification from raw application fields.
//!
//! A fixed, priority-ordered list of typed accessors is probed in
//! sequence; the first candidate whose value normalizes to a canonical
//! stage wins. Classification is pure and total: malformed input
//! produces warnings, never errors.

use serde_json::Value;

use super::CanonicalStage;
use crate::application::Application;

/// One candidate location for the raw stage indicator.
struct StageCandidate {
    /// Name recorded in diagnostics when this candidate is used.
    source: &'static str,
    /// Typed accessor returning the raw value, if present.
    get: fn(&Application) -> Option<Value>,
}

/// Candidate locations in priority order. Earlier entries win.
const CANDIDATES: &[StageCandidate] = &[
    StageCandidate {
        source: "answers.startup_stage",
        get: |app| app.answers.get("startup_stage").cloned(),
    },
    StageCandidate {
        source: "answers.stage",
        get: |app| app.answers.get("stage").cloned(),
    },
    StageCandidate {
        source: "registration.stage",
        get: |app| {
            app.registration
                .as_ref()
                .and_then(|r| r.get("stage"))
                .cloned()
        },
    },
    StageCandidate {
        source: "stage",
        get: |app| app.stage.clone().map(Value::String),
    },
    StageCandidate {
        source: "startup_stage",
        get: |app| app.startup_stage.clone().map(Value::String),
    },
];

/// Normalization rules in priority order; the first rule whose needle
/// occurs in the lowercased first segment wins. Rule order is the
/// tie-break for values matching more than one rule; in particular,
/// "MVP" anywhere beats an accompanying "idea".
const RULES: &[(&str, CanonicalStage)] = &[
    ("mvp", CanonicalStage::MvpStage),
    ("minimum viable", CanonicalStage::MvpStage),
    ("prototype", CanonicalStage::MvpStage),
    ("revenue", CanonicalStage::EarlyRevenue),
    ("paying customer", CanonicalStage::EarlyRevenue),
    ("idea", CanonicalStage::IdeaStage),
    ("concept", CanonicalStage::IdeaStage),
];

/// Result of classifying one application.
#[derive(Debug, Clone, PartialEq)]
pub struct StageClassification {
    /// The derived stage, if any candidate normalized.
    pub stage: Option<CanonicalStage>,
    /// The raw value of the winning candidate.
    pub raw_value: Option<String>,
    /// Which candidate location supplied the winning value.
    pub source: Option<&'static str>,
    /// The normalization rule that matched.
    pub matched_rule: Option<&'static str>,
    /// One warning per candidate that was present but did not
    /// normalize; empty on a clean first-candidate hit.
    pub warnings: Vec<String>,
}

impl StageClassification {
    fn none(warnings: Vec<String>) -> Self {
        Self {
            stage: None,
            raw_value: None,
            source: None,
            matched_rule: None,
            warnings,
        }
    }
}

/// Derives the canonical stage for an application.
///
/// Deterministic and idempotent: the same raw fields always yield the
/// same classification.
pub fn classify(app: &Application) -> StageClassification {
    let mut warnings = Vec::new();

    for candidate in CANDIDATES {
        let value = match (candidate.get)(app) {
            Some(v) => v,
            None => continue,
        };

        let raw = match &value {
            Value::String(s) => s.clone(),
            other => {
                warnings.push(format!(
                    "stage candidate '{}' is not a string (got {})",
                    candidate.source,
                    json_type_name(other)
                ));
                continue;
            }
        };

        if raw.trim().is_empty() {
            warnings.push(format!("stage candidate '{}' is empty", candidate.source));
            continue;
        }

        match normalize(&raw) {
            Some((stage, rule)) => {
                return StageClassification {
                    stage: Some(stage),
                    raw_value: Some(raw),
                    source: Some(candidate.source),
                    matched_rule: Some(rule),
                    warnings,
                };
            }
            None => {
                warnings.push(format!(
                    "stage candidate '{}' value '{}' did not match any known stage",
                    candidate.source, raw
                ));
            }
        }
    }

    StageClassification::none(warnings)
}

/// Normalizes one raw stage string: trim, split on common delimiters,
/// take the first segment, match case-insensitively against the ordered
/// rule set. Returns the stage and the rule needle that matched.
fn normalize(raw: &str) -> Option<(CanonicalStage, &'static str)> {
    let first_segment = raw
        .split(['/', ',', '|'])
        .next()
        .unwrap_or(raw)
        .trim()
        .to_lowercase();

    if first_segment.is_empty() {
        return None;
    }

    RULES
        .iter()
        .find(|(needle, _)| first_segment.contains(needle))
        .map(|(needle, stage)| (*stage, *needle))
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
