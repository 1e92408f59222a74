//! Parser for the oracle's free-text evaluation responses.
//!
//! The oracle is asked to answer in a fixed textual grammar
//! (`SCORE: n/10`, `Strengths: ...`, `Areas for Improvement: ...`) but
//! nothing guarantees it complies. Parsing is therefore defensive: any
//! input degrades to a usable record, never an error.

use std::sync::LazyLock;

use regex::Regex;

use super::QuestionScoreRecord;

/// Outcome of parsing one oracle response.
#[derive(Debug, Clone, PartialEq)]
pub enum ParseOutcome {
    /// At least one grammar anchor was found.
    Parsed(ParsedEvaluation),
    /// No score anchor and no section header anywhere in the text.
    Unrecognized,
}

/// The structured fields extracted from a recognized response.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedEvaluation {
    /// Extracted score, clamped to [0, 10]. Missing anchor yields 0.
    pub score: f64,
    pub strengths: Vec<String>,
    pub improvements: Vec<String>,
}

impl ParseOutcome {
    /// Converts the outcome into a score record, keeping the raw text
    /// for audit. Unrecognized responses become zero-score records with
    /// empty feedback, per the degrade-gracefully contract.
    pub fn into_record(self, raw_response: &str) -> QuestionScoreRecord {
        match self {
            ParseOutcome::Parsed(parsed) => QuestionScoreRecord {
                score: parsed.score,
                strengths: parsed.strengths,
                improvements: parsed.improvements,
                raw_response: raw_response.to_string(),
                oracle_responded: true,
            },
            ParseOutcome::Unrecognized => QuestionScoreRecord {
                score: 0.0,
                strengths: vec![],
                improvements: vec![],
                raw_response: raw_response.to_string(),
                oracle_responded: true,
            },
        }
    }
}

// "SCORE: 8", "score: 8.5/10", "SCORE:7 / 10"
static RE_SCORE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)SCORE:\s*(-?\d+(?:\.\d+)?)(?:\s*/\s*10)?").unwrap());
static RE_STRENGTHS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)strengths:").unwrap());
static RE_IMPROVEMENTS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)areas for improvement:").unwrap());

/// Parses one raw oracle response.
///
/// Pure function of the input text. Returns `Unrecognized` only when the
/// score anchor and both section headers are entirely absent.
pub fn parse_response(raw: &str) -> ParseOutcome {
    let score_match = RE_SCORE.captures(raw);
    let strengths_header = RE_STRENGTHS.find(raw);
    let improvements_header = RE_IMPROVEMENTS.find(raw);

    if score_match.is_none() && strengths_header.is_none() && improvements_header.is_none() {
        return ParseOutcome::Unrecognized;
    }

    let score = score_match
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse::<f64>().ok())
        .unwrap_or(0.0)
        .clamp(0.0, 10.0);

    // Strengths span: from after its header up to the line carrying the
    // improvements header, so a bullet prefixing that line stays out of
    // the span. When both headers share a line the span ends at the
    // improvements header itself. Improvements span: from after its
    // header to the end of the text.
    let strengths = strengths_header
        .map(|h| {
            let end = improvements_header
                .map(|im| {
                    let line = start_of_line(raw, im.start());
                    if line > h.end() {
                        line
                    } else {
                        im.start()
                    }
                })
                .filter(|&end| end > h.end())
                .unwrap_or(raw.len());
            span_to_entries(&raw[h.end()..end])
        })
        .unwrap_or_default();

    let improvements = improvements_header
        .map(|h| span_to_entries(&raw[h.end()..]))
        .unwrap_or_default();

    ParseOutcome::Parsed(ParsedEvaluation {
        score,
        strengths,
        improvements,
    })
}

/// Byte offset of the first character on the line containing `idx`.
fn start_of_line(raw: &str, idx: usize) -> usize {
    raw[..idx].rfind('\n').map(|i| i + 1).unwrap_or(0)
}

/// Turns a section span into feedback entries. The span becomes a single
/// entry with surrounding whitespace and list bullets stripped from both
/// ends; an empty span yields no entries.
fn span_to_entries(span: &str) -> Vec<String> {
    let cleaned = span
        .trim()
        .trim_start_matches(['-', '–', '—', '*', '•'])
        .trim_end_matches(['-', '–', '—', '*', '•'])
        .trim();
    if cleaned.is_empty() {
        vec![]
    } else {
        vec![cleaned.to_string()]
    }
}
