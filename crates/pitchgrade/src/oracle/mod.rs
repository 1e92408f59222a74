//! Scoring oracle abstraction.
//!
//! The evaluator never talks to an LLM API directly; it goes through
//! the `ScoringOracle` trait so tests can substitute a scripted fake
//! and the HTTP backend stays swappable.

use async_trait::async_trait;
use thiserror::Error;

pub mod http;

pub use http::HttpOracle;

/// Errors from a single oracle call. All variants are treated as
/// question-level dispatch failures by the evaluator; none aborts the
/// evaluation as a whole.
#[derive(Debug, Error)]
pub enum OracleError {
    #[error("Oracle rate limited the request")]
    RateLimited,

    #[error("Oracle call timed out after {seconds}s")]
    Timeout { seconds: u64 },

    #[error("Oracle returned HTTP {status}: {message}")]
    Http { status: u16, message: String },

    #[error("Oracle transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Oracle response contained no content")]
    EmptyResponse,
}

/// A scoring backend: takes one prompt and one applicant answer,
/// returns the raw response text.
#[async_trait]
pub trait ScoringOracle: Send + Sync {
    /// Evaluates one answer against one question prompt.
    async fn evaluate(&self, prompt: &str, answer: &str) -> Result<String, OracleError>;

    /// Model identifier recorded in result metadata.
    fn model_name(&self) -> &str;
}

/// Sanitizes applicant text for safe inclusion in oracle prompts.
///
/// Escapes ChatML special tokens and common instruction markers so
/// applicant answers cannot smuggle role switches into the prompt.
pub fn sanitize_for_prompt(text: &str) -> String {
    text.replace("<|", "< |")
        .replace("|>", "| >")
        .replace("<s>", "< s >")
        .replace("</s>", "< / s >")
        .replace("[INST]", "[ INST ]")
        .replace("[/INST]", "[ / INST ]")
        .replace("<<SYS>>", "< < SYS > >")
        .replace("<</SYS>>", "< < / SYS > >")
}

/// Maximum number of answer characters forwarded per oracle call.
/// Longer answers are truncated, not rejected.
pub const MAX_ANSWER_CHARS: usize = 4000;

/// Renders the full user message for one question: sanitized, truncated
/// answer text under the question prompt.
pub fn build_answer_block(answer: &str) -> String {
    let sanitized: String = sanitize_for_prompt(answer)
        .chars()
        .take(MAX_ANSWER_CHARS)
        .collect();
    format!("Applicant answer:\n\"\"\"\n{}\n\"\"\"", sanitized)
}
