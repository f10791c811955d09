//! Error types for LLM-judged metrics.

use ragbench_core::error::ScoreError;

/// Errors from the judge's OpenAI-compatible endpoint.
#[derive(Debug, thiserror::Error)]
pub enum JudgeError {
    #[error("Judge API key not set: {var}")]
    MissingApiKey { var: String },

    #[error("Authentication failed for judge endpoint")]
    AuthFailed,

    #[error("Rate limited, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Judge request failed: {message}")]
    ApiRequest { message: String },

    #[error("Judge response could not be parsed: {message}")]
    ResponseParse { message: String },
}

impl JudgeError {
    /// Transient failures worth another attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, JudgeError::RateLimited { .. })
    }

    pub fn into_score_error(self, scorer: &str) -> ScoreError {
        ScoreError::Judge {
            scorer: scorer.to_string(),
            message: self.to_string(),
        }
    }
}
