//! Error types for the ragbench core library.
//!
//! Uses `thiserror` for public API error types with structured variants
//! covering configuration, the Q&A service API, scoring, and run-fatal
//! benchmark conditions.

use std::path::PathBuf;

/// Top-level error type for the ragbench core library.
#[derive(Debug, thiserror::Error)]
pub enum BenchError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("API error: {0}")]
    Api(#[from] ApiError),

    #[error("Scoring error: {0}")]
    Scoring(#[from] ScoreError),

    #[error(
        "Could not fetch answer data for {source_name}/{experiment} on question: {question}"
    )]
    FetchFailed {
        source_name: String,
        experiment: String,
        question: String,
    },

    #[error("No system targets configured for source '{source_name}'")]
    UnknownSource { source_name: String },

    #[error("Dataset error in {path}: {message}")]
    Dataset { path: PathBuf, message: String },

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Errors from the configuration system.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Configuration file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("Environment variable not set: {var}")]
    EnvVarMissing { var: String },

    #[error("Invalid configuration: {message}")]
    Invalid { message: String },

    #[error("Configuration parse error: {message}")]
    ParseError { message: String },
}

/// Errors from the Q&A service API.
///
/// Answer and search calls collapse all of these into `None`; metadata calls
/// surface [`ApiError::Unavailable`].
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("HTTP error {status} from {url}")]
    HttpStatus { status: u16, url: String },

    #[error("Connection error: {message}")]
    Connection { message: String },

    #[error("Request timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    #[error("Request error: {message}")]
    Request { message: String },

    #[error("Response decode error: {message}")]
    Decode { message: String },

    #[error("No {what} found")]
    Unavailable { what: String },
}

/// Errors raised by scorers.
#[derive(Debug, thiserror::Error)]
pub enum ScoreError {
    #[error("Scorer '{scorer}' judge request failed: {message}")]
    Judge { scorer: String, message: String },

    #[error("Scorer '{scorer}' cannot score this record: {reason}")]
    InvalidRecord { scorer: String, reason: String },
}

/// A type alias for results using the top-level `BenchError`.
pub type Result<T> = std::result::Result<T, BenchError>;
