//! # ragbench core
//!
//! Benchmarks hosted RAG question-answering systems. Provides the Q&A service
//! client, answer fetching with a bounded retry budget, probe-tree extraction,
//! the scoring adapter over pluggable scorers, and the benchmark driver that
//! writes per-question results and grouped statistics.

pub mod client;
pub mod config;
pub mod dataset;
pub mod driver;
pub mod error;
pub mod fetch;
pub mod probe;
pub mod results;
pub mod scoring;
pub mod types;

// Re-export commonly used types at the crate root.
pub use client::{AnswerSource, QnaClient};
pub use config::{BenchConfig, Credentials, MetricsConfig, load_config};
pub use driver::{BenchmarkDriver, DriverSettings, RunPhase, RunSummary};
pub use error::{ApiError, BenchError, ConfigError, Result, ScoreError};
pub use fetch::AnswerFetcher;
pub use results::{ResultSet, ScoreRecord, StatsTable};
pub use scoring::{EvalRecord, Scorer, ScorerSet, ScoringAdapter};
pub use types::{ContextChunk, FetchResult, QuestionRecord, Scores, SystemTarget};
