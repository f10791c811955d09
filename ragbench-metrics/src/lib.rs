//! # ragbench metrics
//!
//! Concrete [`Scorer`](ragbench_core::Scorer) implementations: deterministic
//! retrieval and answer metrics, and an LLM-judged context precision.

pub mod answer;
pub mod error;
pub mod judge;
pub mod retrieval;
pub mod text;

pub use answer::{
    AnswerRelevance, AnswerSimilarity, CharNgramSimilarity, DeterministicAnswerCorrectness,
    DeterministicFaithfulness,
};
pub use error::JudgeError;
pub use judge::{JudgeClient, LlmContextPrecision};
pub use retrieval::{PrecisionRecallF1, RankedRetrievalMetrics};

use ragbench_core::config::MetricsConfig;
use ragbench_core::scoring::ScorerSet;

/// The standard scorer groups.
///
/// The judge client is only built when LLM evaluation is enabled, so its API
/// key is only required then.
pub fn default_scorer_set(metrics: &MetricsConfig) -> Result<ScorerSet, JudgeError> {
    let mut set = ScorerSet {
        retrieval: vec![
            Box::new(PrecisionRecallF1::default()),
            Box::new(RankedRetrievalMetrics::default()),
        ],
        answer_baseline: vec![Box::new(AnswerSimilarity)],
        answer_additional: vec![
            Box::new(DeterministicAnswerCorrectness),
            Box::new(DeterministicFaithfulness),
            Box::new(CharNgramSimilarity),
        ],
        relevance: vec![Box::new(AnswerRelevance)],
        ..ScorerSet::default()
    };
    if metrics.llm_eval {
        let judge = JudgeClient::from_config(&metrics.judge)?;
        set.llm_retrieval
            .push(Box::new(LlmContextPrecision::new(judge)));
    }
    Ok(set)
}
