//! Scoring adapter between fetched answers and pluggable scorers.
//!
//! A [`Scorer`] takes an [`EvalRecord`] and returns a flat name -> score map.
//! The adapter packages fetched data into records, runs the scorer groups that
//! the metrics configuration enables, and merges their outputs in order.

use async_trait::async_trait;
use tracing::debug;

use crate::config::MetricsConfig;
use crate::error::ScoreError;
use crate::types::{ContextChunk, FetchResult, Scores};

/// Key prefix for LLM-judged retrieval metrics, keeping them apart from
/// deterministic metrics of the same family.
pub const LLM_PREFIX: &str = "LLM_";

/// Evaluation record handed to scorers. Fields a scorer does not need may be empty.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EvalRecord {
    pub question: String,
    pub answer: Option<String>,
    pub retrieved_context: Vec<String>,
    pub ground_truth_answer: Option<String>,
    pub ground_truth_context: Option<String>,
}

impl EvalRecord {
    /// Record for retrieval scoring: question, retrieved chunks, reference context.
    pub fn retrieval(question: &str, ground_truth: &str, chunks: &[ContextChunk]) -> Self {
        Self {
            question: question.to_string(),
            retrieved_context: chunks.iter().map(|c| c.content.clone()).collect(),
            ground_truth_context: Some(ground_truth.to_string()),
            ..Self::default()
        }
    }

    /// Record for answer scoring. The ground truth serves as both reference
    /// answer and reference context.
    pub fn answer(question: &str, ground_truth: &str, fetch: &FetchResult) -> Self {
        Self {
            question: question.to_string(),
            answer: Some(fetch.answer.clone()),
            retrieved_context: fetch.context_texts(),
            ground_truth_answer: Some(ground_truth.to_string()),
            ground_truth_context: Some(ground_truth.to_string()),
        }
    }

    /// Reduced record holding only question and answer.
    pub fn question_answer(question: &str, answer: &str) -> Self {
        Self {
            question: question.to_string(),
            answer: Some(answer.to_string()),
            ..Self::default()
        }
    }
}

/// An evaluation metric (or family of metrics).
#[async_trait]
pub trait Scorer: Send + Sync {
    /// Name used in logs and errors.
    fn name(&self) -> &str;

    /// Score one record.
    async fn score(&self, record: &EvalRecord) -> Result<Scores, ScoreError>;
}

/// Scorer groups, each applied under its own condition.
#[derive(Default)]
pub struct ScorerSet {
    /// Always applied to retrieval.
    pub retrieval: Vec<Box<dyn Scorer>>,
    /// Applied to retrieval when LLM evaluation is on; keys are prefixed [`LLM_PREFIX`].
    pub llm_retrieval: Vec<Box<dyn Scorer>>,
    /// Always applied to answers.
    pub answer_baseline: Vec<Box<dyn Scorer>>,
    /// Applied to answers when additional metrics are on.
    pub answer_additional: Vec<Box<dyn Scorer>>,
    /// Applied to the question/answer pair when additional metrics are on.
    pub relevance: Vec<Box<dyn Scorer>>,
}

/// Runs the enabled scorer groups and merges their outputs.
pub struct ScoringAdapter {
    scorers: ScorerSet,
    llm_eval: bool,
    additional_metrics: bool,
}

impl ScoringAdapter {
    pub fn new(scorers: ScorerSet, metrics: &MetricsConfig) -> Self {
        Self {
            scorers,
            llm_eval: metrics.llm_eval,
            additional_metrics: metrics.additional_metrics,
        }
    }

    /// Score retrieved chunks against the reference context.
    pub async fn score_retrieval(
        &self,
        question: &str,
        ground_truth: &str,
        chunks: &[ContextChunk],
    ) -> Result<Scores, ScoreError> {
        let record = EvalRecord::retrieval(question, ground_truth, chunks);
        let mut scores = run_all(&self.scorers.retrieval, &record).await?;
        if self.llm_eval {
            let llm = run_all(&self.scorers.llm_retrieval, &record).await?;
            scores.merge(llm.prefixed(LLM_PREFIX));
        }
        Ok(scores)
    }

    /// Score the fetched answer against the reference answer.
    pub async fn score_system(
        &self,
        question: &str,
        ground_truth: &str,
        fetch: &FetchResult,
    ) -> Result<Scores, ScoreError> {
        let record = EvalRecord::answer(question, ground_truth, fetch);
        let mut scores = run_all(&self.scorers.answer_baseline, &record).await?;
        if self.additional_metrics {
            scores.merge(run_all(&self.scorers.answer_additional, &record).await?);
            let reduced = EvalRecord::question_answer(question, &fetch.answer);
            scores.merge(run_all(&self.scorers.relevance, &reduced).await?);
        }
        Ok(scores)
    }
}

async fn run_all(scorers: &[Box<dyn Scorer>], record: &EvalRecord) -> Result<Scores, ScoreError> {
    let mut merged = Scores::new();
    for scorer in scorers {
        let scores = scorer.score(record).await?;
        debug!(scorer = scorer.name(), metrics = scores.len(), "Scored");
        merged.merge(scores);
    }
    Ok(merged)
}
