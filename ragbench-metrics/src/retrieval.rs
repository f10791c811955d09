//! Deterministic retrieval metrics.
//!
//! A retrieved chunk counts as relevant when it recovers enough of the
//! reference context, measured as the ROUGE-L recall of the reference against
//! the chunk.

use async_trait::async_trait;
use ragbench_core::error::ScoreError;
use ragbench_core::scoring::{EvalRecord, Scorer};
use ragbench_core::types::Scores;

use crate::text::{self, Prf};

/// Default ROUGE-L recall a chunk needs to count as relevant.
pub const DEFAULT_RELEVANCE_THRESHOLD: f64 = 0.7;

/// Relevance of each retrieved chunk to `reference`, in rank order.
pub fn relevance_flags(reference: &str, chunks: &[String], threshold: f64) -> Vec<bool> {
    chunks
        .iter()
        .map(|chunk| text::rouge_l(chunk, reference).recall >= threshold)
        .collect()
}

fn reference<'a>(scorer: &str, record: &'a EvalRecord) -> Result<&'a str, ScoreError> {
    record
        .ground_truth_context
        .as_deref()
        .or(record.ground_truth_answer.as_deref())
        .ok_or_else(|| ScoreError::InvalidRecord {
            scorer: scorer.to_string(),
            reason: "no reference context".to_string(),
        })
}

/// Context precision, recall and F1.
///
/// Precision is the share of relevant chunks. Recall is the ROUGE-L recall of
/// the reference against all chunks joined in rank order.
#[derive(Debug, Clone)]
pub struct PrecisionRecallF1 {
    threshold: f64,
}

impl Default for PrecisionRecallF1 {
    fn default() -> Self {
        Self::new(DEFAULT_RELEVANCE_THRESHOLD)
    }
}

impl PrecisionRecallF1 {
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }
}

#[async_trait]
impl Scorer for PrecisionRecallF1 {
    fn name(&self) -> &str {
        "precision_recall_f1"
    }

    async fn score(&self, record: &EvalRecord) -> Result<Scores, ScoreError> {
        let reference = reference(self.name(), record)?;
        let chunks = &record.retrieved_context;
        let flags = relevance_flags(reference, chunks, self.threshold);
        let precision = if flags.is_empty() {
            0.0
        } else {
            flags.iter().filter(|f| **f).count() as f64 / flags.len() as f64
        };
        let recall = text::rouge_l(&chunks.join(" "), reference).recall;
        let prf = Prf::new(precision, recall);

        Ok([
            ("context_precision", prf.precision),
            ("context_recall", prf.recall),
            ("context_f1", prf.f1),
        ]
        .into_iter()
        .collect())
    }
}

/// Rank-aware metrics over binary chunk relevance.
#[derive(Debug, Clone)]
pub struct RankedRetrievalMetrics {
    threshold: f64,
}

impl Default for RankedRetrievalMetrics {
    fn default() -> Self {
        Self::new(DEFAULT_RELEVANCE_THRESHOLD)
    }
}

impl RankedRetrievalMetrics {
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }
}

/// Mean of precision@k over the ranks k that hold a relevant chunk.
pub fn average_precision(flags: &[bool]) -> f64 {
    let mut hits = 0usize;
    let mut sum = 0.0;
    for (i, relevant) in flags.iter().enumerate() {
        if *relevant {
            hits += 1;
            sum += hits as f64 / (i + 1) as f64;
        }
    }
    if hits == 0 { 0.0 } else { sum / hits as f64 }
}

pub fn reciprocal_rank(flags: &[bool]) -> f64 {
    flags
        .iter()
        .position(|r| *r)
        .map_or(0.0, |i| 1.0 / (i + 1) as f64)
}

/// nDCG with binary gains.
pub fn ndcg(flags: &[bool]) -> f64 {
    let discount = |i: usize| 1.0 / ((i + 2) as f64).log2();
    let dcg: f64 = flags
        .iter()
        .enumerate()
        .filter(|(_, r)| **r)
        .map(|(i, _)| discount(i))
        .sum();
    let relevant = flags.iter().filter(|r| **r).count();
    let ideal: f64 = (0..relevant).map(discount).sum();
    if ideal == 0.0 { 0.0 } else { dcg / ideal }
}

#[async_trait]
impl Scorer for RankedRetrievalMetrics {
    fn name(&self) -> &str {
        "ranked_retrieval"
    }

    async fn score(&self, record: &EvalRecord) -> Result<Scores, ScoreError> {
        let reference = reference(self.name(), record)?;
        let flags = relevance_flags(reference, &record.retrieved_context, self.threshold);
        Ok([
            ("average_precision", average_precision(&flags)),
            ("reciprocal_rank", reciprocal_rank(&flags)),
            ("ndcg", ndcg(&flags)),
        ]
        .into_iter()
        .collect())
    }
}
