//! Deterministic answer-quality metrics.

use async_trait::async_trait;
use ragbench_core::error::ScoreError;
use ragbench_core::scoring::{EvalRecord, Scorer};
use ragbench_core::types::Scores;

use crate::text;

fn required<'a>(
    scorer: &str,
    field: &'a Option<String>,
    what: &str,
) -> Result<&'a str, ScoreError> {
    field.as_deref().ok_or_else(|| ScoreError::InvalidRecord {
        scorer: scorer.to_string(),
        reason: format!("missing {what}"),
    })
}

/// Term-frequency cosine between the answer and the reference answer.
#[derive(Debug, Clone, Default)]
pub struct AnswerSimilarity;

#[async_trait]
impl Scorer for AnswerSimilarity {
    fn name(&self) -> &str {
        "answer_similarity"
    }

    async fn score(&self, record: &EvalRecord) -> Result<Scores, ScoreError> {
        let answer = required(self.name(), &record.answer, "answer")?;
        let reference = required(self.name(), &record.ground_truth_answer, "reference answer")?;
        Ok([("answer_similarity", text::tf_cosine(answer, reference))]
            .into_iter()
            .collect())
    }
}

/// Character-trigram Dice similarity between the answer and the reference answer.
#[derive(Debug, Clone, Default)]
pub struct CharNgramSimilarity;

#[async_trait]
impl Scorer for CharNgramSimilarity {
    fn name(&self) -> &str {
        "char_ngram_similarity"
    }

    async fn score(&self, record: &EvalRecord) -> Result<Scores, ScoreError> {
        let answer = required(self.name(), &record.answer, "answer")?;
        let reference = required(self.name(), &record.ground_truth_answer, "reference answer")?;
        Ok([("char_ngram_similarity", text::char_ngram_dice(answer, reference, 3))]
            .into_iter()
            .collect())
    }
}

/// Lexical correctness of the answer against the reference answer.
#[derive(Debug, Clone, Default)]
pub struct DeterministicAnswerCorrectness;

#[async_trait]
impl Scorer for DeterministicAnswerCorrectness {
    fn name(&self) -> &str {
        "answer_correctness"
    }

    async fn score(&self, record: &EvalRecord) -> Result<Scores, ScoreError> {
        let answer = required(self.name(), &record.answer, "answer")?;
        let reference = required(self.name(), &record.ground_truth_answer, "reference answer")?;
        let rouge = text::rouge_l(answer, reference);
        let overlap = text::token_overlap(answer, reference);

        Ok([
            ("rouge_l_recall", rouge.recall),
            ("rouge_l_precision", rouge.precision),
            ("rouge_l_f1", rouge.f1),
            ("token_overlap_recall", overlap.recall),
            ("token_overlap_precision", overlap.precision),
            ("token_overlap_f1", overlap.f1),
            ("bleu_score", text::bleu(answer, reference)),
        ]
        .into_iter()
        .collect())
    }
}

/// How well each answer sentence is supported by the retrieved context.
///
/// Every metric is the mean over answer sentences of a precision-style score
/// of the sentence against the joined context. An answer with no sentences
/// scores zero.
#[derive(Debug, Clone, Default)]
pub struct DeterministicFaithfulness;

#[async_trait]
impl Scorer for DeterministicFaithfulness {
    fn name(&self) -> &str {
        "faithfulness"
    }

    async fn score(&self, record: &EvalRecord) -> Result<Scores, ScoreError> {
        let answer = required(self.name(), &record.answer, "answer")?;
        let context = record.retrieved_context.join(" ");
        let sentences = text::split_sentences(answer);

        let mean = |f: &dyn Fn(&str) -> f64| {
            if sentences.is_empty() {
                0.0
            } else {
                sentences.iter().map(|s| f(s.as_str())).sum::<f64>() / sentences.len() as f64
            }
        };

        Ok([
            (
                "token_overlap_faithfulness",
                mean(&|s: &str| text::token_overlap(s, &context).precision),
            ),
            (
                "rouge_faithfulness",
                mean(&|s: &str| text::rouge_l(s, &context).precision),
            ),
            (
                "bleu_faithfulness",
                mean(&|s: &str| text::ngram_precision(s, &context)),
            ),
        ]
        .into_iter()
        .collect())
    }
}

/// Term-frequency cosine between the question and the answer.
#[derive(Debug, Clone, Default)]
pub struct AnswerRelevance;

#[async_trait]
impl Scorer for AnswerRelevance {
    fn name(&self) -> &str {
        "answer_relevance"
    }

    async fn score(&self, record: &EvalRecord) -> Result<Scores, ScoreError> {
        let answer = required(self.name(), &record.answer, "answer")?;
        Ok([("answer_relevance", text::tf_cosine(&record.question, answer))]
            .into_iter()
            .collect())
    }
}
