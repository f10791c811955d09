//! Core data types shared across the benchmark pipeline.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// One row of the input question dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionRecord {
    pub question: String,
    #[serde(rename = "gt_answer")]
    pub ground_truth_answer: String,
    /// Benchmark category; key into the target map.
    pub source: String,
    #[serde(
        rename = "gt_context",
        default,
        deserialize_with = "empty_as_none",
        skip_serializing_if = "Option::is_none"
    )]
    pub ground_truth_context: Option<String>,
}

impl QuestionRecord {
    pub fn new(
        question: impl Into<String>,
        ground_truth_answer: impl Into<String>,
        source: impl Into<String>,
    ) -> Self {
        Self {
            question: question.into(),
            ground_truth_answer: ground_truth_answer.into(),
            source: source.into(),
            ground_truth_context: None,
        }
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.ground_truth_context = Some(context.into());
        self
    }

    /// Ground truth that retrieved chunks are compared against.
    ///
    /// Datasets that carry a `gt_context` column are scored against it; the
    /// others keep their reference context in `gt_answer`.
    pub fn retrieval_reference(&self) -> &str {
        match &self.ground_truth_context {
            Some(ctx) if !ctx.trim().is_empty() => ctx,
            _ => &self.ground_truth_answer,
        }
    }
}

fn empty_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = Option::<String>::deserialize(deserializer)?;
    Ok(value.filter(|s| !s.trim().is_empty()))
}

/// A configured RAG system variant to evaluate questions against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemTarget {
    pub experiment_name: String,
    pub system_id: Uuid,
}

impl SystemTarget {
    pub fn new(experiment_name: impl Into<String>, system_id: Uuid) -> Self {
        Self {
            experiment_name: experiment_name.into(),
            system_id,
        }
    }
}

/// One retrieved chunk from the merged-neighbouring-context probe node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextChunk {
    #[serde(rename = "Content")]
    pub content: String,
    /// Remaining chunk fields, kept as returned by the service.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ContextChunk {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            extra: Map::new(),
        }
    }
}

/// Output of one successful answer fetch.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchResult {
    pub answer: String,
    /// The response's `context` field, opaque to the harness.
    pub context: Value,
    pub chunks: Vec<ContextChunk>,
}

impl FetchResult {
    /// Text of each context entry, taken from its `data` field.
    pub fn context_texts(&self) -> Vec<String> {
        match &self.context {
            Value::Array(items) => items
                .iter()
                .filter_map(|item| match item.get("data") {
                    Some(Value::String(s)) => Some(s.clone()),
                    Some(Value::Null) | None => None,
                    Some(other) => Some(other.to_string()),
                })
                .collect(),
            _ => Vec::new(),
        }
    }

    pub fn chunk_contents(&self) -> Vec<String> {
        self.chunks.iter().map(|c| c.content.clone()).collect()
    }
}

/// Insertion-ordered metric name to score mapping.
///
/// Inserting an existing key replaces its value in place, so a merged map
/// keeps the column order in which metrics first appeared.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Scores(Vec<(String, f64)>);

impl Scores {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: f64) {
        let name = name.into();
        match self.0.iter_mut().find(|(k, _)| *k == name) {
            Some(entry) => entry.1 = value,
            None => self.0.push((name, value)),
        }
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.0.iter().find(|(k, _)| k == name).map(|(_, v)| *v)
    }

    pub fn contains_key(&self, name: &str) -> bool {
        self.0.iter().any(|(k, _)| k == name)
    }

    /// Merge `other` into `self`; keys from `other` win.
    pub fn merge(&mut self, other: Scores) {
        for (name, value) in other.0 {
            self.insert(name, value);
        }
    }

    /// Copy of this map with every key prefixed.
    pub fn prefixed(&self, prefix: &str) -> Scores {
        Scores(
            self.0
                .iter()
                .map(|(k, v)| (format!("{prefix}{k}"), *v))
                .collect(),
        )
    }

    pub fn remove(&mut self, name: &str) -> Option<f64> {
        let idx = self.0.iter().position(|(k, _)| k == name)?;
        Some(self.0.remove(idx).1)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|(k, _)| k.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.0.iter().map(|(k, v)| (k.as_str(), *v))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>> FromIterator<(K, f64)> for Scores {
    fn from_iter<I: IntoIterator<Item = (K, f64)>>(iter: I) -> Self {
        let mut scores = Scores::new();
        for (k, v) in iter {
            scores.insert(k, v);
        }
        scores
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_scores_merge_later_wins_keeps_position() {
        let mut a: Scores = [("precision", 0.1), ("recall", 0.2)].into_iter().collect();
        let b: Scores = [("f1", 0.3), ("precision", 0.9)].into_iter().collect();
        a.merge(b);
        let keys: Vec<_> = a.keys().collect();
        assert_eq!(keys, vec!["precision", "recall", "f1"]);
        assert_eq!(a.get("precision"), Some(0.9));
    }

    #[test]
    fn test_scores_prefixed() {
        let s: Scores = [("context_precision", 0.5)].into_iter().collect();
        let p = s.prefixed("LLM_");
        assert_eq!(p.get("LLM_context_precision"), Some(0.5));
        assert!(!p.contains_key("context_precision"));
    }

    #[test]
    fn test_retrieval_reference_prefers_context() {
        let row = QuestionRecord::new("q", "answer", "finance_bench");
        assert_eq!(row.retrieval_reference(), "answer");
        let row = row.with_context("the 10-K says so");
        assert_eq!(row.retrieval_reference(), "the 10-K says so");
        let blank = QuestionRecord::new("q", "answer", "s").with_context("  ");
        assert_eq!(blank.retrieval_reference(), "answer");
    }

    #[test]
    fn test_context_chunk_keeps_extra_fields() {
        let chunk: ContextChunk =
            serde_json::from_value(json!({"Content": "text", "Score": 0.8, "Id": "c1"})).unwrap();
        assert_eq!(chunk.content, "text");
        assert_eq!(chunk.extra.get("Id"), Some(&json!("c1")));
    }

    #[test]
    fn test_context_texts_reads_data_field() {
        let fetch = FetchResult {
            answer: "a".into(),
            context: json!([{"data": "first"}, {"data": {"k": 1}}, {"other": 1}]),
            chunks: vec![],
        };
        assert_eq!(
            fetch.context_texts(),
            vec!["first".to_string(), "{\"k\":1}".to_string()]
        );
    }
}
