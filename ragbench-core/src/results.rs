//! Result accumulation, grouped statistics, and CSV output.

use std::collections::BTreeMap;
use std::path::Path;
use tracing::warn;

use crate::error::Result;
use crate::types::Scores;

/// Identity columns of a results row, in output order.
pub const IDENTITY_COLUMNS: [&str; 5] = [
    "question",
    "gt_answer",
    "system_answer",
    "source",
    "experiment_name",
];

/// One scored (question, system) pair.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoreRecord {
    pub question: String,
    pub ground_truth_answer: String,
    pub system_answer: String,
    pub source: String,
    pub experiment_name: String,
    pub scores: Scores,
}

impl ScoreRecord {
    /// Build a record, dropping any metric whose name collides with an identity column.
    pub fn new(
        question: impl Into<String>,
        ground_truth_answer: impl Into<String>,
        system_answer: impl Into<String>,
        source: impl Into<String>,
        experiment_name: impl Into<String>,
        mut scores: Scores,
    ) -> Self {
        for column in IDENTITY_COLUMNS {
            if scores.remove(column).is_some() {
                warn!(metric = column, "Dropping metric that collides with an identity column");
            }
        }
        Self {
            question: question.into(),
            ground_truth_answer: ground_truth_answer.into(),
            system_answer: system_answer.into(),
            source: source.into(),
            experiment_name: experiment_name.into(),
            scores,
        }
    }
}

/// All scored rows of a run, with metric columns in first-seen order.
#[derive(Debug, Clone, Default)]
pub struct ResultSet {
    records: Vec<ScoreRecord>,
    metric_columns: Vec<String>,
}

impl ResultSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, record: ScoreRecord) {
        for key in record.scores.keys() {
            if !self.metric_columns.iter().any(|c| c == key) {
                self.metric_columns.push(key.to_string());
            }
        }
        self.records.push(record);
    }

    pub fn records(&self) -> &[ScoreRecord] {
        &self.records
    }

    pub fn metric_columns(&self) -> &[String] {
        &self.metric_columns
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Remove metric columns by name. Names not present are ignored.
    pub fn drop_columns(&mut self, columns: &[String]) {
        self.metric_columns.retain(|c| !columns.contains(c));
        for record in &mut self.records {
            for column in columns {
                record.scores.remove(column);
            }
        }
    }

    /// Write one row per record: identity columns, then every metric column.
    /// A metric a row lacks is written as an empty cell.
    pub fn write_csv(&self, path: &Path) -> Result<()> {
        let mut writer = csv::Writer::from_path(path)?;
        let header: Vec<&str> = IDENTITY_COLUMNS
            .iter()
            .copied()
            .chain(self.metric_columns.iter().map(String::as_str))
            .collect();
        writer.write_record(&header)?;

        for record in &self.records {
            let mut row = vec![
                record.question.clone(),
                record.ground_truth_answer.clone(),
                record.system_answer.clone(),
                record.source.clone(),
                record.experiment_name.clone(),
            ];
            row.extend(
                self.metric_columns
                    .iter()
                    .map(|c| record.scores.get(c).map(|v| v.to_string()).unwrap_or_default()),
            );
            writer.write_record(&row)?;
        }
        writer.flush()?;
        Ok(())
    }
}

/// Per-group mean of one metric.
#[derive(Debug, Clone, Default)]
struct Accumulator {
    sum: f64,
    count: usize,
}

/// Mean metric values per (source, experiment_name) group.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatsTable {
    /// Metric columns, sorted by name.
    columns: Vec<String>,
    /// Groups in sorted key order; `None` where a group has no value for a column.
    groups: Vec<StatsRow>,
}

/// One aggregated group.
#[derive(Debug, Clone, PartialEq)]
pub struct StatsRow {
    pub source: String,
    pub experiment_name: String,
    pub means: Vec<Option<f64>>,
}

impl StatsTable {
    /// Group results by (source, experiment_name) and average every metric.
    /// Missing values are skipped rather than counted as zero.
    pub fn from_results(results: &ResultSet) -> Self {
        let mut columns: Vec<String> = results.metric_columns().to_vec();
        columns.sort();
        columns.dedup();

        let mut grouped: BTreeMap<(String, String), Vec<Accumulator>> = BTreeMap::new();
        for record in results.records() {
            let accs = grouped
                .entry((record.source.clone(), record.experiment_name.clone()))
                .or_insert_with(|| vec![Accumulator::default(); columns.len()]);
            for (acc, column) in accs.iter_mut().zip(&columns) {
                if let Some(value) = record.scores.get(column)
                    && !value.is_nan()
                {
                    acc.sum += value;
                    acc.count += 1;
                }
            }
        }

        let groups = grouped
            .into_iter()
            .map(|((source, experiment_name), accs)| StatsRow {
                source,
                experiment_name,
                means: accs
                    .into_iter()
                    .map(|a| (a.count > 0).then(|| a.sum / a.count as f64))
                    .collect(),
            })
            .collect();

        Self { columns, groups }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn groups(&self) -> &[StatsRow] {
        &self.groups
    }

    /// Mean of `column` for one group.
    pub fn mean(&self, source: &str, experiment_name: &str, column: &str) -> Option<f64> {
        let idx = self.columns.iter().position(|c| c == column)?;
        self.groups
            .iter()
            .find(|g| g.source == source && g.experiment_name == experiment_name)
            .and_then(|g| g.means[idx])
    }

    pub fn write_csv(&self, path: &Path) -> Result<()> {
        let mut writer = csv::Writer::from_path(path)?;
        let header: Vec<&str> = ["source", "experiment_name"]
            .into_iter()
            .chain(self.columns.iter().map(String::as_str))
            .collect();
        writer.write_record(&header)?;
        for group in &self.groups {
            let mut row = vec![group.source.clone(), group.experiment_name.clone()];
            row.extend(
                group
                    .means
                    .iter()
                    .map(|m| m.map(|v| v.to_string()).unwrap_or_default()),
            );
            writer.write_record(&row)?;
        }
        writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn record(source: &str, experiment: &str, scores: &[(&str, f64)]) -> ScoreRecord {
        ScoreRecord::new(
            "q",
            "gt",
            "answer",
            source,
            experiment,
            scores.iter().map(|(k, v)| (*k, *v)).collect(),
        )
    }

    #[test]
    fn test_identity_collision_is_dropped() {
        let r = record("s", "e", &[("source", 1.0), ("precision", 0.5)]);
        assert_eq!(r.source, "s");
        assert!(!r.scores.contains_key("source"));
        assert_eq!(r.scores.get("precision"), Some(0.5));
    }

    #[test]
    fn test_metric_columns_first_seen_order() {
        let mut results = ResultSet::new();
        results.push(record("s", "e", &[("recall", 1.0), ("precision", 0.5)]));
        results.push(record("s", "e", &[("f1", 0.2), ("recall", 0.0)]));
        assert_eq!(results.metric_columns(), &["recall", "precision", "f1"]);
    }

    #[test]
    fn test_grouped_mean() {
        let mut results = ResultSet::new();
        for p in [0.5, 0.7, 0.9] {
            results.push(record("finance_bench", "finance_bench", &[("precision", p)]));
        }
        results.push(record("finance_bench", "finance_bench_v1", &[("precision", 0.1)]));
        let stats = StatsTable::from_results(&results);
        assert_eq!(stats.groups().len(), 2);
        let mean = stats
            .mean("finance_bench", "finance_bench", "precision")
            .unwrap();
        assert!((mean - 0.7).abs() < 1e-12);
        assert_eq!(
            stats.mean("finance_bench", "finance_bench_v1", "precision"),
            Some(0.1)
        );
    }

    #[test]
    fn test_mean_skips_missing_values() {
        let mut results = ResultSet::new();
        results.push(record("s", "e", &[("a", 1.0)]));
        results.push(record("s", "e", &[("a", 3.0), ("b", 4.0)]));
        results.push(record("t", "e", &[("a", 5.0)]));
        let stats = StatsTable::from_results(&results);
        assert_eq!(stats.mean("s", "e", "a"), Some(2.0));
        assert_eq!(stats.mean("s", "e", "b"), Some(4.0));
        assert_eq!(stats.mean("t", "e", "b"), None);
    }

    #[test]
    fn test_stats_columns_sorted_and_groups_ordered() {
        let mut results = ResultSet::new();
        results.push(record("maud", "v2", &[("recall", 1.0), ("average_precision", 0.5)]));
        results.push(record("cuad", "v1", &[("recall", 0.0)]));
        let stats = StatsTable::from_results(&results);
        assert_eq!(stats.columns(), &["average_precision", "recall"]);
        let keys: Vec<_> = stats
            .groups()
            .iter()
            .map(|g| (g.source.as_str(), g.experiment_name.as_str()))
            .collect();
        assert_eq!(keys, vec![("cuad", "v1"), ("maud", "v2")]);
    }

    #[test]
    fn test_drop_columns() {
        let mut results = ResultSet::new();
        results.push(record("s", "e", &[("rouge_l_f1", 0.3), ("answer_similarity", 0.8)]));
        results.drop_columns(&["rouge_l_f1".to_string(), "not_there".to_string()]);
        assert_eq!(results.metric_columns(), &["answer_similarity"]);
        assert!(!results.records()[0].scores.contains_key("rouge_l_f1"));
    }

    #[test]
    fn test_write_csv_fills_missing_cells() {
        let dir = tempfile::tempdir().unwrap();
        let mut results = ResultSet::new();
        results.push(record("s", "e", &[("a", 1.0)]));
        results.push(record("s", "e", &[("b", 0.25)]));
        let path = dir.path().join("results.csv");
        results.write_csv(&path).unwrap();
        let written = std::fs::read_to_string(&path).unwrap();
        assert_eq!(
            written,
            "question,gt_answer,system_answer,source,experiment_name,a,b\n\
             q,gt,answer,s,e,1,\n\
             q,gt,answer,s,e,,0.25\n"
        );

        let stats_path = dir.path().join("stats.csv");
        StatsTable::from_results(&results).write_csv(&stats_path).unwrap();
        assert_eq!(
            std::fs::read_to_string(&stats_path).unwrap(),
            "source,experiment_name,a,b\ns,e,1,0.25\n"
        );
    }
}
