//! End-to-end benchmark runs against an in-memory answer source.

use async_trait::async_trait;
use pretty_assertions::assert_eq;
use ragbench_core::config::RetryConfig;
use ragbench_core::{
    AnswerFetcher, AnswerSource, BenchError, BenchmarkDriver, DriverSettings, EvalRecord,
    MetricsConfig, QuestionRecord, RunPhase, ScoreError, Scorer, ScorerSet, Scores,
    ScoringAdapter, StatsTable, SystemTarget,
};
use serde_json::{Value, json};
use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use uuid::Uuid;

const FINANCE_V0: Uuid = uuid::uuid!("2b96cc86-b5e7-4432-880f-9b297c119360");
const FINANCE_V1: Uuid = uuid::uuid!("ace5666e-ec0e-446f-bd5f-6a61e2e1a4ad");
const BROKEN: Uuid = uuid::uuid!("04d1b00f-1739-486b-a3eb-a3fcb4c07e2a");

/// Answers every system except the ones marked broken.
struct ScriptedSource {
    broken: HashSet<Uuid>,
    calls: Mutex<Vec<(Uuid, String)>>,
}

impl ScriptedSource {
    fn new(broken: &[Uuid]) -> Self {
        Self {
            broken: broken.iter().copied().collect(),
            calls: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl AnswerSource for ScriptedSource {
    async fn fetch_answer(&self, system_id: &Uuid, question: &str, _: &str) -> Option<Value> {
        self.calls
            .lock()
            .unwrap()
            .push((*system_id, question.to_string()));
        if self.broken.contains(system_id) {
            return None;
        }
        Some(json!({
            "answer": format!("answer to {question}"),
            "context": [{"data": "some context"}],
            "probe": {"nodes": [{"step": "MERGE_NEIGHBOURING_CONTEXT", "data": {"Input": [{"Content": "chunk"}]}}]}
        }))
    }
}

/// Scores retrieval with a per-question precision.
struct QuestionPrecision(BTreeMap<String, f64>);

#[async_trait]
impl Scorer for QuestionPrecision {
    fn name(&self) -> &str {
        "question_precision"
    }

    async fn score(&self, record: &EvalRecord) -> Result<Scores, ScoreError> {
        let value = self.0.get(&record.question).copied().unwrap_or(0.0);
        Ok([("context_precision", value)].into_iter().collect())
    }
}

struct Constant(&'static str, f64);

#[async_trait]
impl Scorer for Constant {
    fn name(&self) -> &str {
        self.0
    }

    async fn score(&self, _: &EvalRecord) -> Result<Scores, ScoreError> {
        Ok([(self.0, self.1)].into_iter().collect())
    }
}

fn questions() -> Vec<QuestionRecord> {
    vec![
        QuestionRecord::new("q1", "a1", "finance_bench"),
        QuestionRecord::new("q2", "a2", "finance_bench"),
        QuestionRecord::new("q3", "a3", "finance_bench"),
    ]
}

fn targets(extra: &[(&str, &str, Uuid)]) -> BTreeMap<String, Vec<SystemTarget>> {
    let mut targets = BTreeMap::new();
    targets.insert(
        "finance_bench".to_string(),
        vec![
            SystemTarget::new("finance_bench", FINANCE_V0),
            SystemTarget::new("finance_bench_v1", FINANCE_V1),
        ],
    );
    for (source, experiment, id) in extra {
        targets
            .entry(source.to_string())
            .or_insert_with(Vec::new)
            .push(SystemTarget::new(*experiment, *id));
    }
    targets
}

fn scorers() -> ScorerSet {
    let precision = [("q1", 0.5), ("q2", 0.7), ("q3", 0.9)]
        .into_iter()
        .map(|(q, p)| (q.to_string(), p))
        .collect();
    ScorerSet {
        retrieval: vec![Box::new(QuestionPrecision(precision))],
        answer_baseline: vec![Box::new(Constant("answer_similarity", 0.8))],
        answer_additional: vec![
            Box::new(Constant("rouge_l_f1", 0.3)),
            Box::new(Constant("bleu_score", 0.1)),
        ],
        relevance: vec![Box::new(Constant("answer_relevance", 0.6))],
        ..ScorerSet::default()
    }
}

fn settings(output_root: &std::path::Path, metrics: &MetricsConfig) -> DriverSettings {
    DriverSettings {
        llm_provider_id: "prov-1".to_string(),
        throttle: Duration::ZERO,
        answer_metrics: metrics.answer_metrics,
        drop_columns: metrics
            .drops_columns()
            .then(|| metrics.drop_columns.clone()),
        output_root: output_root.to_path_buf(),
        tag: "DTWZ".to_string(),
        suite: "dtwz".to_string(),
    }
}

fn driver(
    source: Arc<ScriptedSource>,
    targets: BTreeMap<String, Vec<SystemTarget>>,
    settings: DriverSettings,
    metrics: &MetricsConfig,
) -> BenchmarkDriver {
    let retry = RetryConfig {
        max_retries: 0,
        delay_secs: 0,
    };
    BenchmarkDriver::new(
        AnswerFetcher::new(source, &retry),
        ScoringAdapter::new(scorers(), metrics),
        targets,
        settings,
    )
}

#[tokio::test]
async fn test_run_writes_results_and_grouped_stats() {
    let dir = tempfile::tempdir().unwrap();
    let metrics = MetricsConfig::default();
    let source = Arc::new(ScriptedSource::new(&[]));
    let mut driver = driver(
        source.clone(),
        targets(&[]),
        settings(dir.path(), &metrics),
        &metrics,
    );

    let summary = driver.run(&questions()).await.unwrap();
    assert_eq!(driver.phase(), RunPhase::Done);
    assert_eq!(summary.rows, 6);
    assert_eq!(summary.groups, 2);
    assert!(
        summary
            .output_dir
            .file_name()
            .unwrap()
            .to_string_lossy()
            .ends_with("_DTWZ")
    );
    assert_eq!(summary.results_path.file_name().unwrap(), "results_dtwz.csv");
    assert_eq!(summary.stats_path.file_name().unwrap(), "stats_dtwz.csv");

    // Each question is asked of every target, in configured order.
    let calls = source.calls.lock().unwrap().clone();
    assert_eq!(calls.len(), 6);
    assert_eq!(calls[0], (FINANCE_V0, "q1".to_string()));
    assert_eq!(calls[1], (FINANCE_V1, "q1".to_string()));

    let results = std::fs::read_to_string(&summary.results_path).unwrap();
    let mut lines = results.lines();
    assert_eq!(
        lines.next().unwrap(),
        "question,gt_answer,system_answer,source,experiment_name,context_precision"
    );
    assert_eq!(
        lines.next().unwrap(),
        "q1,a1,answer to q1,finance_bench,finance_bench,0.5"
    );

    let stats = std::fs::read_to_string(&summary.stats_path).unwrap();
    let rows: Vec<_> = stats.lines().collect();
    assert_eq!(rows[0], "source,experiment_name,context_precision");
    assert_eq!(rows.len(), 3);
    assert!(rows[1].starts_with("finance_bench,finance_bench,0.7"));
    assert!(rows[2].starts_with("finance_bench,finance_bench_v1,0.7"));
}

#[tokio::test]
async fn test_stats_mean_over_group() {
    let dir = tempfile::tempdir().unwrap();
    let metrics = MetricsConfig::default();
    let mut driver = driver(
        Arc::new(ScriptedSource::new(&[])),
        targets(&[]),
        settings(dir.path(), &metrics),
        &metrics,
    );
    let results = driver.evaluate(&questions()).await.unwrap();
    assert_eq!(results.len(), 6);
    let (first, second) = (&results.records()[0], &results.records()[1]);
    assert_eq!(first.question, second.question);
    assert_eq!(first.ground_truth_answer, second.ground_truth_answer);
    assert_eq!(first.experiment_name, "finance_bench");
    assert_eq!(second.experiment_name, "finance_bench_v1");

    let stats = StatsTable::from_results(&results);
    let mean = stats
        .mean("finance_bench", "finance_bench_v1", "context_precision")
        .unwrap();
    assert!((mean - 0.7).abs() < 1e-9);
}

#[tokio::test]
async fn test_fetch_failure_aborts_before_writing() {
    let dir = tempfile::tempdir().unwrap();
    let output_root = dir.path().join("out");
    let metrics = MetricsConfig::default();
    let mut driver = driver(
        Arc::new(ScriptedSource::new(&[BROKEN])),
        targets(&[("maud", "maud_qna_v1", BROKEN)]),
        settings(&output_root, &metrics),
        &metrics,
    );

    let mut rows = questions();
    rows.push(QuestionRecord::new("q4", "a4", "maud"));
    let err = driver.run(&rows).await.unwrap_err();
    match err {
        BenchError::FetchFailed {
            source_name,
            experiment,
            question,
        } => {
            assert_eq!(source_name, "maud");
            assert_eq!(experiment, "maud_qna_v1");
            assert_eq!(question, "q4");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(!output_root.exists());
}

#[tokio::test]
async fn test_unknown_source_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let metrics = MetricsConfig::default();
    let mut driver = driver(
        Arc::new(ScriptedSource::new(&[])),
        targets(&[]),
        settings(dir.path(), &metrics),
        &metrics,
    );
    let rows = vec![QuestionRecord::new("q", "a", "cuad")];
    let err = driver.run(&rows).await.unwrap_err();
    assert!(matches!(err, BenchError::UnknownSource { ref source_name } if source_name == "cuad"));
}

#[tokio::test]
async fn test_answer_metrics_are_gated() {
    let dir = tempfile::tempdir().unwrap();
    let metrics = MetricsConfig::default();
    let mut driver = driver(
        Arc::new(ScriptedSource::new(&[])),
        targets(&[]),
        settings(dir.path(), &metrics),
        &metrics,
    );
    let results = driver.evaluate(&questions()).await.unwrap();
    assert_eq!(results.metric_columns(), &["context_precision"]);

    let metrics = MetricsConfig {
        answer_metrics: true,
        ..MetricsConfig::default()
    };
    let mut driver = driver_with(&metrics, dir.path());
    let results = driver.evaluate(&questions()).await.unwrap();
    assert_eq!(
        results.metric_columns(),
        &["context_precision", "answer_similarity"]
    );
}

fn driver_with(metrics: &MetricsConfig, output_root: &std::path::Path) -> BenchmarkDriver {
    driver(
        Arc::new(ScriptedSource::new(&[])),
        targets(&[]),
        settings(output_root, metrics),
        metrics,
    )
}

#[tokio::test]
async fn test_columns_dropped_when_answer_and_additional_metrics_on() {
    let dir = tempfile::tempdir().unwrap();
    let metrics = MetricsConfig {
        answer_metrics: true,
        additional_metrics: true,
        ..MetricsConfig::default()
    };
    let mut driver = driver_with(&metrics, dir.path());
    let summary = driver.run(&questions()).await.unwrap();
    let results = std::fs::read_to_string(&summary.results_path).unwrap();
    let header = results.lines().next().unwrap();
    assert_eq!(
        header,
        "question,gt_answer,system_answer,source,experiment_name,\
         context_precision,answer_similarity,bleu_score,answer_relevance"
    );
}

#[tokio::test]
async fn test_additional_without_answer_metrics_keeps_retrieval_only() {
    let dir = tempfile::tempdir().unwrap();
    let metrics = MetricsConfig {
        additional_metrics: true,
        ..MetricsConfig::default()
    };
    let mut driver = driver_with(&metrics, dir.path());
    let results = driver.evaluate(&questions()).await.unwrap();
    assert_eq!(results.metric_columns(), &["context_precision"]);
}

#[tokio::test(start_paused = true)]
async fn test_throttle_after_each_question() {
    let dir = tempfile::tempdir().unwrap();
    let metrics = MetricsConfig::default();
    let mut s = settings(dir.path(), &metrics);
    s.throttle = Duration::from_secs(5);
    let mut driver = driver(
        Arc::new(ScriptedSource::new(&[])),
        targets(&[]),
        s,
        &metrics,
    );
    let start = tokio::time::Instant::now();
    driver.evaluate(&questions()).await.unwrap();
    assert_eq!(start.elapsed(), Duration::from_secs(15));
}
