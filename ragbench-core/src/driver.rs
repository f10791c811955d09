//! Benchmark driver.
//!
//! Runs every question against each system target configured for its source,
//! scores the fetched answers, and writes a results file and a grouped-stats
//! file into a fresh timestamped run directory.
//!
//! A failed fetch aborts the whole run before anything is written.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, error, info};

use crate::config::BenchConfig;
use crate::dataset;
use crate::error::{BenchError, Result};
use crate::fetch::AnswerFetcher;
use crate::results::{ResultSet, ScoreRecord, StatsTable};
use crate::scoring::ScoringAdapter;
use crate::types::{QuestionRecord, SystemTarget};

/// Phases of a benchmark run, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    Init,
    LoadData,
    Evaluate,
    WriteResults,
    Aggregate,
    WriteStats,
    Done,
}

impl fmt::Display for RunPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RunPhase::Init => "init",
            RunPhase::LoadData => "load_data",
            RunPhase::Evaluate => "evaluate",
            RunPhase::WriteResults => "write_results",
            RunPhase::Aggregate => "aggregate",
            RunPhase::WriteStats => "write_stats",
            RunPhase::Done => "done",
        };
        f.write_str(name)
    }
}

/// Run settings taken from [`BenchConfig`].
#[derive(Debug, Clone)]
pub struct DriverSettings {
    pub llm_provider_id: String,
    pub throttle: Duration,
    pub answer_metrics: bool,
    /// Columns dropped from the results before writing, when enabled.
    pub drop_columns: Option<Vec<String>>,
    pub output_root: PathBuf,
    pub tag: String,
    pub suite: String,
}

impl DriverSettings {
    pub fn from_config(config: &BenchConfig) -> Self {
        Self {
            llm_provider_id: config.run.llm_provider_id.clone(),
            throttle: config.run.throttle(),
            answer_metrics: config.metrics.answer_metrics,
            drop_columns: config
                .metrics
                .drops_columns()
                .then(|| config.metrics.drop_columns.clone()),
            output_root: config.run.output_root.clone(),
            tag: config.run.tag.clone(),
            suite: config.run.suite.clone(),
        }
    }
}

/// Where a finished run put its output.
#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    pub output_dir: PathBuf,
    pub results_path: PathBuf,
    pub stats_path: PathBuf,
    pub rows: usize,
    pub groups: usize,
}

/// Drives questions through fetch, scoring, and aggregation.
pub struct BenchmarkDriver {
    fetcher: AnswerFetcher,
    scoring: ScoringAdapter,
    targets: BTreeMap<String, Vec<SystemTarget>>,
    settings: DriverSettings,
    phase: RunPhase,
}

impl BenchmarkDriver {
    pub fn new(
        fetcher: AnswerFetcher,
        scoring: ScoringAdapter,
        targets: BTreeMap<String, Vec<SystemTarget>>,
        settings: DriverSettings,
    ) -> Self {
        Self {
            fetcher,
            scoring,
            targets,
            settings,
            phase: RunPhase::Init,
        }
    }

    pub fn phase(&self) -> RunPhase {
        self.phase
    }

    fn enter(&mut self, phase: RunPhase) {
        debug!(from = %self.phase, to = %phase, "Run phase");
        self.phase = phase;
    }

    /// Load the dataset and run the full benchmark over it.
    pub async fn run_dataset(&mut self, path: &Path, limit: Option<usize>) -> Result<RunSummary> {
        self.enter(RunPhase::LoadData);
        let questions = dataset::load_questions(path, limit)?;
        self.run(&questions).await
    }

    /// Run the benchmark over already loaded questions.
    pub async fn run(&mut self, questions: &[QuestionRecord]) -> Result<RunSummary> {
        let results = self.evaluate(questions).await?;
        self.write_outputs(results)
    }

    /// Fetch and score every (question, target) pair.
    ///
    /// Returns an error on the first pair whose answer cannot be fetched; no
    /// partial results are kept.
    pub async fn evaluate(&mut self, questions: &[QuestionRecord]) -> Result<ResultSet> {
        self.enter(RunPhase::Evaluate);
        let mut results = ResultSet::new();

        for (index, row) in questions.iter().enumerate() {
            info!(index, source = %row.source, "Processing question");
            let targets = self
                .targets
                .get(&row.source)
                .cloned()
                .ok_or_else(|| BenchError::UnknownSource {
                    source_name: row.source.clone(),
                })?;

            for target in &targets {
                let record = self.evaluate_target(row, target).await?;
                results.push(record);
            }

            if !self.settings.throttle.is_zero() {
                tokio::time::sleep(self.settings.throttle).await;
            }
        }

        Ok(results)
    }

    async fn evaluate_target(
        &mut self,
        row: &QuestionRecord,
        target: &SystemTarget,
    ) -> Result<ScoreRecord> {
        debug!(
            source = %row.source,
            experiment = %target.experiment_name,
            question = %row.question,
            "Running experiment"
        );

        let fetch = self
            .fetcher
            .get_chunks(
                &target.system_id,
                &self.settings.llm_provider_id,
                &row.question,
            )
            .await;
        let Some(fetch) = fetch else {
            error!(
                source = %row.source,
                experiment = %target.experiment_name,
                "Could not fetch answer data"
            );
            return Err(BenchError::FetchFailed {
                source_name: row.source.clone(),
                experiment: target.experiment_name.clone(),
                question: row.question.clone(),
            });
        };

        debug!(chunks = fetch.chunks.len(), "Computing metrics");
        let mut scores = self
            .scoring
            .score_retrieval(&row.question, row.retrieval_reference(), &fetch.chunks)
            .await?;
        if self.settings.answer_metrics {
            let answer_scores = self
                .scoring
                .score_system(&row.question, &row.ground_truth_answer, &fetch)
                .await?;
            scores.merge(answer_scores);
        }

        Ok(ScoreRecord::new(
            row.question.clone(),
            row.ground_truth_answer.clone(),
            fetch.answer,
            row.source.clone(),
            target.experiment_name.clone(),
            scores,
        ))
    }

    /// Write the results and stats files into a new run directory.
    pub fn write_outputs(&mut self, mut results: ResultSet) -> Result<RunSummary> {
        self.enter(RunPhase::WriteResults);
        let run_name = chrono::Local::now().format("%Y-%m-%d_%H:%M:%S");
        let output_dir = self
            .settings
            .output_root
            .join(format!("{}_{}", run_name, self.settings.tag));
        std::fs::create_dir_all(&output_dir)?;

        if let Some(columns) = &self.settings.drop_columns {
            results.drop_columns(columns);
        }
        let results_path = output_dir.join(format!("results_{}.csv", self.settings.suite));
        results.write_csv(&results_path)?;
        info!(path = %results_path.display(), rows = results.len(), "Wrote results");

        self.enter(RunPhase::Aggregate);
        let stats = StatsTable::from_results(&results);

        self.enter(RunPhase::WriteStats);
        let stats_path = output_dir.join(format!("stats_{}.csv", self.settings.suite));
        stats.write_csv(&stats_path)?;
        info!(path = %stats_path.display(), groups = stats.groups().len(), "Wrote stats");

        self.enter(RunPhase::Done);
        Ok(RunSummary {
            output_dir,
            results_path,
            stats_path,
            rows: results.len(),
            groups: stats.groups().len(),
        })
    }
}
