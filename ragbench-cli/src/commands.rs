//! Subcommand handlers.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use ragbench_core::config::{BenchConfig, CONFIG_FILE_NAME, Credentials};
use ragbench_core::{
    AnswerFetcher, BenchmarkDriver, DriverSettings, QnaClient, ScoringAdapter, load_config,
};
use serde_json::Value;
use tracing::info;

use crate::{Commands, ConfigAction, RunArgs};

/// Handle a CLI subcommand.
pub async fn handle_command(command: Commands, config_path: Option<&Path>) -> anyhow::Result<()> {
    match command {
        Commands::Run(args) => handle_run(args, config_path).await,
        Commands::Systems => print_json(connect(config_path)?.list_systems().await?),
        Commands::System { system_id } => {
            print_json(connect(config_path)?.system_details(&system_id).await?)
        }
        Commands::Providers { system_id } => {
            print_json(connect(config_path)?.llm_providers(&system_id).await?)
        }
        Commands::Filters { system_id } => {
            print_json(connect(config_path)?.filters(&system_id).await?)
        }
        Commands::History { system_id } => {
            print_json(connect(config_path)?.question_history(&system_id).await?)
        }
        Commands::Question {
            system_id,
            question_id,
        } => print_json(
            connect(config_path)?
                .question_details(&system_id, &question_id)
                .await?,
        ),
        Commands::Search { system_id, query } => {
            match connect(config_path)?.search(&system_id, &query).await {
                Some(value) => print_json(value),
                None => anyhow::bail!("No search results for system {}", system_id),
            }
        }
        Commands::Ask {
            system_id,
            question,
            provider,
        } => handle_ask(system_id, &question, provider, config_path).await,
        Commands::Menu => {
            let client = connect(config_path)?;
            crate::menu::run(&client).await
        }
        Commands::Config { action } => handle_config(action, config_path),
    }
}

fn load(config_path: Option<&Path>) -> anyhow::Result<BenchConfig> {
    load_config(config_path).map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))
}

fn connect(config_path: Option<&Path>) -> anyhow::Result<QnaClient> {
    let config = load(config_path)?;
    let credentials = Credentials::from_env(&config.service)?;
    Ok(QnaClient::new(&config.service, credentials))
}

fn print_json(value: Value) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(&value)?);
    Ok(())
}

impl RunArgs {
    fn apply(self, config: &mut BenchConfig) {
        if let Some(dataset) = self.dataset {
            config.run.dataset = dataset;
        }
        if self.limit.is_some() {
            config.run.limit = self.limit;
        }
        config.metrics.llm_eval |= self.llm_eval;
        config.metrics.answer_metrics |= self.answer_metrics;
        config.metrics.additional_metrics |= self.additional_metrics;
    }
}

async fn handle_run(args: RunArgs, config_path: Option<&Path>) -> anyhow::Result<()> {
    let mut config = load(config_path)?;
    args.apply(&mut config);
    config.validate_for_run()?;

    let credentials = Credentials::from_env(&config.service)?;
    let client = Arc::new(QnaClient::new(&config.service, credentials));
    let scorers = ragbench_metrics::default_scorer_set(&config.metrics)?;

    info!(
        dataset = %config.run.dataset.display(),
        sources = config.targets.len(),
        llm_eval = config.metrics.llm_eval,
        answer_metrics = config.metrics.answer_metrics,
        additional_metrics = config.metrics.additional_metrics,
        "Starting benchmark run"
    );

    let mut driver = BenchmarkDriver::new(
        AnswerFetcher::new(client, &config.retry),
        ScoringAdapter::new(scorers, &config.metrics),
        config.targets.clone(),
        DriverSettings::from_config(&config),
    );
    let summary = driver
        .run_dataset(&config.run.dataset, config.run.limit)
        .await?;

    println!(
        "Scored {} rows in {} groups.\n  results: {}\n  stats:   {}",
        summary.rows,
        summary.groups,
        summary.results_path.display(),
        summary.stats_path.display()
    );
    Ok(())
}

async fn handle_ask(
    system_id: uuid::Uuid,
    question: &str,
    provider: Option<String>,
    config_path: Option<&Path>,
) -> anyhow::Result<()> {
    let config = load(config_path)?;
    let provider = provider.unwrap_or_else(|| config.run.llm_provider_id.clone());
    if provider.trim().is_empty() {
        anyhow::bail!("No LLM provider id: pass --provider or set run.llm_provider_id");
    }

    let credentials = Credentials::from_env(&config.service)?;
    let client = Arc::new(QnaClient::new(&config.service, credentials));
    let mut fetcher = AnswerFetcher::new(client, &config.retry);
    let Some(result) = fetcher.get_chunks(&system_id, &provider, question).await else {
        anyhow::bail!("Could not fetch answer data from system {}", system_id);
    };

    println!("{}\n\n({} retrieved chunks)", result.answer, result.chunks.len());
    Ok(())
}

fn config_file(config_path: Option<&Path>) -> PathBuf {
    config_path
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from(CONFIG_FILE_NAME))
}

fn handle_config(action: ConfigAction, config_path: Option<&Path>) -> anyhow::Result<()> {
    match action {
        ConfigAction::Init => {
            let path = config_file(config_path);
            if path.exists() {
                println!("Configuration file already exists at: {}", path.display());
                return Ok(());
            }
            if let Some(parent) = path.parent()
                && !parent.as_os_str().is_empty()
            {
                std::fs::create_dir_all(parent)?;
            }
            let toml_str = toml::to_string_pretty(&BenchConfig::example())?;
            std::fs::write(&path, &toml_str)?;
            println!("Created starter configuration at: {}", path.display());
            Ok(())
        }
        ConfigAction::Show => {
            let config = load(config_path)?;
            println!("{}", toml::to_string_pretty(&config)?);
            Ok(())
        }
    }
}
