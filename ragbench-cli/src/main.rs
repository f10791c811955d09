//! ragbench: benchmark hosted RAG question-answering systems.
//!
//! Runs a question dataset against configured RAG systems and writes per-question
//! scores and grouped statistics. Also exposes the service's metadata endpoints
//! for looking up system and provider ids.

mod commands;
mod menu;

use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};
use uuid::Uuid;

/// Benchmark runner for hosted RAG question-answering systems
#[derive(Parser, Debug)]
#[command(name = "ragbench", version, about, long_about = None)]
struct Cli {
    /// Configuration file path (defaults to ./ragbench.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Increase verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Run the benchmark over the configured dataset
    Run(RunArgs),
    /// List all QnA systems
    Systems,
    /// Show details of one QnA system
    System { system_id: String },
    /// List the LLM providers configured for a system
    Providers { system_id: String },
    /// List the filters pre-defined for a system
    Filters { system_id: String },
    /// Show a system's question history (last six months)
    History { system_id: String },
    /// Show a previously asked question
    Question {
        system_id: String,
        question_id: String,
    },
    /// Retrieve chunks for a query without generating an answer
    Search { system_id: String, query: String },
    /// Ask one question and show the answer and retrieved chunk count
    Ask {
        system_id: Uuid,
        question: String,
        /// LLM provider id (defaults to run.llm_provider_id)
        #[arg(long)]
        provider: Option<String>,
    },
    /// Interactive metadata menu
    Menu,
    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Overrides applied on top of the loaded configuration.
#[derive(clap::Args, Debug, Default)]
struct RunArgs {
    /// Question dataset (CSV)
    #[arg(long)]
    dataset: Option<PathBuf>,

    /// Only evaluate the first N questions
    #[arg(long)]
    limit: Option<usize>,

    /// Add LLM-judged context precision
    #[arg(long)]
    llm_eval: bool,

    /// Score the generated answer as well as retrieval
    #[arg(long)]
    answer_metrics: bool,

    /// Add correctness, faithfulness and relevance metrics
    #[arg(long)]
    additional_metrics: bool,
}

#[derive(clap::Subcommand, Debug)]
enum ConfigAction {
    /// Write a starter configuration file
    Init,
    /// Show the effective configuration
    Show,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 if cli.quiet => "error",
        0 => "info",
        1 => "debug",
        _ => "trace",
    };

    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::new(filter));

    // One debug-level JSON log file per invocation
    let log_dir = directories::ProjectDirs::from("dev", "ragbench", "ragbench")
        .map(|d| d.data_dir().join("logs"))
        .unwrap_or_else(|| PathBuf::from("logs"));
    let _ = std::fs::create_dir_all(&log_dir);
    let log_name = format!("{}.log", chrono::Local::now().format("%Y-%m-%d_%H:%M:%S"));
    let file_appender = tracing_appender::rolling::never(&log_dir, log_name);
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);
    let json_layer = tracing_subscriber::fmt::layer()
        .json()
        .with_writer(non_blocking)
        .with_filter(EnvFilter::new("debug"));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    commands::handle_command(cli.command, cli.config.as_deref()).await
}
