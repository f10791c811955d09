//! Configuration system for ragbench.
//!
//! Uses `figment` for layered configuration: defaults -> config file -> environment -> CLI args.
//! Configuration is loaded from `ragbench.toml` in the working directory, or from an
//! explicit path. Service credentials are never stored in the file; they are read from
//! the environment variables named in `[service]`.

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::ConfigError;
use crate::types::SystemTarget;

/// Default config file name looked up in the working directory.
pub const CONFIG_FILE_NAME: &str = "ragbench.toml";

/// Top-level configuration for a benchmark run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BenchConfig {
    #[serde(default)]
    pub service: ServiceConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub run: RunConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    /// Benchmark source name -> system variants to evaluate it against.
    #[serde(default)]
    pub targets: BTreeMap<String, Vec<SystemTarget>>,
}

/// Connection settings for the remote Q&A service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Environment variable holding the API token.
    pub token_env: String,
    /// Environment variable holding the service base URL.
    pub service_url_env: String,
    /// Timeout for answer, search and question-detail requests.
    pub answer_timeout_secs: u64,
    /// Timeout for metadata requests (systems, providers, filters, history).
    pub metadata_timeout_secs: u64,
    /// Opaque `properties` query value sent with every answer request.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub properties: Option<String>,
    /// Optional result filter pre-defined in the RAG app.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<String>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            token_env: "DATAWORKZ_API_TOKEN".to_string(),
            service_url_env: "DATAWORKZ_SERVICE_URL".to_string(),
            answer_timeout_secs: 2400,
            metadata_timeout_secs: 300,
            properties: Some("include_probe=true".to_string()),
            filter: None,
        }
    }
}

impl ServiceConfig {
    pub fn answer_timeout(&self) -> Duration {
        Duration::from_secs(self.answer_timeout_secs)
    }

    pub fn metadata_timeout(&self) -> Duration {
        Duration::from_secs(self.metadata_timeout_secs)
    }
}

/// Retry budget for answer fetching.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Retries available to a fetcher over its whole lifetime.
    pub max_retries: u32,
    /// Delay between failed attempts, in seconds.
    pub delay_secs: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 15,
            delay_secs: 10,
        }
    }
}

impl RetryConfig {
    pub fn delay(&self) -> Duration {
        Duration::from_secs(self.delay_secs)
    }
}

/// Settings for a single benchmark run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    /// Question dataset (CSV).
    pub dataset: PathBuf,
    /// LLM provider id configured on the target systems.
    #[serde(default)]
    pub llm_provider_id: String,
    /// Only evaluate the first `limit` questions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
    /// Pause after each question, to stay under the service's rate limits.
    pub throttle_secs: u64,
    /// Directory under which per-run result directories are created.
    pub output_root: PathBuf,
    /// Suffix of the per-run directory name.
    pub tag: String,
    /// Suffix of the result and stats file names.
    pub suite: String,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            dataset: PathBuf::from("data/questions.csv"),
            llm_provider_id: String::new(),
            limit: None,
            throttle_secs: 5,
            output_root: PathBuf::from("benchmark_results"),
            tag: "DTWZ".to_string(),
            suite: "dtwz".to_string(),
        }
    }
}

impl RunConfig {
    pub fn throttle(&self) -> Duration {
        Duration::from_secs(self.throttle_secs)
    }
}

/// Which scorers run, and how result columns are post-processed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Add the LLM-judged context precision to retrieval scores.
    pub llm_eval: bool,
    /// Score the final answer as well as the retrieval.
    pub answer_metrics: bool,
    /// Add correctness, faithfulness and relevance to the answer scores.
    pub additional_metrics: bool,
    /// Columns removed from the results file when both answer and additional metrics are on.
    pub drop_columns: Vec<String>,
    #[serde(default)]
    pub judge: JudgeConfig,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            llm_eval: false,
            answer_metrics: false,
            additional_metrics: false,
            drop_columns: default_drop_columns(),
            judge: JudgeConfig::default(),
        }
    }
}

impl MetricsConfig {
    pub fn drops_columns(&self) -> bool {
        self.answer_metrics && self.additional_metrics
    }
}

fn default_drop_columns() -> Vec<String> {
    [
        "rouge_l_recall",
        "rouge_l_precision",
        "rouge_l_f1",
        "token_overlap_recall",
        "token_overlap_precision",
        "token_overlap_f1",
        "token_overlap_faithfulness",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

/// OpenAI-compatible endpoint used by LLM-judged metrics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JudgeConfig {
    pub base_url: String,
    pub model: String,
    /// Environment variable holding the judge API key.
    pub api_key_env: String,
    pub timeout_secs: u64,
    pub max_tokens: u32,
}

impl Default for JudgeConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.groq.com/openai/v1".to_string(),
            model: "llama-3.3-70b-versatile".to_string(),
            api_key_env: "GROQ_API_KEY".to_string(),
            timeout_secs: 120,
            max_tokens: 4096,
        }
    }
}

impl BenchConfig {
    /// Check the settings a benchmark run cannot do without.
    pub fn validate_for_run(&self) -> Result<(), ConfigError> {
        if self.run.llm_provider_id.trim().is_empty() {
            return Err(ConfigError::Invalid {
                message: "run.llm_provider_id must be set".to_string(),
            });
        }
        if self.targets.is_empty() {
            return Err(ConfigError::Invalid {
                message: "no [targets] configured".to_string(),
            });
        }
        if let Some((source, _)) = self.targets.iter().find(|(_, t)| t.is_empty()) {
            return Err(ConfigError::Invalid {
                message: format!("targets.{source} lists no systems"),
            });
        }
        Ok(())
    }

    /// A starter configuration with one benchmark source wired to two systems.
    pub fn example() -> Self {
        let mut config = Self::default();
        config.run.dataset = PathBuf::from("data/financebench_open_source.csv");
        config.targets.insert(
            "finance_bench".to_string(),
            vec![
                SystemTarget::new(
                    "finance_bench",
                    uuid::uuid!("2b96cc86-b5e7-4432-880f-9b297c119360"),
                ),
                SystemTarget::new(
                    "finance_bench_v1",
                    uuid::uuid!("ace5666e-ec0e-446f-bd5f-6a61e2e1a4ad"),
                ),
            ],
        );
        config
    }
}

/// API token and base URL for the Q&A service.
#[derive(Clone)]
pub struct Credentials {
    token: String,
    service_url: String,
}

impl Credentials {
    /// Build credentials, rejecting blank values.
    pub fn new(
        token: impl Into<String>,
        service_url: impl Into<String>,
    ) -> Result<Self, ConfigError> {
        let token = token.into();
        let service_url = service_url.into();
        if token.trim().is_empty() {
            return Err(ConfigError::Invalid {
                message: "API token is blank".to_string(),
            });
        }
        if service_url.trim().is_empty() {
            return Err(ConfigError::Invalid {
                message: "service URL is blank".to_string(),
            });
        }
        Ok(Self {
            token: token.trim().to_string(),
            service_url: service_url.trim().trim_end_matches('/').to_string(),
        })
    }

    /// Read credentials from the environment variables named in `service`.
    pub fn from_env(service: &ServiceConfig) -> Result<Self, ConfigError> {
        let token = required_env(&service.token_env)?;
        let service_url = required_env(&service.service_url_env)?;
        Self::new(token, service_url)
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn service_url(&self) -> &str {
        &self.service_url
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("token", &"[redacted]")
            .field("service_url", &self.service_url)
            .finish()
    }
}

fn required_env(var: &str) -> Result<String, ConfigError> {
    match std::env::var(var) {
        Ok(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(ConfigError::EnvVarMissing {
            var: var.to_string(),
        }),
    }
}

/// Load configuration with layered merging.
///
/// Order: defaults, then `path` (or `ragbench.toml` in the working directory when
/// `path` is `None`), then `RAGBENCH_` environment variables (`__` separates
/// nested keys, e.g. `RAGBENCH_RUN__LIMIT=1`).
pub fn load_config(path: Option<&Path>) -> Result<BenchConfig, ConfigError> {
    let mut figment = Figment::from(Serialized::defaults(BenchConfig::default()));

    match path {
        Some(path) => {
            if !path.exists() {
                return Err(ConfigError::FileNotFound {
                    path: path.to_path_buf(),
                });
            }
            figment = figment.merge(Toml::file(path));
        }
        None => {
            let local = Path::new(CONFIG_FILE_NAME);
            if local.exists() {
                figment = figment.merge(Toml::file(local));
            }
        }
    }

    figment = figment.merge(Env::prefixed("RAGBENCH_").split("__"));

    figment.extract().map_err(|e| ConfigError::ParseError {
        message: e.to_string(),
    })
}
