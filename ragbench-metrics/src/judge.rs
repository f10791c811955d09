//! LLM-judged retrieval metrics over an OpenAI-compatible chat endpoint.
//!
//! Works with Groq, OpenAI, vLLM, Ollama and anything else that serves
//! `POST {base_url}/chat/completions`. Requests are deterministic
//! (temperature 0, fixed seed) so reruns judge the same chunks the same way.

use async_trait::async_trait;
use ragbench_core::config::JudgeConfig;
use ragbench_core::error::ScoreError;
use ragbench_core::scoring::{EvalRecord, Scorer};
use ragbench_core::types::Scores;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{Value, json};
use std::time::Duration;
use tracing::{debug, info};

use crate::error::JudgeError;
use crate::retrieval::average_precision;

const DEFAULT_MAX_RETRIES: usize = 3;

const CONTEXT_PRECISION_PROMPT: &str = "You verify retrieval quality. Given a question, \
a reference answer and one retrieved context passage, decide whether the passage was \
useful in arriving at the reference answer. Respond only with a JSON object of the form \
{\"reason\": \"<one sentence>\", \"verdict\": 1} where verdict is 1 if the passage was \
useful and 0 if it was not.";

/// Chat client for the judge model.
#[derive(Debug, Clone)]
pub struct JudgeClient {
    client: Client,
    base_url: String,
    model: String,
    api_key: String,
    max_tokens: u32,
    max_retries: usize,
}

impl JudgeClient {
    pub fn new(
        base_url: impl Into<String>,
        model: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            api_key: api_key.into(),
            max_tokens: JudgeConfig::default().max_tokens,
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }

    /// Build a client from config, reading the API key from the configured
    /// environment variable.
    pub fn from_config(config: &JudgeConfig) -> Result<Self, JudgeError> {
        let api_key = std::env::var(&config.api_key_env)
            .ok()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| JudgeError::MissingApiKey {
                var: config.api_key_env.clone(),
            })?;
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| JudgeError::ApiRequest {
                message: format!("Failed to build HTTP client: {}", e),
            })?;
        Ok(Self {
            client,
            max_tokens: config.max_tokens,
            ..Self::new(&config.base_url, &config.model, api_key)
        })
    }

    pub fn with_max_retries(mut self, max_retries: usize) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Ask the judge and return the assistant message text, retrying rate limits.
    pub async fn complete(&self, system: &str, user: &str) -> Result<String, JudgeError> {
        let mut attempt = 0;
        loop {
            match self.complete_once(system, user).await {
                Ok(content) => return Ok(content),
                Err(e) if e.is_retryable() && attempt < self.max_retries => {
                    let backoff_secs = std::cmp::min(1u64 << attempt, 32);
                    let wait = match &e {
                        JudgeError::RateLimited { retry_after_secs } => {
                            std::cmp::max(*retry_after_secs, backoff_secs)
                        }
                        _ => backoff_secs,
                    };
                    info!(
                        attempt = attempt + 1,
                        max_retries = self.max_retries,
                        backoff_secs = wait,
                        error = %e,
                        "Retrying judge request"
                    );
                    tokio::time::sleep(Duration::from_secs(wait)).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn complete_once(&self, system: &str, user: &str) -> Result<String, JudgeError> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": system},
                {"role": "user", "content": user},
            ],
            "temperature": 0.0,
            "seed": 0,
            "max_tokens": self.max_tokens,
            "response_format": {"type": "json_object"},
            "stream": false,
        });

        debug!(url = %url, model = %self.model, "Sending judge request");

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| JudgeError::ApiRequest {
                message: format!("Request failed: {}", e),
            })?;

        let status = response.status();
        let retry_after = response
            .headers()
            .get("retry-after")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<f64>().ok());
        let response_body = response.text().await.map_err(|e| JudgeError::ApiRequest {
            message: format!("Failed to read response body: {}", e),
        })?;

        if !status.is_success() {
            return Err(map_http_error(status, &response_body, retry_after));
        }

        let json: Value =
            serde_json::from_str(&response_body).map_err(|e| JudgeError::ResponseParse {
                message: format!("Invalid JSON: {}", e),
            })?;
        json["choices"][0]["message"]["content"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| JudgeError::ResponseParse {
                message: "No message content in response".to_string(),
            })
    }
}

const DEFAULT_RETRY_AFTER_SECS: u64 = 5;
/// Upper bound on a server-supplied rate-limit wait.
const MAX_RETRY_AFTER_SECS: f64 = 60.0;

fn map_http_error(status: reqwest::StatusCode, body: &str, retry_after: Option<f64>) -> JudgeError {
    match status.as_u16() {
        401 | 403 => {
            debug!(body = %body, "Judge authentication failed");
            JudgeError::AuthFailed
        }
        429 => {
            let retry_secs = retry_after
                .or_else(|| {
                    let message = serde_json::from_str::<Value>(body).ok()?;
                    let message = message.get("error")?.get("message")?.as_str()?.to_string();
                    // "... Please try again in 7.5s."
                    message
                        .split("in ")
                        .last()?
                        .trim_end_matches(['.', 's'])
                        .parse::<f64>()
                        .ok()
                })
                .filter(|secs| secs.is_finite())
                .map_or(DEFAULT_RETRY_AFTER_SECS, |secs| {
                    secs.clamp(0.0, MAX_RETRY_AFTER_SECS).ceil() as u64
                });
            JudgeError::RateLimited {
                retry_after_secs: retry_secs,
            }
        }
        status if status >= 500 => JudgeError::ApiRequest {
            message: format!("Server error ({}): {}", status, body),
        },
        _ => JudgeError::ApiRequest {
            message: format!("HTTP {}: {}", status, body),
        },
    }
}

#[derive(Debug, Deserialize)]
struct Verdict {
    verdict: Value,
    #[serde(default)]
    reason: String,
}

/// Read a 0/1 verdict from the judge's reply. Tolerates surrounding prose
/// and code fences around the JSON object.
pub fn parse_verdict(content: &str) -> Result<bool, JudgeError> {
    let start = content.find('{');
    let end = content.rfind('}');
    let json = match (start, end) {
        (Some(s), Some(e)) if s < e => &content[s..=e],
        _ => {
            return Err(JudgeError::ResponseParse {
                message: format!("No JSON object in judge reply: {content}"),
            });
        }
    };
    let parsed: Verdict = serde_json::from_str(json).map_err(|e| JudgeError::ResponseParse {
        message: format!("Invalid verdict: {e}"),
    })?;
    debug!(reason = %parsed.reason, "Judge verdict");

    match &parsed.verdict {
        Value::Bool(b) => Ok(*b),
        Value::Number(n) => Ok(n.as_f64().is_some_and(|v| v >= 0.5)),
        Value::String(s) => match s.trim().to_lowercase().as_str() {
            "1" | "yes" | "true" => Ok(true),
            "0" | "no" | "false" => Ok(false),
            other => Err(JudgeError::ResponseParse {
                message: format!("Unrecognised verdict: {other}"),
            }),
        },
        other => Err(JudgeError::ResponseParse {
            message: format!("Unrecognised verdict: {other}"),
        }),
    }
}

/// Context precision judged per chunk by an LLM.
///
/// Emits `context_precision` (share of useful chunks) and
/// `average_precision` (rank-aware mean of precision@k over useful chunks).
pub struct LlmContextPrecision {
    judge: JudgeClient,
}

impl LlmContextPrecision {
    pub fn new(judge: JudgeClient) -> Self {
        Self { judge }
    }

    async fn judge_chunk(
        &self,
        question: &str,
        reference: &str,
        chunk: &str,
    ) -> Result<bool, JudgeError> {
        let prompt = format!(
            "Question: {question}\n\nReference answer: {reference}\n\nContext passage: {chunk}"
        );
        let reply = self.judge.complete(CONTEXT_PRECISION_PROMPT, &prompt).await?;
        parse_verdict(&reply)
    }
}

#[async_trait]
impl Scorer for LlmContextPrecision {
    fn name(&self) -> &str {
        "llm_context_precision"
    }

    async fn score(&self, record: &EvalRecord) -> Result<Scores, ScoreError> {
        let reference = record
            .ground_truth_context
            .as_deref()
            .or(record.ground_truth_answer.as_deref())
            .ok_or_else(|| ScoreError::InvalidRecord {
                scorer: self.name().to_string(),
                reason: "no reference context".to_string(),
            })?;

        let mut verdicts = Vec::with_capacity(record.retrieved_context.len());
        for chunk in &record.retrieved_context {
            let verdict = self
                .judge_chunk(&record.question, reference, chunk)
                .await
                .map_err(|e| e.into_score_error(self.name()))?;
            verdicts.push(verdict);
        }
        debug!(
            model = self.judge.model(),
            chunks = verdicts.len(),
            useful = verdicts.iter().filter(|v| **v).count(),
            "Judged retrieved chunks"
        );

        let precision = if verdicts.is_empty() {
            0.0
        } else {
            verdicts.iter().filter(|v| **v).count() as f64 / verdicts.len() as f64
        };
        Ok([
            ("context_precision", precision),
            ("average_precision", average_precision(&verdicts)),
        ]
        .into_iter()
        .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_verdict_variants() {
        assert!(parse_verdict(r#"{"reason": "states revenue", "verdict": 1}"#).unwrap());
        assert!(!parse_verdict(r#"{"verdict": 0}"#).unwrap());
        assert!(parse_verdict("```json\n{\"verdict\": \"yes\"}\n```").unwrap());
        assert!(parse_verdict(r#"{"verdict": true}"#).unwrap());
        assert!(parse_verdict("no json here").is_err());
        assert!(parse_verdict(r#"{"verdict": "maybe"}"#).is_err());
    }

    #[test]
    fn test_map_http_error() {
        assert!(matches!(
            map_http_error(reqwest::StatusCode::UNAUTHORIZED, "", None),
            JudgeError::AuthFailed
        ));
        let body = r#"{"error": {"message": "Rate limit reached. Please try again in 7.5s."}}"#;
        assert!(matches!(
            map_http_error(reqwest::StatusCode::TOO_MANY_REQUESTS, body, None),
            JudgeError::RateLimited { retry_after_secs: 8 }
        ));
        assert!(matches!(
            map_http_error(reqwest::StatusCode::TOO_MANY_REQUESTS, "", Some(2.0)),
            JudgeError::RateLimited { retry_after_secs: 2 }
        ));
        assert!(matches!(
            map_http_error(reqwest::StatusCode::TOO_MANY_REQUESTS, "", None),
            JudgeError::RateLimited { retry_after_secs: 5 }
        ));
        assert!(matches!(
            map_http_error(reqwest::StatusCode::BAD_GATEWAY, "upstream", None),
            JudgeError::ApiRequest { .. }
        ));
    }

    #[test]
    fn test_rate_limit_wait_is_bounded() {
        let limited = |body: &str, header: Option<f64>| {
            match map_http_error(reqwest::StatusCode::TOO_MANY_REQUESTS, body, header) {
                JudgeError::RateLimited { retry_after_secs } => retry_after_secs,
                other => panic!("expected rate limit, got {other:?}"),
            }
        };
        assert_eq!(limited("", Some(f64::INFINITY)), 5);
        assert_eq!(limited("", Some(f64::NAN)), 5);
        assert_eq!(limited("", Some(1e20)), 60);
        assert_eq!(limited("", Some(-3.0)), 0);
        let body = r#"{"error": {"message": "Please try again in 1e30s."}}"#;
        assert_eq!(limited(body, None), 60);
        let body = r#"{"error": {"message": "Please try again in infs."}}"#;
        assert_eq!(limited(body, None), 5);
    }

    #[test]
    fn test_from_config_requires_key() {
        let config = JudgeConfig {
            api_key_env: "RAGBENCH_TEST_JUDGE_KEY_THAT_IS_NEVER_SET".into(),
            ..JudgeConfig::default()
        };
        assert!(matches!(
            JudgeClient::from_config(&config),
            Err(JudgeError::MissingApiKey { .. })
        ));
    }

    #[test]
    fn test_base_url_trailing_slash() {
        let client = JudgeClient::new("http://localhost:8000/v1/", "m", "k");
        assert_eq!(client.base_url, "http://localhost:8000/v1");
    }
}
