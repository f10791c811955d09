//! HTTP client for the Q&A service API.
//!
//! Every endpoint is a blocking-style `GET` with a static `SSWS` authorization
//! header. Answer and search calls collapse every transport failure into `None`
//! after logging its class; metadata calls surface [`ApiError::Unavailable`].

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, error};
use uuid::Uuid;

use crate::config::{Credentials, ServiceConfig};
use crate::error::ApiError;

const API_PREFIX: &str = "/api/qna/v1/systems";

/// Source of raw answer responses, abstracted so the retry loop can run against
/// the live service or an in-memory double.
#[async_trait]
pub trait AnswerSource: Send + Sync {
    /// Ask `question` of the RAG system `system_id`. `None` means no usable response.
    async fn fetch_answer(
        &self,
        system_id: &Uuid,
        question: &str,
        llm_provider_id: &str,
    ) -> Option<Value>;
}

/// Client for the Q&A service.
pub struct QnaClient {
    client: Client,
    credentials: Credentials,
    answer_timeout: Duration,
    metadata_timeout: Duration,
    properties: Option<String>,
    filter: Option<String>,
}

impl QnaClient {
    pub fn new(service: &ServiceConfig, credentials: Credentials) -> Self {
        Self {
            client: Client::new(),
            credentials,
            answer_timeout: service.answer_timeout(),
            metadata_timeout: service.metadata_timeout(),
            properties: service.properties.clone(),
            filter: service.filter.clone(),
        }
    }

    pub fn service_url(&self) -> &str {
        self.credentials.service_url()
    }

    fn systems_url(&self) -> String {
        format!("{}{}", self.credentials.service_url(), API_PREFIX)
    }

    fn system_url(&self, system_id: &str) -> String {
        format!("{}/{}", self.systems_url(), system_id)
    }

    /// Build the answer URL. The question is percent-encoded; the provider id,
    /// filter and properties are passed through as given.
    pub fn answer_url(&self, system_id: &Uuid, question: &str, llm_provider_id: &str) -> String {
        let mut url = format!(
            "{}/answer?questionText={}&llmProviderId={}",
            self.system_url(&system_id.to_string()),
            urlencoding::encode(question),
            llm_provider_id
        );
        if let Some(filter) = &self.filter {
            url.push_str("&filter=");
            url.push_str(filter);
        }
        if let Some(properties) = &self.properties {
            url.push_str("&properties=");
            url.push_str(properties);
        }
        url
    }

    pub fn search_url(&self, system_id: &str, query: &str) -> String {
        format!(
            "{}/search?query={}",
            self.system_url(system_id),
            urlencoding::encode(query)
        )
    }

    /// Issue one authenticated GET and decode the JSON body.
    async fn get_json(&self, url: &str, timeout: Duration) -> Result<Value, ApiError> {
        debug!(url = %url, timeout_secs = timeout.as_secs(), "GET");
        let response = self
            .client
            .get(url)
            .header("Content-Type", "application/json")
            .header("Authorization", format!("SSWS {}", self.credentials.token()))
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| classify(e, timeout))?;

        let response = response
            .error_for_status()
            .map_err(|e| classify(e, timeout))?;

        response.json::<Value>().await.map_err(|e| {
            if e.is_timeout() {
                classify(e, timeout)
            } else {
                ApiError::Decode {
                    message: e.to_string(),
                }
            }
        })
    }

    /// GET that logs the failure class and yields `None` on any error.
    async fn get_or_none(&self, url: &str, timeout: Duration) -> Option<Value> {
        match self.get_json(url, timeout).await {
            Ok(value) => Some(value),
            Err(e) => {
                log_failure(&e);
                None
            }
        }
    }

    /// GET for metadata endpoints: failures become `Unavailable { what }`.
    async fn get_required(
        &self,
        url: &str,
        timeout: Duration,
        what: &str,
    ) -> Result<Value, ApiError> {
        self.get_or_none(url, timeout)
            .await
            .ok_or_else(|| ApiError::Unavailable {
                what: what.to_string(),
            })
    }

    /// All QnA systems (RAG apps) configured on the service.
    pub async fn list_systems(&self) -> Result<Value, ApiError> {
        self.get_required(&self.systems_url(), self.metadata_timeout, "QNA system details")
            .await
    }

    pub async fn system_details(&self, system_id: &str) -> Result<Value, ApiError> {
        self.get_required(
            &self.system_url(system_id),
            self.metadata_timeout,
            "QNA system details",
        )
        .await
    }

    pub async fn llm_providers(&self, system_id: &str) -> Result<Value, ApiError> {
        let url = format!("{}/llm-providers", self.system_url(system_id));
        self.get_required(&url, self.metadata_timeout, "LLM provider details")
            .await
    }

    pub async fn filters(&self, system_id: &str) -> Result<Value, ApiError> {
        let url = format!("{}/filters", self.system_url(system_id));
        self.get_required(&url, self.metadata_timeout, "filter details")
            .await
    }

    /// Question history of the last six months.
    pub async fn question_history(&self, system_id: &str) -> Result<Value, ApiError> {
        let url = format!("{}/questionshistory", self.system_url(system_id));
        self.get_required(&url, self.metadata_timeout, "question history details")
            .await
    }

    pub async fn question_details(
        &self,
        system_id: &str,
        question_id: &str,
    ) -> Result<Value, ApiError> {
        let url = format!("{}/questions/{}", self.system_url(system_id), question_id);
        self.get_required(&url, self.answer_timeout, "previous question details")
            .await
    }

    /// Retrieved chunks for `query`, without generating an answer.
    pub async fn search(&self, system_id: &str, query: &str) -> Option<Value> {
        let response = self
            .get_or_none(&self.search_url(system_id, query), self.answer_timeout)
            .await;
        if response.is_none() {
            error!("Retrieval system unavailable");
        }
        response
    }
}

#[async_trait]
impl AnswerSource for QnaClient {
    async fn fetch_answer(
        &self,
        system_id: &Uuid,
        question: &str,
        llm_provider_id: &str,
    ) -> Option<Value> {
        let url = self.answer_url(system_id, question, llm_provider_id);
        let response = self.get_or_none(&url, self.answer_timeout).await;
        if response.is_none() {
            error!(system_id = %system_id, "Answer system unavailable");
        }
        response
    }
}

fn classify(e: reqwest::Error, timeout: Duration) -> ApiError {
    if e.is_timeout() {
        ApiError::Timeout {
            timeout_secs: timeout.as_secs(),
        }
    } else if let Some(status) = e.status() {
        ApiError::HttpStatus {
            status: status.as_u16(),
            url: e.url().map(|u| u.to_string()).unwrap_or_default(),
        }
    } else if e.is_connect() {
        ApiError::Connection {
            message: e.to_string(),
        }
    } else {
        ApiError::Request {
            message: e.to_string(),
        }
    }
}

fn log_failure(e: &ApiError) {
    match e {
        ApiError::HttpStatus { .. } => error!(error = %e, "HTTP error occurred"),
        ApiError::Connection { .. } => error!(error = %e, "Connection error occurred"),
        ApiError::Timeout { .. } => error!(error = %e, "Timeout error occurred"),
        _ => error!(error = %e, "Request error occurred"),
    }
}
