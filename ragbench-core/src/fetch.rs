//! Answer fetching with a bounded retry budget.
//!
//! The fetcher asks the Q&A service for an answer with the probe included and
//! pulls the merged-context chunk list out of the probe tree. A missing
//! response or a response without the chunk list counts as a failed attempt.
//! The retry budget belongs to the fetcher and is shared by every question it
//! serves over a run.

use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::client::AnswerSource;
use crate::config::RetryConfig;
use crate::probe;
use crate::types::FetchResult;

/// Retry loop around an [`AnswerSource`].
pub struct AnswerFetcher {
    source: Arc<dyn AnswerSource>,
    retries_remaining: u32,
    delay: Duration,
}

impl AnswerFetcher {
    pub fn new(source: Arc<dyn AnswerSource>, retry: &RetryConfig) -> Self {
        Self {
            source,
            retries_remaining: retry.max_retries,
            delay: retry.delay(),
        }
    }

    pub fn retries_remaining(&self) -> u32 {
        self.retries_remaining
    }

    /// Fetch an answer for `question` and extract its retrieval chunks.
    ///
    /// Makes at most `1 + retries_remaining` attempts, sleeping the configured
    /// delay between them. Returns `None` once the budget is spent.
    pub async fn get_chunks(
        &mut self,
        system_id: &Uuid,
        llm_provider_id: &str,
        question: &str,
    ) -> Option<FetchResult> {
        loop {
            let attempt = self
                .source
                .fetch_answer(system_id, question, llm_provider_id)
                .await
                .and_then(|response| parse_response(&response));

            if let Some(result) = attempt {
                return Some(result);
            }

            if self.retries_remaining == 0 {
                error!(
                    system_id = %system_id,
                    "Failed to get a response after exhausting the retry budget"
                );
                return None;
            }

            debug!(
                retries_remaining = self.retries_remaining,
                delay_secs = self.delay.as_secs(),
                "Retrying..."
            );
            tokio::time::sleep(self.delay).await;
            self.retries_remaining -= 1;
        }
    }
}

/// Split a raw answer response into answer text, context, and probe chunks.
fn parse_response(response: &Value) -> Option<FetchResult> {
    let answer = match response.get("answer") {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    };
    let context = response.get("context").cloned().unwrap_or(Value::Null);

    let Some(probe) = response.get("probe") else {
        warn!("Answer response carries no probe");
        return None;
    };
    let Some(chunks) = probe::merged_context_chunks(probe) else {
        warn!(marker = probe::MERGE_MARKER, "Probe has no merged context node");
        return None;
    };

    Some(FetchResult {
        answer,
        context,
        chunks,
    })
}
