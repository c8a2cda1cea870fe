//! Optional LLM summarization of retrieved excerpts.
//!
//! The API key comes from the environment; when it is absent the caller falls
//! back to embedding the raw excerpts, so a missing key never breaks an
//! annotation request.

use std::time::Duration;

use serde_json::{json, Value};
use thiserror::Error;

const HTTP_TIMEOUT: Duration = Duration::from_secs(30);
const MAX_COMPLETION_TOKENS: u32 = 400;

#[derive(Debug, Clone, Error)]
pub enum SummarizeError {
    #[error("no API key configured")]
    MissingApiKey,
    #[error("nothing to summarize")]
    EmptyInput,
    #[error("summarization request failed: {0}")]
    Http(String),
    #[error("malformed completion response")]
    MalformedResponse,
}

pub struct Summarizer {
    agent: ureq::Agent,
    endpoint: String,
    model: String,
    api_key: Option<String>,
}

impl Summarizer {
    pub fn new(endpoint: String, model: String, api_key: Option<String>) -> Self {
        let agent = ureq::AgentBuilder::new().timeout(HTTP_TIMEOUT).build();
        Self {
            agent,
            endpoint,
            model,
            api_key,
        }
    }

    /// Condenses `excerpts` into a short analyst-oriented summary focused on
    /// `topic`.
    pub fn summarize(&self, excerpts: &str, topic: &str) -> Result<String, SummarizeError> {
        if excerpts.trim().is_empty() {
            return Err(SummarizeError::EmptyInput);
        }
        let Some(api_key) = self.api_key.as_deref() else {
            return Err(SummarizeError::MissingApiKey);
        };

        let body = json!({
            "model": self.model,
            "max_tokens": MAX_COMPLETION_TOKENS,
            "messages": [
                {
                    "role": "system",
                    "content": "You summarize filing excerpts for a hedge fund analyst. \
                                Be concise and factual; cite figures exactly as written."
                },
                {
                    "role": "user",
                    "content": format!("Topic: {topic}\n\nExcerpts:\n{excerpts}")
                }
            ]
        });

        let response: Value = self
            .agent
            .post(&self.endpoint)
            .set("Authorization", &format!("Bearer {api_key}"))
            .send_json(body)
            .map_err(|e| SummarizeError::Http(e.to_string()))?
            .into_json()
            .map_err(|e| SummarizeError::Http(e.to_string()))?;

        parse_completion(&response).ok_or(SummarizeError::MalformedResponse)
    }
}

fn parse_completion(response: &Value) -> Option<String> {
    let content = response
        .get("choices")?
        .get(0)?
        .get("message")?
        .get("content")?
        .as_str()?
        .trim();
    if content.is_empty() {
        None
    } else {
        Some(content.to_string())
    }
}
