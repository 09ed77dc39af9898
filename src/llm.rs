use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use crate::config::Llm;

/// Failure classes of the remote generation call. The pipeline branches on
/// these, never on error message text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    QuotaExceeded,
    Unauthorized,
    Transient,
}

#[derive(Debug, thiserror::Error)]
pub enum GenerateError {
    #[error("generation quota exceeded")]
    QuotaExceeded,
    #[error("generation credentials rejected")]
    Unauthorized,
    #[error("transient generation failure: {0}")]
    Transient(String),
}

impl GenerateError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            GenerateError::QuotaExceeded => ErrorKind::QuotaExceeded,
            GenerateError::Unauthorized => ErrorKind::Unauthorized,
            GenerateError::Transient(_) => ErrorKind::Transient,
        }
    }
}

/// The remote generation collaborator: one prompt in, one reply out.
#[async_trait]
pub trait Generate: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String, GenerateError>;
}

/// Chat-completion client for any OpenAI-compatible endpoint.
#[derive(Clone)]
pub struct LlmClient {
    http: Client,
    api_base: String,
    api_key: String,
    model: String,
    system_prompt: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

impl LlmClient {
    pub fn new(config: &Llm, system_prompt: &str) -> Result<Self> {
        // The request timeout is the only bound on how long one update can
        // pin the worker, so it is not optional.
        let http = Client::builder()
            .timeout(config.request_timeout)
            .connect_timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            http,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            system_prompt: system_prompt.to_string(),
        })
    }
}

#[async_trait]
impl Generate for LlmClient {
    async fn generate(&self, prompt: &str) -> Result<String, GenerateError> {
        let body = json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": self.system_prompt },
                { "role": "user", "content": prompt },
            ],
        });
        let response = self
            .http
            .post(format!("{}/chat/completions", self.api_base))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| GenerateError::Transient(e.to_string()))?;

        match response.status() {
            StatusCode::TOO_MANY_REQUESTS => return Err(GenerateError::QuotaExceeded),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                return Err(GenerateError::Unauthorized)
            }
            status if !status.is_success() => {
                return Err(GenerateError::Transient(format!("status {status}")))
            }
            _ => {}
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| GenerateError::Transient(e.to_string()))?;
        let reply = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| GenerateError::Transient("empty completion".to_string()))?;
        debug!("completion of {} chars received", reply.chars().count());
        Ok(reply)
    }
}
