use std::time::Duration;

use anyhow::{bail, Result};
use duration_str::deserialize_duration;
use serde::Deserialize;

fn default_log_level() -> String {
    "info".to_string()
}

fn default_api_base() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_window() -> Duration {
    Duration::from_secs(60)
}

fn default_max_messages() -> usize {
    10
}

fn default_max_len() -> usize {
    4096
}

fn default_bind_addr() -> String {
    "0.0.0.0:8443".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Log filter, forwarded to RUST_LOG
    #[serde(default = "default_log_level")]
    pub log_level: String,
    pub telegram: Telegram,
    #[serde(default)]
    pub webhook: Option<Webhook>,
    pub llm: Llm,
    #[serde(default)]
    pub limits: Limits,
    #[serde(default)]
    pub persona: Persona,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Polling,
    Webhook,
}

impl Default for Mode {
    fn default() -> Self {
        Mode::Polling
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Telegram {
    /// Bot token
    pub token: String,
    /// Bot username, used to strip @mentions from commands
    pub bot_username: String,
    /// Update ingestion mode
    #[serde(default)]
    pub mode: Mode,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Webhook {
    /// Publicly reachable URL Telegram will POST updates to
    pub public_url: String,
    /// Local listen address
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Llm {
    /// OpenAI-compatible API root
    #[serde(default = "default_api_base")]
    pub api_base: String,
    /// API key
    pub api_key: String,
    /// Model name
    pub model: String,
    /// Upper bound on one completion request
    #[serde(default = "default_request_timeout", deserialize_with = "deserialize_duration")]
    pub request_timeout: Duration,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Limits {
    /// Sliding rate-limit window
    #[serde(default = "default_window", deserialize_with = "deserialize_duration")]
    pub window: Duration,
    /// Messages allowed per identity per window
    #[serde(default = "default_max_messages")]
    pub max_messages: usize,
    /// Maximum outbound fragment length, in characters
    #[serde(default = "default_max_len")]
    pub max_len: usize,
    /// Hard-truncate a single sentence that exceeds max_len
    #[serde(default)]
    pub truncate_oversized: bool,
    /// Prefix fragments after the first with "(continued N)"
    #[serde(default)]
    pub label_continuations: bool,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            window: default_window(),
            max_messages: default_max_messages(),
            max_len: default_max_len(),
            truncate_oversized: false,
            label_continuations: false,
        }
    }
}

/// Persona and every user-facing string. Revisions of this bot differ only
/// here, so all of it is injected configuration rather than forked source.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Persona {
    pub system_prompt: String,
    pub welcome: String,
    pub slow_down: String,
    pub quota_apology: String,
    pub unauthorized_apology: String,
    pub transient_apology: String,
    pub generic_apology: String,
}

impl Default for Persona {
    fn default() -> Self {
        Self {
            system_prompt: "You are a helpful assistant chatting over Telegram. \
                            Keep answers concise."
                .to_string(),
            welcome: "Welcome! Send me any message and I'll answer. Use /help to see \
                      available commands."
                .to_string(),
            slow_down: "You're sending messages too quickly. Please wait a moment before \
                        sending another one."
                .to_string(),
            quota_apology: "I've hit my usage quota for now. Please try again later."
                .to_string(),
            unauthorized_apology: "I can't reach my language model right now because my \
                                   credentials were rejected. The operator has been notified."
                .to_string(),
            transient_apology: "Something went wrong talking to my language model. Please \
                                try again in a moment."
                .to_string(),
            generic_apology: "Oops, something went wrong while processing your message. \
                              Please try again."
                .to_string(),
        }
    }
}

impl Config {
    pub fn new(path: &str) -> Result<Self> {
        let s = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&s)?;
        config.validate()?;
        Ok(config)
    }

    /// Startup validation. A missing credential is fatal here, never a
    /// runtime error.
    pub fn validate(&self) -> Result<()> {
        if self.telegram.token.trim().is_empty() {
            bail!("telegram.token is required");
        }
        if self.llm.api_key.trim().is_empty() {
            bail!("llm.api_key is required");
        }
        if self.telegram.mode == Mode::Webhook && self.webhook.is_none() {
            bail!("[webhook] section is required when telegram.mode = \"webhook\"");
        }
        Ok(())
    }
}
