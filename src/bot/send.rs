use std::time::Duration;

use async_trait::async_trait;
use teloxide::prelude::Requester;
use teloxide::types::ChatId;
use teloxide::RequestError;
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::bot::Bot;
use crate::pipeline::{Transport, TransportError};

/// Transport over the Telegram bot with bounded retry on transient
/// network failures. API-level errors fail immediately; flood-wait hints
/// are honored for the wait they ask for.
pub struct RetryingSender {
    bot: Bot,
    max_retries: u32,
    base_delay: Duration,
}

impl RetryingSender {
    pub fn new(bot: Bot) -> Self {
        Self { bot, max_retries: 3, base_delay: Duration::from_secs(1) }
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    fn retryable(error: &RequestError) -> bool {
        matches!(
            error,
            RequestError::Network(_) | RequestError::Io(_) | RequestError::RetryAfter(_)
        )
    }
}

#[async_trait]
impl Transport for RetryingSender {
    async fn send_text(&self, chat: ChatId, text: &str) -> Result<(), TransportError> {
        let mut attempts = 0;
        loop {
            match self.bot.send_message(chat, text).await {
                Ok(_) => {
                    debug!("message sent to {chat} after {} attempt(s)", attempts + 1);
                    return Ok(());
                }
                Err(error) => {
                    attempts += 1;
                    if !Self::retryable(&error) || attempts > self.max_retries {
                        return Err(TransportError(error.to_string()));
                    }
                    let delay = match &error {
                        RequestError::RetryAfter(after) => *after,
                        _ => self.base_delay * attempts,
                    };
                    warn!(
                        "send to {chat} failed ({error}), retrying in {}s ({attempts}/{})",
                        delay.as_secs(),
                        self.max_retries
                    );
                    sleep(delay).await;
                }
            }
        }
    }
}
