use std::sync::Arc;

use anyhow::{Context, Result};
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use teloxide::payloads::{GetUpdatesSetters, SetWebhookSetters};
use teloxide::prelude::Requester;
use teloxide::requests::Request;
use teloxide::types::Update;
use teloxide::utils::command::BotCommands;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::bot::{Bot, Command, UpdateHandler};
use crate::config::Webhook;
use crate::server;

const UPDATE_QUEUE_DEPTH: usize = 64;
const LONG_POLL_SECS: u32 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuntimeState {
    Uninitialized,
    Initialized,
    Running,
    Stopped,
}

#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error("invalid runtime state: expected {expected:?}, was {actual:?}")]
    InvalidState { expected: RuntimeState, actual: RuntimeState },
}

/// Single-owner execution context for the bot.
///
/// Exactly one worker task drives the pipeline; both front ends (the
/// long-poll loop and the webhook server) only hand updates to it through
/// a bounded queue. That keeps the transport client on one logical owner
/// and preserves per-identity arrival order without any loop re-entry
/// tricks on the HTTP side.
pub struct Runtime {
    bot: Bot,
    handler: Arc<UpdateHandler>,
    state: RuntimeState,
    queue: Option<mpsc::Sender<Update>>,
    worker: Option<JoinHandle<()>>,
}

impl Runtime {
    pub fn new(bot: Bot, handler: Arc<UpdateHandler>) -> Self {
        Self { bot, handler, state: RuntimeState::Uninitialized, queue: None, worker: None }
    }

    pub fn state(&self) -> RuntimeState {
        self.state
    }

    fn expect_state(&self, expected: RuntimeState) -> Result<(), BridgeError> {
        if self.state != expected {
            return Err(BridgeError::InvalidState { expected, actual: self.state });
        }
        Ok(())
    }

    /// Spawn the owning worker and its queue. No network traffic yet.
    pub fn init(&mut self) -> Result<(), BridgeError> {
        self.expect_state(RuntimeState::Uninitialized)?;
        let (tx, rx) = mpsc::channel(UPDATE_QUEUE_DEPTH);
        self.worker = Some(tokio::spawn(worker_loop(self.handler.clone(), rx)));
        self.queue = Some(tx);
        self.state = RuntimeState::Initialized;
        Ok(())
    }

    /// Pull mode: long-poll for update batches and feed them to the
    /// worker, until interrupted. Pending updates are dropped at startup.
    pub async fn begin_polling(&mut self) -> Result<()> {
        self.expect_state(RuntimeState::Initialized)?;
        let queue = self.queue.clone().expect("queue exists after init");
        self.state = RuntimeState::Running;
        self.register_commands().await;

        let mut offset: i32 = 0;
        if let Ok(stale) = self.bot.get_updates().offset(-1).send().await {
            if let Some(last) = stale.last() {
                offset = last.id + 1;
            }
        }
        info!("polling for updates");

        loop {
            let batch = tokio::select! {
                _ = tokio::signal::ctrl_c() => break,
                batch = self.bot.get_updates().offset(offset).timeout(LONG_POLL_SECS).send() => batch,
            };
            match batch {
                Ok(updates) => {
                    for update in updates {
                        offset = update.id + 1;
                        if queue.send(update).await.is_err() {
                            error!("update worker is gone, stopping poll loop");
                            drop(queue);
                            self.stop().await;
                            return Ok(());
                        }
                    }
                }
                Err(e) => {
                    warn!("get_updates failed: {e}, backing off");
                    tokio::time::sleep(std::time::Duration::from_secs(5)).await;
                }
            }
        }
        info!("poll loop interrupted, shutting down");
        drop(queue);
        self.stop().await;
        Ok(())
    }

    /// Push mode: register the webhook and serve the HTTP surface until
    /// interrupted, then deregister. Registration failures are fatal.
    pub async fn serve_webhook(&mut self, webhook: &Webhook) -> Result<()> {
        self.expect_state(RuntimeState::Initialized)?;
        let queue = self.queue.clone().expect("queue exists after init");

        let url = webhook
            .public_url
            .parse()
            .with_context(|| format!("invalid webhook.public_url: {}", webhook.public_url))?;
        self.bot
            .set_webhook(url)
            .drop_pending_updates(true)
            .send()
            .await
            .context("failed to register webhook with Telegram")?;
        self.state = RuntimeState::Running;
        self.register_commands().await;

        let listener = tokio::net::TcpListener::bind(&webhook.bind_addr)
            .await
            .with_context(|| format!("failed to bind {}", webhook.bind_addr))?;
        info!("webhook server listening on {}", webhook.bind_addr);
        axum::serve(listener, server::router(queue))
            .with_graceful_shutdown(async {
                let _ = tokio::signal::ctrl_c().await;
            })
            .await
            .context("webhook server failed")?;

        info!("webhook server interrupted, deregistering webhook");
        let result = self
            .bot
            .delete_webhook()
            .send()
            .await
            .context("failed to deregister webhook");
        self.stop().await;
        result?;
        Ok(())
    }

    async fn register_commands(&self) {
        if let Err(e) = self.bot.set_my_commands(Command::bot_commands()).await {
            warn!("failed to register command list: {e}");
        }
    }

    /// Drop the queue and let the worker drain whatever is in flight.
    async fn stop(&mut self) {
        self.queue = None;
        if let Some(worker) = self.worker.take() {
            let _ = worker.await;
        }
        self.state = RuntimeState::Stopped;
    }
}

async fn worker_loop(handler: Arc<UpdateHandler>, mut rx: mpsc::Receiver<Update>) {
    while let Some(update) = rx.recv().await {
        // A panic in one handler must not take the worker down.
        if AssertUnwindSafe(handler.dispatch(update)).catch_unwind().await.is_err() {
            error!("update handler panicked");
        }
    }
    info!("update worker drained, exiting");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use teloxide::types::ChatId;

    use crate::bot::build_bot;
    use crate::chunker::{MessageChunker, OversizePolicy};
    use crate::config::Persona;
    use crate::limiter::RateLimiter;
    use crate::llm::{Generate, GenerateError};
    use crate::pipeline::{DeliveryPipeline, Transport, TransportError};

    struct NoopGenerate;

    #[async_trait]
    impl Generate for NoopGenerate {
        async fn generate(&self, _prompt: &str) -> Result<String, GenerateError> {
            Ok(String::new())
        }
    }

    struct NoopTransport;

    #[async_trait]
    impl Transport for NoopTransport {
        async fn send_text(&self, _chat: ChatId, _text: &str) -> Result<(), TransportError> {
            Ok(())
        }
    }

    fn runtime() -> Runtime {
        let bot = build_bot("123:test-token");
        let pipeline = Arc::new(DeliveryPipeline::new(
            Arc::new(RateLimiter::new(10, Duration::from_secs(60))),
            Arc::new(NoopGenerate),
            Arc::new(NoopTransport),
            MessageChunker::new(4096, OversizePolicy::Emit),
            Persona::default(),
            false,
        ));
        let handler = Arc::new(UpdateHandler::new(
            bot.clone(),
            pipeline,
            Persona::default(),
            "relay_bot".to_string(),
        ));
        Runtime::new(bot, handler)
    }

    #[tokio::test]
    async fn polling_requires_init_first() {
        let mut runtime = runtime();
        assert_eq!(runtime.state(), RuntimeState::Uninitialized);
        let err = runtime.begin_polling().await.unwrap_err();
        assert!(err.to_string().contains("invalid runtime state"));
    }

    #[tokio::test]
    async fn init_is_not_reentrant() {
        let mut runtime = runtime();
        runtime.init().unwrap();
        assert_eq!(runtime.state(), RuntimeState::Initialized);
        assert!(matches!(
            runtime.init(),
            Err(BridgeError::InvalidState { actual: RuntimeState::Initialized, .. })
        ));
    }

    #[tokio::test]
    async fn webhook_serving_requires_init_first() {
        let mut runtime = runtime();
        let webhook = Webhook {
            public_url: "https://bot.example.com/webhook".to_string(),
            bind_addr: "127.0.0.1:0".to_string(),
        };
        assert!(runtime.serve_webhook(&webhook).await.is_err());
        assert_eq!(runtime.state(), RuntimeState::Uninitialized);
    }
}
