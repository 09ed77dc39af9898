use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use teloxide::types::ChatId;
use tracing::{info, warn};

use crate::chunker::MessageChunker;
use crate::config::Persona;
use crate::limiter::RateLimiter;
use crate::llm::{ErrorKind, Generate};

#[derive(Debug, thiserror::Error)]
#[error("transport send failed: {0}")]
pub struct TransportError(pub String);

/// The transport collaborator: deliver one text message to one chat.
/// Retry policy, if any, lives behind this trait, never in the pipeline.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send_text(&self, chat: ChatId, text: &str) -> Result<(), TransportError>;
}

/// What one inbound message amounted to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// All fragments delivered, in order.
    Delivered { fragments: usize },
    /// Rejected by the rate limiter; no remote call was made.
    RateLimited,
    /// The generation call failed; an apology was sent instead.
    RemoteFailure(ErrorKind),
    /// Send failed partway through; `delivered` of `total` fragments made it.
    PartialDelivery { delivered: usize, total: usize },
}

/// Orchestrates admit → generate → chunk → send for one inbound message.
///
/// Per invocation: exactly one admission check, at most one remote call,
/// 1..N transport sends. Fragments are sent strictly sequentially so the
/// recipient reads them in order. No retries at this layer.
pub struct DeliveryPipeline {
    limiter: Arc<RateLimiter>,
    generator: Arc<dyn Generate>,
    transport: Arc<dyn Transport>,
    chunker: MessageChunker,
    persona: Persona,
    label_continuations: bool,
}

impl DeliveryPipeline {
    pub fn new(
        limiter: Arc<RateLimiter>,
        generator: Arc<dyn Generate>,
        transport: Arc<dyn Transport>,
        chunker: MessageChunker,
        persona: Persona,
        label_continuations: bool,
    ) -> Self {
        Self { limiter, generator, transport, chunker, persona, label_continuations }
    }

    pub async fn handle(
        &self,
        identity: u64,
        chat: ChatId,
        text: &str,
        now: Instant,
    ) -> Outcome {
        if !self.limiter.admit(identity, now) {
            // Expected backpressure, not a failure.
            info!("rate limit hit for user {identity}");
            self.notify(chat, &self.persona.slow_down).await;
            return Outcome::RateLimited;
        }

        let reply = match self.generator.generate(text.trim()).await {
            Ok(reply) => reply,
            Err(e) => {
                let kind = e.kind();
                warn!("generation failed for user {identity}: {e}");
                let apology = match kind {
                    ErrorKind::QuotaExceeded => &self.persona.quota_apology,
                    ErrorKind::Unauthorized => &self.persona.unauthorized_apology,
                    ErrorKind::Transient => &self.persona.transient_apology,
                };
                self.notify(chat, apology).await;
                return Outcome::RemoteFailure(kind);
            }
        };

        let fragments = self.chunker.split(&reply);
        let total = fragments.len().max(1);
        if fragments.is_empty() {
            // An empty completion still deserves an answer.
            self.notify(chat, &self.persona.generic_apology).await;
            return Outcome::Delivered { fragments: 1 };
        }

        for (i, fragment) in fragments.iter().enumerate() {
            let rendered = if self.label_continuations && i > 0 {
                format!("(continued {}) {fragment}", i + 1)
            } else {
                fragment.clone()
            };
            if let Err(e) = self.transport.send_text(chat, &rendered).await {
                warn!("delivery to chat {chat} stopped at fragment {}/{total}: {e}", i + 1);
                return Outcome::PartialDelivery { delivered: i, total };
            }
        }
        Outcome::Delivered { fragments: total }
    }

    /// Best-effort notice; a failed notice is logged, never escalated.
    async fn notify(&self, chat: ChatId, text: &str) {
        if let Err(e) = self.transport.send_text(chat, text).await {
            warn!("failed to send notice to chat {chat}: {e}");
        }
    }
}
