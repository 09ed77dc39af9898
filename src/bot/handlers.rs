use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use teloxide::prelude::*;
use teloxide::types::{ChatId, Update, UpdateKind};
use teloxide::utils::command::BotCommands;
use tracing::{error, info};

use crate::bot::{Bot, Command};
use crate::config::Persona;
use crate::pipeline::{DeliveryPipeline, Outcome};
use crate::reply_to;

/// Routes one inbound update to a command handler or the delivery
/// pipeline. This is the outermost dispatch boundary: nothing that happens
/// here may take the update worker down.
pub struct UpdateHandler {
    bot: Bot,
    pipeline: Arc<DeliveryPipeline>,
    persona: Persona,
    bot_username: String,
}

impl UpdateHandler {
    pub fn new(
        bot: Bot,
        pipeline: Arc<DeliveryPipeline>,
        persona: Persona,
        bot_username: String,
    ) -> Self {
        Self { bot, pipeline, persona, bot_username }
    }

    /// Handle one update, swallowing failures. Unexpected errors are
    /// logged and answered with the generic apology so one bad update
    /// never affects other chats.
    pub async fn dispatch(&self, update: Update) {
        let chat = chat_of(&update);
        if let Err(e) = self.handle(update).await {
            error!("update handling failed: {e:#}");
            if let Some(chat) = chat {
                let _ = self.bot.send_message(chat, self.persona.generic_apology.as_str()).await;
            }
        }
    }

    async fn handle(&self, update: Update) -> Result<()> {
        let UpdateKind::Message(msg) = update.kind else {
            return Ok(());
        };
        let Some(text) = msg.text() else {
            return Ok(());
        };
        let Some(user) = msg.from() else {
            return Ok(());
        };

        if text.starts_with('/') {
            match Command::parse(text, &self.bot_username) {
                Ok(command) => return self.handle_command(&msg, command).await,
                Err(_) => {
                    reply_to!(self.bot, msg, Command::descriptions().to_string()).await?;
                    return Ok(());
                }
            }
        }

        let outcome =
            self.pipeline.handle(user.id.0, msg.chat.id, text, Instant::now()).await;
        info!("user {}: {:?}", user.id, outcome);
        if let Outcome::PartialDelivery { delivered, total } = outcome {
            error!(
                "partial delivery to chat {}: {delivered}/{total} fragments sent",
                msg.chat.id
            );
        }
        Ok(())
    }

    async fn handle_command(&self, msg: &Message, command: Command) -> Result<()> {
        let user = msg.from().map(|u| u.id.0).unwrap_or_default();
        match command {
            Command::Start => {
                info!("user {user}: /start");
                reply_to!(self.bot, msg, self.persona.welcome.as_str()).await?;
            }
            Command::Help => {
                info!("user {user}: /help");
                reply_to!(self.bot, msg, Command::descriptions().to_string()).await?;
            }
            Command::Echo(text) => {
                info!("user {user}: /echo");
                let reply = if text.trim().is_empty() {
                    "Please provide a message to echo. Usage: /echo <your message>"
                        .to_string()
                } else {
                    format!("You said: {text}")
                };
                reply_to!(self.bot, msg, reply).await?;
            }
        }
        Ok(())
    }
}

fn chat_of(update: &Update) -> Option<ChatId> {
    match &update.kind {
        UpdateKind::Message(msg) => Some(msg.chat.id),
        _ => None,
    }
}
