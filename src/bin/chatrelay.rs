use std::env;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use chatrelay::bot::{build_bot, RetryingSender, UpdateHandler};
use chatrelay::bridge::Runtime;
use chatrelay::chunker::{MessageChunker, OversizePolicy};
use chatrelay::config::{Config, Mode};
use chatrelay::limiter::RateLimiter;
use chatrelay::llm::LlmClient;
use chatrelay::pipeline::DeliveryPipeline;
use clap::Parser;
use tracing::info;

#[derive(Parser)]
#[command(name = "chatrelay", about = "Telegram front end for a hosted language model")]
struct Args {
    /// Path to the TOML configuration file
    #[arg(short, long, default_value = "./config.toml")]
    config: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = Config::new(&args.config)
        .with_context(|| format!("failed to load config from {}", args.config))?;

    env::set_var("RUST_LOG", &config.log_level);
    tracing_subscriber::FmtSubscriber::builder()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init()
        .unwrap();

    let bot = build_bot(&config.telegram.token);
    let limiter = Arc::new(RateLimiter::new(config.limits.max_messages, config.limits.window));
    let generator = Arc::new(LlmClient::new(&config.llm, &config.persona.system_prompt)?);
    let transport = Arc::new(RetryingSender::new(bot.clone()));
    let oversize = if config.limits.truncate_oversized {
        OversizePolicy::Truncate
    } else {
        OversizePolicy::Emit
    };
    let pipeline = Arc::new(DeliveryPipeline::new(
        limiter.clone(),
        generator,
        transport,
        MessageChunker::new(config.limits.max_len, oversize),
        config.persona.clone(),
        config.limits.label_continuations,
    ));
    let handler = Arc::new(UpdateHandler::new(
        bot.clone(),
        pipeline,
        config.persona.clone(),
        config.telegram.bot_username.clone(),
    ));

    // Periodic limiter maintenance so idle identities don't pile up.
    {
        let limiter = limiter.clone();
        let every = config.limits.window.max(Duration::from_secs(60));
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(every);
            loop {
                tick.tick().await;
                limiter.purge(Instant::now());
            }
        });
    }

    let mut runtime = Runtime::new(bot, handler);
    runtime.init()?;
    match config.telegram.mode {
        Mode::Polling => {
            info!("starting in polling mode");
            runtime.begin_polling().await?;
        }
        Mode::Webhook => {
            let webhook = config.webhook.clone().context("missing [webhook] section")?;
            info!("starting in webhook mode at {}", webhook.public_url);
            runtime.serve_webhook(&webhook).await?;
        }
    }
    info!("chatrelay stopped");
    Ok(())
}
