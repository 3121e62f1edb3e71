mod bot;
mod config;
mod error;
mod platform;
mod relay;
mod traq;
mod yesno;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::bot::YesNoBot;
use crate::config::Config;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,yesnobot=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("config.toml"));

    info!("Loading configuration from: {}", config_path.display());
    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;

    info!("Configuration loaded successfully");
    info!("  traQ API: {}", config.traq.api_base_url);
    info!("  yesno API: {}", config.yesno.api_url);
    info!("  Channel source: {}", config.pipeline.channel_source);
    info!("  Image handling: {}", config.pipeline.image_handling);
    info!("  Parse error policy: {:?}", config.pipeline.on_parse_error);

    let config = Arc::new(config);
    let bot = Arc::new(YesNoBot::new(config.clone())?);

    let cancel = CancellationToken::new();
    let shutdown = cancel.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Shutdown requested");
                shutdown.cancel();
            }
            Err(e) => warn!("Failed to listen for Ctrl-C: {}", e),
        }
    });

    info!("Bot is starting...");
    platform::traq::run(config, bot, cancel).await?;

    Ok(())
}
