use anyhow::{anyhow, Result};
use dotenvy::dotenv;
use std::sync::Arc;
use teloxide::Bot;
use tokio::signal;
use tokio_util::sync::CancellationToken;

use subchat_sentry::cli::{Cli, Commands};
use subchat_sentry::core::web_server::{start_web_server, WebState};
use subchat_sentry::core::{config, init_logger, log_startup_configuration};
use subchat_sentry::minecraft::{MojangClient, OverseerClient};
use subchat_sentry::perms::{PermsConfig, PermsEngine};
use subchat_sentry::storage::create_pool;
use subchat_sentry::telegram::{
    create_bot, resolve_bot_username, run_polling, BotContext, ConversationEngine, EngineLimits, TelegramApi,
};

/// Main entry point for the bot
///
/// Parses CLI arguments and dispatches to the selected subcommand.
///
/// # Errors
/// Returns an error if initialization fails (logging, database, bot creation).
#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenv();
    init_logger(&config::LOG_FILE_PATH)?;

    match Cli::parse_args().command {
        Some(Commands::Migrate) => {
            create_pool(&config::DATABASE_PATH)?;
            log::info!("Database {} is up to date", *config::DATABASE_PATH);
            Ok(())
        }
        Some(Commands::InitCommands) => {
            let (_bot, engine) = build_engine().await?;
            engine.publish_default_commands().await?;
            log::info!("Default command menu published");
            Ok(())
        }
        Some(Commands::Run) | None => run_bot().await,
    }
}

async fn build_engine() -> Result<(Bot, Arc<ConversationEngine>)> {
    let token = config::BOT_TOKEN
        .clone()
        .ok_or_else(|| anyhow!("BOT_TOKEN (or TELOXIDE_TOKEN) is not set"))?;
    let bot = create_bot(&token)?;

    let pool = Arc::new(create_pool(&config::DATABASE_PATH)?);
    let ctx = BotContext {
        api: Arc::new(TelegramApi::new(bot.clone(), config::network::telegram_timeout())),
        perms: Arc::new(PermsEngine::new(pool, PermsConfig::from_env())),
        lookup: Arc::new(MojangClient::new(config::mojang::API_URL.as_str())?),
        passwords: Arc::new(OverseerClient::new(config::overseer::URL.as_str())?),
        bot_username: resolve_bot_username(&bot).await,
    };

    Ok((bot, ConversationEngine::new(ctx, EngineLimits::from_env())))
}

async fn run_bot() -> Result<()> {
    log_startup_configuration();
    let (bot, engine) = build_engine().await?;

    if let Err(e) = engine.publish_default_commands().await {
        log::warn!("Failed to publish default commands: {}", e);
    }

    let shutdown = CancellationToken::new();

    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        if let Err(e) = signal::ctrl_c().await {
            log::error!("Failed to listen for Ctrl+C: {}", e);
            return;
        }
        log::info!("Received Ctrl+C, shutting down");
        signal_token.cancel();
    });

    let web = tokio::spawn(start_web_server(
        *config::web::PORT,
        WebState::new(Arc::clone(&engine)),
        shutdown.clone(),
    ));

    run_polling(bot, Arc::clone(&engine), shutdown.clone()).await;

    shutdown.cancel();
    engine.shutdown().await;

    match web.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => log::error!("Web server failed: {}", e),
        Err(e) => log::error!("Web server task panicked: {}", e),
    }

    log::info!("Bye");
    Ok(())
}
