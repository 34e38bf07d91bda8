//! Bot creation and the long-polling update feed

use reqwest::ClientBuilder;
use std::sync::Arc;
use teloxide::dispatching::Dispatcher;
use teloxide::prelude::*;
use teloxide::update_listeners::Polling;
use tokio_util::sync::CancellationToken;

use crate::core::config;
use crate::telegram::engine::ConversationEngine;
use crate::telegram::types::IncomingUpdate;

/// Creates a Bot instance with a client timeout above the long-polling timeout
///
/// # Returns
/// * `Ok(Bot)` - Successfully created bot instance
/// * `Err(anyhow::Error)` - Failed to build the HTTP client
pub fn create_bot(token: &str) -> anyhow::Result<Bot> {
    let client = ClientBuilder::new().timeout(config::network::timeout()).build()?;
    Ok(Bot::with_client(token, client))
}

/// Configured username, or the one Telegram reports for this token
pub async fn resolve_bot_username(bot: &Bot) -> Option<String> {
    if let Some(username) = config::BOT_USERNAME.clone() {
        return Some(username);
    }
    match bot.get_me().await {
        Ok(me) => me.user.username.clone(),
        Err(e) => {
            log::warn!("Failed to fetch bot username: {}", e);
            None
        }
    }
}

/// Feed updates from Telegram into the engine until `shutdown` is cancelled.
///
/// teloxide's default distribution handles one chat's updates sequentially,
/// and `dispatch` returns as soon as the update is queued on its session, so
/// per-session order is preserved while slow conversations don't block the feed.
pub async fn run_polling(bot: Bot, engine: Arc<ConversationEngine>, shutdown: CancellationToken) {
    let bot_username = engine.context().bot_username.clone();

    let handler = dptree::entry().endpoint(move |update: Update, engine: Arc<ConversationEngine>| {
        let bot_username = bot_username.clone();
        async move {
            match IncomingUpdate::from_update(&update, bot_username.as_deref()) {
                Some(incoming) => engine.dispatch(incoming).await,
                None => log::debug!("Skipping update {}: not a user message", update.id.0),
            }
            respond(())
        }
    });

    let mut dispatcher = Dispatcher::builder(bot.clone(), handler)
        .dependencies(dptree::deps![engine])
        .build();

    let token = dispatcher.shutdown_token();
    tokio::spawn(async move {
        shutdown.cancelled().await;
        match token.shutdown() {
            Ok(done) => done.await,
            Err(e) => log::warn!("Dispatcher was not running at shutdown: {}", e),
        }
    });

    // Updates that arrived while the bot was down are not replayed
    let listener = Polling::builder(bot).drop_pending_updates().build();

    log::info!("Starting long polling");
    dispatcher
        .dispatch_with_listener(
            listener,
            LoggingErrorHandler::with_custom_text("An error from the update listener"),
        )
        .await;
    log::info!("Long polling stopped");
}
