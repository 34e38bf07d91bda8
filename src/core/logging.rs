//! Logging initialization (console + file)

use anyhow::Result;
use simplelog::*;
use std::fs::File;

use crate::core::config;

/// Initialize logger for both console and file output
///
/// # Arguments
/// * `log_file_path` - Path to the log file
///
/// # Returns
/// * `Ok(())` - Logger initialized successfully
/// * `Err(anyhow::Error)` - Failed to initialize logger
pub fn init_logger(log_file_path: &str) -> Result<()> {
    let log_file = File::create(log_file_path).map_err(|e| anyhow::anyhow!("Failed to create log file: {}", e))?;

    // HTTP client internals are noisy
    let config = ConfigBuilder::new()
        .add_filter_ignore_str("hyper")
        .add_filter_ignore_str("reqwest")
        .build();

    CombinedLogger::init(vec![
        TermLogger::new(LevelFilter::Info, config.clone(), TerminalMode::Mixed, ColorChoice::Auto),
        WriteLogger::new(LevelFilter::Info, config, log_file),
    ])
    .map_err(|e| anyhow::anyhow!("Failed to initialize logger: {}", e))?;

    Ok(())
}

/// Logs the effective configuration at startup
pub fn log_startup_configuration() {
    log::info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    log::info!("Database: {}", *config::DATABASE_PATH);
    log::info!("Overseer: {}", *config::overseer::URL);
    log::info!("Mojang API: {}", *config::mojang::API_URL);
    match config::BOT_USERNAME.as_deref() {
        Some(username) => log::info!("Bot username: @{}", username),
        None => log::warn!("BOT_USERNAME is not set, commands addressed to other bots will not be filtered"),
    }
    if config::perms::ADMIN_TAGS.is_empty() {
        log::warn!("ADMIN_TAGS is empty, nobody can approve users or chats");
    } else {
        log::info!("Admin tags: {}", config::perms::ADMIN_TAGS.join(", "));
    }
    log::info!(
        "Default login limit: {}, in-flight updates: {}, pending per session: {}",
        *config::perms::DEFAULT_LOGIN_LIMIT,
        *config::sessions::MAX_INFLIGHT_UPDATES,
        *config::sessions::MAX_PENDING_PER_SESSION
    );
    log::info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
}
