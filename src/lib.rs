//! Subchat Sentry - Telegram bot that lets community members self-register
//! Minecraft accounts under admin-controlled permissions
//!
//! # Module Structure
//!
//! - `core`: configuration, errors, logging, status web server
//! - `storage`: SQLite persistence for actors, chats and accounts
//! - `perms`: permission rules over stored actors
//! - `minecraft`: login validation, player UUIDs, password delivery
//! - `telegram`: chat API, conversation handlers and the per-session engine

pub mod cli;
pub mod core;
pub mod minecraft;
pub mod perms;
pub mod storage;
pub mod telegram;

pub use crate::core::{config, AppError, AppResult};
pub use perms::{PermsConfig, PermsEngine, PermsError};
pub use storage::{create_pool, get_connection, DbConnection, DbPool};
pub use telegram::{BotContext, ConversationEngine, EngineLimits, IncomingUpdate};
