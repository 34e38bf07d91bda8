//! SQLite persistence for actors, chats and Minecraft accounts

pub mod accounts;
pub mod actors;
pub mod chats;
pub mod db;
pub mod migrations;

pub use accounts::{AssignOutcome, MinecraftAccount};
pub use actors::{Actor, ActorId, TgUserInfo};
pub use db::{create_pool, get_connection, DbConnection, DbPool};
