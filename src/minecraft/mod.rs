//! Minecraft account services: login validation, player UUIDs, password delivery

pub mod login;
pub mod mojang;
pub mod overseer;

pub use login::{offline_uuid, MinecraftLogin};
pub use mojang::{LookupError, MojangClient, PlayerLookup};
pub use overseer::{OverseerClient, PasswordSink};
