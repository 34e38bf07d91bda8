//! Password delivery to the Minecraft server overseer

use async_trait::async_trait;
use reqwest::Client;
use std::collections::HashMap;

use crate::core::config;
use crate::core::error::{AppError, AppResult};
use crate::minecraft::login::MinecraftLogin;

/// Something that can install a password for an offline account on the game server
#[async_trait]
pub trait PasswordSink: Send + Sync {
    async fn set_password(&self, login: &MinecraftLogin, password: &str) -> AppResult<()>;
}

pub struct OverseerClient {
    client: Client,
    base_url: String,
}

impl OverseerClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(config::overseer::timeout()).build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl PasswordSink for OverseerClient {
    async fn set_password(&self, login: &MinecraftLogin, password: &str) -> AppResult<()> {
        let body: HashMap<&str, &str> = HashMap::from([(login.as_str(), password)]);
        let response = self
            .client
            .post(format!("{}/set-passwords", self.base_url))
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            log::error!("Overseer refused password for {}: {}", login, response.status());
            return Err(AppError::HttpStatus(response.status()));
        }
        log::info!("Password for {} delivered to the overseer", login);
        Ok(())
    }
}
