//! Licensed-account lookup against the Mojang profile API

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use thiserror::Error;
use uuid::Uuid;

use crate::core::config;
use crate::minecraft::login::MinecraftLogin;

#[derive(Error, Debug)]
pub enum LookupError {
    /// There is no licensed account with this name
    #[error("no such player: {0}")]
    NoSuchPlayer(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("unexpected status {0}")]
    Status(StatusCode),

    #[error("malformed response: {0}")]
    Malformed(String),
}

/// Resolves a player name to the UUID of its licensed account
#[async_trait]
pub trait PlayerLookup: Send + Sync {
    async fn online_uuid(&self, login: &MinecraftLogin) -> Result<Uuid, LookupError>;
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProfileResponse {
    id: Option<String>,
    error_message: Option<String>,
}

pub struct MojangClient {
    client: Client,
    base_url: String,
}

impl MojangClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(config::mojang::timeout()).build()?;
        Ok(Self::with_client(client, base_url))
    }

    pub fn with_client(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn parse_profile(login: &MinecraftLogin, body: &str) -> Result<Uuid, LookupError> {
        let profile: ProfileResponse =
            serde_json::from_str(body).map_err(|e| LookupError::Malformed(e.to_string()))?;

        if let Some(message) = profile.error_message {
            if message.contains("Couldn't find any profile") {
                return Err(LookupError::NoSuchPlayer(login.to_string()));
            }
            return Err(LookupError::Malformed(message));
        }

        let id = profile
            .id
            .ok_or_else(|| LookupError::Malformed("profile without id".to_string()))?;
        Uuid::parse_str(&id).map_err(|e| LookupError::Malformed(format!("bad id {:?}: {}", id, e)))
    }
}

#[async_trait]
impl PlayerLookup for MojangClient {
    async fn online_uuid(&self, login: &MinecraftLogin) -> Result<Uuid, LookupError> {
        let url = format!("{}/users/profiles/minecraft/{}", self.base_url, login);
        log::debug!("Looking up Mojang profile for {}", login);

        let response = self.client.get(&url).send().await?;
        match response.status() {
            StatusCode::NOT_FOUND | StatusCode::NO_CONTENT => Err(LookupError::NoSuchPlayer(login.to_string())),
            StatusCode::OK => {
                let body = response.text().await?;
                Self::parse_profile(login, &body)
            }
            status => Err(LookupError::Status(status)),
        }
    }
}
