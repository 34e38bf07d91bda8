use lazy_regex::regex_is_match;
use md5::{Digest, Md5};
use std::fmt;
use uuid::Uuid;

use crate::core::error::AppError;

/// A syntactically valid Minecraft player name
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MinecraftLogin(String);

impl MinecraftLogin {
    /// 3 to 16 characters out of `[a-zA-Z0-9_]`, surrounding whitespace ignored
    pub fn parse(raw: &str) -> Result<Self, AppError> {
        let login = raw.trim();
        if regex_is_match!(r"^[a-zA-Z0-9_]{3,16}$", login) {
            Ok(Self(login.to_string()))
        } else {
            Err(AppError::Validation(format!("invalid minecraft login: {:?}", login)))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// UUID the server assigns to this name when it runs in offline mode
    pub fn offline_uuid(&self) -> Uuid {
        offline_uuid(&self.0)
    }
}

impl fmt::Display for MinecraftLogin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for MinecraftLogin {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Name-based UUID of `"OfflinePlayer:" + login`: MD5, version 3, RFC 4122 variant
pub fn offline_uuid(login: &str) -> Uuid {
    let digest = Md5::digest(format!("OfflinePlayer:{}", login).as_bytes());
    let mut hash = [0u8; 16];
    hash.copy_from_slice(&digest);
    hash[6] = (hash[6] & 0x0f) | 0x30;
    hash[8] = (hash[8] & 0x3f) | 0x80;
    Uuid::from_bytes(hash)
}
