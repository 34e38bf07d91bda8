use once_cell::sync::Lazy;
use std::env;
use std::time::Duration;

/// Bot token, read from BOT_TOKEN with TELOXIDE_TOKEN as a fallback
pub static BOT_TOKEN: Lazy<Option<String>> = Lazy::new(|| {
    env::var("BOT_TOKEN")
        .or_else(|_| env::var("TELOXIDE_TOKEN"))
        .ok()
        .filter(|token| !token.trim().is_empty())
});

/// Bot username without the leading `@`
/// Read from BOT_USERNAME environment variable
/// Used to address commands in groups (`/imhere@bot`) and to ignore commands meant for other bots
pub static BOT_USERNAME: Lazy<Option<String>> = Lazy::new(|| {
    env::var("BOT_USERNAME").ok().and_then(|value| {
        let trimmed = value.trim().trim_start_matches('@');
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
});

/// Database file path
/// Read from DATABASE_PATH environment variable
/// Default: auth.sqlite
pub static DATABASE_PATH: Lazy<String> =
    Lazy::new(|| env::var("DATABASE_PATH").unwrap_or_else(|_| "auth.sqlite".to_string()));

/// Log file path
/// Read from LOG_FILE_PATH environment variable
/// Default: app.log
pub static LOG_FILE_PATH: Lazy<String> =
    Lazy::new(|| env::var("LOG_FILE_PATH").unwrap_or_else(|_| "app.log".to_string()));

/// Status web server configuration
pub mod web {
    use once_cell::sync::Lazy;
    use std::env;

    /// Port for the status HTTP server
    /// Read from WEB_PORT environment variable
    /// Default: 8080
    pub static PORT: Lazy<u16> = Lazy::new(|| {
        env::var("WEB_PORT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(8080)
    });
}

/// Permission rules configuration
pub mod perms {
    use once_cell::sync::Lazy;
    use std::env;

    fn parse_admin_tags(raw: &str) -> Vec<String> {
        raw.split([',', ' ', '\n', '\t'])
            .map(|part| part.trim().trim_start_matches('@'))
            .filter(|part| !part.is_empty())
            .map(str::to_string)
            .collect()
    }

    /// Telegram usernames that are granted admin rights (comma-separated)
    /// Read from ADMIN_TAGS environment variable
    pub static ADMIN_TAGS: Lazy<Vec<String>> = Lazy::new(|| {
        env::var("ADMIN_TAGS")
            .ok()
            .map(|raw| parse_admin_tags(&raw))
            .unwrap_or_default()
    });

    /// How many Minecraft accounts an actor may register unless a custom limit is set
    /// Read from DEFAULT_LOGIN_LIMIT environment variable
    /// Default: 2
    pub static DEFAULT_LOGIN_LIMIT: Lazy<i64> = Lazy::new(|| {
        env::var("DEFAULT_LOGIN_LIMIT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(2)
    });

    /// Length of generated account passwords
    pub const GENERATED_PASSWORD_LEN: usize = 20;

}

/// Minecraft server overseer configuration
pub mod overseer {
    use super::Duration;
    use once_cell::sync::Lazy;
    use std::env;

    /// Timeout for overseer API calls (in seconds)
    pub const TIMEOUT_SECS: u64 = 15;

    pub fn timeout() -> Duration {
        Duration::from_secs(TIMEOUT_SECS)
    }

    /// Base URL of the server overseer HTTP API
    /// Read from OVERSEER_URL environment variable
    /// Default: http://mc-server:8080
    pub static URL: Lazy<String> =
        Lazy::new(|| env::var("OVERSEER_URL").unwrap_or_else(|_| "http://mc-server:8080".to_string()));
}

/// Mojang profile API configuration
pub mod mojang {
    use super::Duration;
    use once_cell::sync::Lazy;
    use std::env;

    /// Read from MOJANG_API_URL environment variable
    pub static API_URL: Lazy<String> =
        Lazy::new(|| env::var("MOJANG_API_URL").unwrap_or_else(|_| "https://api.mojang.com".to_string()));

    /// Timeout for profile lookups (in seconds)
    pub const TIMEOUT_SECS: u64 = 10;

    pub fn timeout() -> Duration {
        Duration::from_secs(TIMEOUT_SECS)
    }
}

/// Network configuration
pub mod network {
    use super::Duration;
    use once_cell::sync::Lazy;
    use std::env;

    /// Request timeout for the Telegram HTTP client (in seconds)
    /// Must stay above the long-polling timeout
    pub const REQUEST_TIMEOUT_SECS: u64 = 60;

    /// Request timeout duration
    pub fn timeout() -> Duration {
        Duration::from_secs(REQUEST_TIMEOUT_SECS)
    }

    /// Upper bound for a single outbound chat API call made while processing an update
    /// Read from TELEGRAM_TIMEOUT_SECS environment variable
    /// Default: 30
    pub static TELEGRAM_TIMEOUT_SECS: Lazy<u64> = Lazy::new(|| {
        env::var("TELEGRAM_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(30)
    });

    pub fn telegram_timeout() -> Duration {
        Duration::from_secs(*TELEGRAM_TIMEOUT_SECS)
    }
}

/// Conversation session limits
pub mod sessions {
    use once_cell::sync::Lazy;
    use std::env;

    /// Maximum number of updates being processed at once across all sessions
    /// Read from MAX_INFLIGHT_UPDATES environment variable
    /// Default: 64
    pub static MAX_INFLIGHT_UPDATES: Lazy<usize> = Lazy::new(|| {
        env::var("MAX_INFLIGHT_UPDATES")
            .ok()
            .and_then(|v| v.parse().ok())
            .filter(|v| *v > 0)
            .unwrap_or(64)
    });

    /// Maximum number of queued updates for a single session; extra updates are dropped
    /// Read from MAX_PENDING_PER_SESSION environment variable
    /// Default: 8
    pub static MAX_PENDING_PER_SESSION: Lazy<usize> = Lazy::new(|| {
        env::var("MAX_PENDING_PER_SESSION")
            .ok()
            .and_then(|v| v.parse().ok())
            .filter(|v| *v > 0)
            .unwrap_or(8)
    });

    #[cfg(test)]
    mod tests {
        use super::*;
        use serial_test::serial;

        // Nothing else in this binary dereferences these statics
        #[test]
        #[serial]
        fn session_limits_come_from_env_and_reject_zero() {
            env::set_var("MAX_PENDING_PER_SESSION", "3");
            env::set_var("MAX_INFLIGHT_UPDATES", "0");

            assert_eq!(*MAX_PENDING_PER_SESSION, 3);
            assert_eq!(*MAX_INFLIGHT_UPDATES, 64);

            env::remove_var("MAX_PENDING_PER_SESSION");
            env::remove_var("MAX_INFLIGHT_UPDATES");
        }
    }
}
