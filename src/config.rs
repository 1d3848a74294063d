//! Configuration and settings management
//!
//! Loads settings from environment variables and defines retry/timeout
//! tunables with documented defaults.

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

/// Default port for the webhook server (Render sets `PORT` in production).
const DEFAULT_PORT: u16 = 8000;

/// Maximum completion attempts per request (initial call + retries).
pub const LLM_MAX_ATTEMPTS: u32 = 3;
/// Base retry delay in milliseconds, doubled on each subsequent attempt.
pub const LLM_BASE_DELAY_MS: u64 = 1000;
/// Per-attempt timeout for the completion call, in seconds.
pub const LLM_REQUEST_TIMEOUT_SECS: u64 = 60;
/// Interval between keep-alive self-pings, in seconds.
///
/// Render's free tier idles services after 15 minutes without traffic,
/// so the default stays just under that.
pub const KEEP_ALIVE_INTERVAL_SECS: u64 = 840;

/// Application settings loaded from environment variables
#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    /// Telegram Bot API token
    pub telegram_token: String,

    /// OpenAI API key
    pub openai_api_key: String,

    /// Identifier of the GPTS model that answers user messages
    pub gpts_model_id: String,

    /// Public base URL of this service, used for webhook registration
    /// and keep-alive pings
    pub webhook_url: String,

    /// Port the webhook server binds to
    #[serde(default = "default_port")]
    pub port: u16,
}

const fn default_port() -> u16 {
    DEFAULT_PORT
}

impl Settings {
    /// Create new settings by loading from environment and files
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if loading fails or a required key is missing.
    pub fn new() -> Result<Self, ConfigError> {
        let run_mode = std::env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = Config::builder()
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{run_mode}")).required(false))
            .add_source(File::with_name("config/local").required(false))
            // Environment::default() auto-converts UPPER_SNAKE_CASE to snake_case;
            // ignore_empty treats empty env vars as unset
            .add_source(Environment::default().ignore_empty(true))
            .build()?;

        s.try_deserialize()
    }

    /// Full webhook endpoint URL registered with Telegram.
    ///
    /// The bot token is part of the path so that only Telegram (which knows
    /// the token) can reach the update handler.
    #[must_use]
    pub fn webhook_endpoint(&self) -> String {
        format!(
            "{}/webhook/{}",
            self.webhook_url.trim_end_matches('/'),
            self.telegram_token
        )
    }

    /// Short, non-sensitive fingerprint of the bot token for the liveness
    /// endpoint and logs.
    #[must_use]
    pub fn token_fingerprint(&self) -> String {
        let token = &self.telegram_token;
        if token.chars().count() <= 8 {
            return "***".to_string();
        }
        let head: String = token.chars().take(4).collect();
        let tail_rev: Vec<char> = token.chars().rev().take(4).collect();
        let tail: String = tail_rev.into_iter().rev().collect();
        format!("{head}...{tail}")
    }
}

fn env_u64(name: &str, default: u64) -> u64 {
    std::env::var(name)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

/// Get maximum completion attempts from env or default.
///
/// Environment variable: `LLM_MAX_ATTEMPTS`.
#[must_use]
pub fn get_llm_max_attempts() -> u32 {
    std::env::var("LLM_MAX_ATTEMPTS")
        .ok()
        .and_then(|s| s.parse().ok())
        .filter(|n| *n > 0)
        .unwrap_or(LLM_MAX_ATTEMPTS)
}

/// Get base retry delay in milliseconds from env or default.
///
/// Environment variable: `LLM_BASE_DELAY_MS`.
#[must_use]
pub fn get_llm_base_delay_ms() -> u64 {
    env_u64("LLM_BASE_DELAY_MS", LLM_BASE_DELAY_MS)
}

/// Get per-attempt completion timeout in seconds from env or default.
///
/// Environment variable: `LLM_REQUEST_TIMEOUT_SECS`.
#[must_use]
pub fn get_llm_request_timeout_secs() -> u64 {
    env_u64("LLM_REQUEST_TIMEOUT_SECS", LLM_REQUEST_TIMEOUT_SECS)
}

/// Get keep-alive ping interval in seconds from env or default.
///
/// Environment variable: `KEEP_ALIVE_INTERVAL_SECS`.
#[must_use]
pub fn get_keep_alive_interval_secs() -> u64 {
    env_u64("KEEP_ALIVE_INTERVAL_SECS", KEEP_ALIVE_INTERVAL_SECS)
}
