use anyhow::{Context, Result};
use dotenvy::dotenv;
use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    /// `None` runs on the in-memory store.
    pub database_url: Option<String>,
    /// `None` runs on the in-process stream hub.
    pub nats_url: Option<String>,
    /// Credential live viewers must present, if set.
    pub auth_token: Option<String>,
    pub jwt_secret: String,
    pub jwt_issuer: String,
    pub response_delay_ms: u64,
    pub max_responders: usize,
    pub ping_interval_secs: u64,
    pub subscription_capacity: usize,
    pub max_background_rounds: usize,
    pub serialize_rounds: bool,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Load .env file if present (development)
        let _ = dotenv();

        Ok(Self {
            port: parse_var("PORT", 8080)?,
            database_url: optional_var("DATABASE_URL"),
            nats_url: optional_var("NATS_URL"),
            auth_token: optional_var("AUTH_TOKEN"),
            jwt_secret: env::var("AUTH_JWT_SECRET").unwrap_or_else(|_| "dev-secret".to_string()),
            jwt_issuer: env::var("AUTH_JWT_ISSUER").unwrap_or_else(|_| "agent-forum".to_string()),
            response_delay_ms: parse_var("RESPONSE_DELAY_MS", 500)?,
            max_responders: parse_var("MAX_RESPONDERS", 3)?,
            ping_interval_secs: parse_var("PING_INTERVAL_SECS", 30)?,
            subscription_capacity: parse_var("SUBSCRIPTION_CAPACITY", 256)?,
            max_background_rounds: parse_var("MAX_BACKGROUND_ROUNDS", 32)?,
            serialize_rounds: parse_var("SERIALIZE_ROUNDS", true)?,
        })
    }

    pub fn orchestration(&self) -> OrchestrationSettings {
        OrchestrationSettings {
            response_delay: Duration::from_millis(self.response_delay_ms),
            max_responders: self.max_responders,
            ping_interval: Duration::from_secs(self.ping_interval_secs.max(1)),
            max_background_rounds: self.max_background_rounds,
            serialize_rounds: self.serialize_rounds,
        }
    }
}

/// Knobs for the schedulers and the live bridge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrchestrationSettings {
    /// Pause after each agent message.
    pub response_delay: Duration,
    /// Roster prefix size for one turn round.
    pub max_responders: usize,
    pub ping_interval: Duration,
    /// Background rounds allowed to run at once.
    pub max_background_rounds: usize,
    /// Hold a per-conversation lock for each round or debate.
    pub serialize_rounds: bool,
}

impl Default for OrchestrationSettings {
    fn default() -> Self {
        Self {
            response_delay: Duration::from_millis(500),
            max_responders: 3,
            ping_interval: Duration::from_secs(30),
            max_background_rounds: 32,
            serialize_rounds: true,
        }
    }
}

fn optional_var(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parse_var<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match optional_var(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("{} must be a valid value, got {:?}", key, raw)),
        None => Ok(default),
    }
}
