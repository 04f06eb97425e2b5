//! Chat core settings and configuration structures.

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

use crate::domain::pagination::MAX_PAGE_SIZE;

/// Root configuration structure.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// Database configuration (PostgreSQL)
    pub database: DatabaseSettings,

    /// Redis configuration (pub/sub and notification hand-off)
    pub redis: RedisSettings,

    /// Chat behaviour
    pub chat: ChatSettings,

    /// Snowflake ID generator settings
    pub snowflake: SnowflakeSettings,

    /// Current environment (development, staging, production)
    pub environment: String,
}

/// PostgreSQL database configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseSettings {
    /// Database connection URL
    pub url: String,

    /// Maximum number of connections in the pool
    pub max_connections: u32,

    /// Minimum number of connections to maintain
    pub min_connections: u32,

    /// Connection acquire timeout in seconds
    pub acquire_timeout: u64,

    /// Apply bundled migrations on startup
    pub run_migrations: bool,
}

/// Redis configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct RedisSettings {
    /// Redis connection URL
    pub url: String,
}

/// Which bus carries real-time messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PubSubBackend {
    /// Redis PUBLISH/SUBSCRIBE, shared by every process
    Redis,
    /// In-process broadcast, single node only
    Local,
}

/// Chat behaviour configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatSettings {
    /// Prefix of the chat tables, e.g. `b_chat` -> `b_chat_channels`
    pub table_prefix: String,

    /// Topic prefix for real-time message delivery; one topic per channel
    pub delivery_topic: String,

    /// Redis channel the push service consumes notifications from
    pub notification_topic: String,

    /// Maximum message length in characters
    pub max_message_length: usize,

    /// Page size when the caller gives neither `first` nor `last`
    pub default_page_size: i32,

    /// Data loader entry lifetime in seconds
    pub loader_ttl_secs: u64,

    /// Data loader entries per map
    pub loader_capacity: usize,

    /// Per-topic buffer of the in-process bus
    pub local_bus_capacity: usize,

    /// Per-subscriber queue length
    pub subscription_buffer: usize,

    pub pubsub_backend: PubSubBackend,
}

impl Default for ChatSettings {
    fn default() -> Self {
        Self {
            table_prefix: "b_chat".into(),
            delivery_topic: "B_MESSAGE_RECEIVED".into(),
            notification_topic: "notifications".into(),
            max_message_length: 4000,
            default_page_size: 25,
            loader_ttl_secs: 30,
            loader_capacity: 100,
            local_bus_capacity: 256,
            subscription_buffer: 64,
            pubsub_backend: PubSubBackend::Redis,
        }
    }
}

impl ChatSettings {
    /// Check values that would otherwise fail at query time.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let prefix_ok = !self.table_prefix.is_empty()
            && self
                .table_prefix
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_')
            && !self.table_prefix.starts_with(|c: char| c.is_ascii_digit());
        if !prefix_ok {
            return Err(ConfigError::Message(format!(
                "chat.table_prefix must be a plain SQL identifier, got {:?}",
                self.table_prefix
            )));
        }

        if !(1..=MAX_PAGE_SIZE).contains(&self.default_page_size) {
            return Err(ConfigError::Message(format!(
                "chat.default_page_size must be within 1..={}",
                MAX_PAGE_SIZE
            )));
        }

        if self.max_message_length == 0 || self.subscription_buffer == 0 || self.local_bus_capacity == 0 {
            return Err(ConfigError::Message(
                "chat.max_message_length, chat.subscription_buffer and chat.local_bus_capacity must be positive".into(),
            ));
        }

        Ok(())
    }
}

/// Snowflake ID generator configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct SnowflakeSettings {
    /// Machine/worker ID (0-1023)
    pub machine_id: u16,

    /// Custom epoch timestamp in milliseconds
    pub epoch: u64,
}

impl Settings {
    /// Load settings from environment variables and configuration files.
    ///
    /// The loading order is:
    /// 1. config/default.toml (base configuration)
    /// 2. config/{RUN_ENV}.toml (environment-specific overrides)
    /// 3. Environment variables (highest priority)
    pub fn load() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let environment = std::env::var("RUN_ENV").unwrap_or_else(|_| "development".into());
        let chat = ChatSettings::default();

        Config::builder()
            .set_default("environment", environment.clone())?
            .set_default("database.max_connections", 10)?
            .set_default("database.min_connections", 2)?
            .set_default("database.acquire_timeout", 30)?
            .set_default("database.run_migrations", false)?
            .set_default("chat.table_prefix", chat.table_prefix)?
            .set_default("chat.delivery_topic", chat.delivery_topic)?
            .set_default("chat.notification_topic", chat.notification_topic)?
            .set_default("chat.max_message_length", chat.max_message_length as i64)?
            .set_default("chat.default_page_size", chat.default_page_size as i64)?
            .set_default("chat.loader_ttl_secs", chat.loader_ttl_secs as i64)?
            .set_default("chat.loader_capacity", chat.loader_capacity as i64)?
            .set_default("chat.local_bus_capacity", chat.local_bus_capacity as i64)?
            .set_default("chat.subscription_buffer", chat.subscription_buffer as i64)?
            .set_default("chat.pubsub_backend", "redis")?
            .set_default("snowflake.machine_id", 1)?
            .set_default("snowflake.epoch", crate::shared::snowflake::DEFAULT_EPOCH)?
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", environment)).required(false))
            // APP__CHAT__DEFAULT_PAGE_SIZE=50 -> chat.default_page_size = 50
            .add_source(
                Environment::default()
                    .prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            )
            .set_override_option("database.url", std::env::var("DATABASE_URL").ok())?
            .set_override_option("redis.url", std::env::var("REDIS_URL").ok())?
            .set_override_option(
                "snowflake.machine_id",
                std::env::var("SNOWFLAKE_MACHINE_ID").ok(),
            )?
            .build()?
            .try_deserialize()
            .and_then(|settings: Self| {
                settings.chat.validate()?;
                Ok(settings)
            })
    }
}
