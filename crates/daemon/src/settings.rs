// SPDX-License-Identifier: MIT

//! Layered configuration (§6): built-in defaults, an optional TOML file,
//! then environment variables prefixed `WFE_` with `__` as the nesting
//! separator, each layer overriding the one before it.

use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub server: ServerSettings,
    pub database: DatabaseSettings,
    pub redis: RedisSettings,
    pub rabbitmq: RabbitMqSettings,
    pub security: SecuritySettings,
    pub process: ProcessSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server: ServerSettings::default(),
            database: DatabaseSettings::default(),
            redis: RedisSettings::default(),
            rabbitmq: RabbitMqSettings::default(),
            security: SecuritySettings::default(),
            process: ProcessSettings::default(),
        }
    }
}

/// Accepted for forward compatibility with the out-of-scope HTTP API
/// surface (§1); the engine core never reads these fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    pub debug: bool,
    pub workers: u32,
    pub reload: bool,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self { host: "0.0.0.0".to_string(), port: 8000, debug: false, workers: 1, reload: false }
    }
}

/// `url` backs this implementation's [`wfe_storage::WalStateStore`]: a
/// `file://` path (or a bare filesystem path) to the WAL file, since the
/// engine core's state store is append-log-backed rather than relational
/// (§4.3's "transactional KV-over-relations collaborator" is treated here
/// as the WAL-backed store, not a SQL schema — there is no relational
/// definition/instance storage in scope per §1). The pool/overflow/echo
/// fields are accepted but unused, kept for forward compatibility with a
/// future relational definition/instance repository.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseSettings {
    pub url: String,
    pub pool_size: u32,
    pub max_overflow: u32,
    pub echo: bool,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self { url: "wal.log".to_string(), pool_size: 10, max_overflow: 5, echo: false }
    }
}

/// Accepted for forward compatibility; this implementation's change feed
/// (§4.3 "durable pub-sub ... used only by the Timer Scheduler") is an
/// in-process broadcast channel on the state store, not Redis.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RedisSettings {
    pub url: String,
    pub pool_size: u32,
    pub decode_responses: bool,
    pub socket_timeout: u64,
    pub socket_connect_timeout: u64,
}

impl Default for RedisSettings {
    fn default() -> Self {
        Self {
            url: "redis://localhost:6379".to_string(),
            pool_size: 10,
            decode_responses: true,
            socket_timeout: 5,
            socket_connect_timeout: 5,
        }
    }
}

/// `url` selects the event bus transport (§4.5): a `nats://` URL connects
/// [`wfe_bus::NatsEventBus`]; anything else (including the default) falls
/// back to the in-memory bus, which is sufficient for a single-process
/// daemon and for the test/demo scenarios in §8.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RabbitMqSettings {
    pub url: String,
    pub connection_attempts: u32,
    pub retry_delay: u64,
    pub heartbeat: u64,
}

impl Default for RabbitMqSettings {
    fn default() -> Self {
        Self { url: "memory://".to_string(), connection_attempts: 3, retry_delay: 2, heartbeat: 60 }
    }
}

/// Accepted for forward compatibility with the out-of-scope authentication
/// surface (§1); the engine core never reads these fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SecuritySettings {
    pub secret_key: String,
    pub token_expire_minutes: u32,
    pub algorithm: String,
}

impl Default for SecuritySettings {
    fn default() -> Self {
        Self { secret_key: String::new(), token_expire_minutes: 30, algorithm: "HS256".to_string() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessSettings {
    pub script_timeout: u64,
    pub max_instances: u32,
    pub cleanup_interval: u64,
    pub max_retries: u32,
    /// Directory scanned at startup for task plugins. Overridable via the
    /// `WFE_PLUGIN_DIR` environment variable even though it lives outside
    /// the `process.*` namespace, matching the separate env override §6
    /// specifies for plugin discovery.
    pub plugin_dir: String,
}

impl Default for ProcessSettings {
    fn default() -> Self {
        Self {
            script_timeout: 30,
            max_instances: 1000,
            cleanup_interval: 300,
            max_retries: 3,
            plugin_dir: "/app/plugins".to_string(),
        }
    }
}

impl Settings {
    /// Load defaults, then `path` if it exists, then `WFE_`-prefixed
    /// environment variables (`WFE_DATABASE__URL`, `WFE_PROCESS__MAX_RETRIES`,
    /// ...), last layer wins. `WFE_PLUGIN_DIR` (no double underscore, no
    /// `process` segment) is layered in afterwards as the dedicated plugin
    /// override §6 calls out separately from the nested config keys.
    pub fn load(path: Option<&Path>) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder().add_source(config::Config::try_from(&Settings::default())?);

        if let Some(path) = path {
            if path.exists() {
                builder = builder.add_source(config::File::from(path));
            }
        }

        builder = builder.add_source(config::Environment::with_prefix("WFE").separator("__").try_parsing(true));

        let mut settings: Settings = builder.build()?.try_deserialize()?;

        if let Ok(dir) = std::env::var("WFE_PLUGIN_DIR") {
            settings.process.plugin_dir = dir;
        }

        Ok(settings)
    }
}
