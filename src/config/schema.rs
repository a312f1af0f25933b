use serde::Deserialize;
use std::path::PathBuf;

use crate::upload::{CollisionPolicy, PartitionZone};

/// Top-level configuration, deserialized from `config.toml`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub gateway: GatewayConfig,
    pub auth: AuthConfig,
    pub storage: StorageConfig,
    pub log: LogConfig,
}

/// `[gateway]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub host: String,
    pub port: u16,
    /// Largest accepted upload body, in bytes.
    pub max_upload_bytes: usize,
    pub request_timeout_secs: u64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 9876,
            max_upload_bytes: 64 * 1024 * 1024,
            request_timeout_secs: 120,
        }
    }
}

/// `[auth]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// bcrypt work factor (4..=31).
    pub bcrypt_cost: u32,
    /// Absolute session lifetime from issuance. `0` disables expiry.
    pub session_ttl_secs: u64,
    pub min_username_len: usize,
    pub min_password_len: usize,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            bcrypt_cost: 14,
            session_ttl_secs: 30 * 24 * 3600,
            min_username_len: 8,
            min_password_len: 8,
        }
    }
}

/// `[storage]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// SQLite credential database.
    pub database: PathBuf,
    /// Root of the date-partitioned upload tree.
    pub store_root: PathBuf,
    pub collision: CollisionPolicy,
    /// Time zone used to derive `YYYY/MM/DD` from upload timestamps.
    pub timezone: PartitionZone,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database: PathBuf::from("phidb.sqlite3"),
            store_root: PathBuf::from("store"),
            collision: CollisionPolicy::default(),
            timezone: PartitionZone::default(),
        }
    }
}

/// `[log]` section. `RUST_LOG` takes precedence when set.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
        }
    }
}
