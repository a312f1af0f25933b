//! Configuration loading.
//!
//! Precedence, lowest to highest: built-in defaults, `config.toml`,
//! `PHI_*` environment variables, CLI flags (applied by `main`).

pub mod schema;

pub use schema::{AuthConfig, Config, GatewayConfig, LogConfig, StorageConfig};

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

impl Config {
    /// Load from `path`, or from the platform config directory when `None`.
    /// A missing file is not an error; defaults are used instead.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(p) => Some(p.to_path_buf()),
            None => default_config_path(),
        };

        let mut config = match path {
            Some(ref p) if p.exists() => {
                let raw = std::fs::read_to_string(p)
                    .with_context(|| format!("reading config {}", p.display()))?;
                let parsed: Config = toml::from_str(&raw)
                    .with_context(|| format!("parsing config {}", p.display()))?;
                tracing::debug!(path = %p.display(), "Loaded config file");
                parsed
            }
            _ => Config::default(),
        };

        config.apply_env_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `PHI_*` overrides through `lookup` so tests need not touch the
    /// process environment.
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup("PHI_HOST").filter(|v| !v.trim().is_empty()) {
            self.gateway.host = host.trim().to_string();
        }
        if let Some(port) = lookup("PHI_PORT") {
            self.gateway.port = port
                .trim()
                .parse()
                .with_context(|| format!("PHI_PORT is not a valid port: {port}"))?;
        }
        if let Some(root) = lookup("PHI_STORE_ROOT").filter(|v| !v.trim().is_empty()) {
            self.storage.store_root = PathBuf::from(root);
        }
        if let Some(db) = lookup("PHI_DATABASE").filter(|v| !v.trim().is_empty()) {
            self.storage.database = PathBuf::from(db);
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if !bcrypt_bounds().contains(&self.auth.bcrypt_cost) {
            anyhow::bail!(
                "auth.bcrypt_cost must be between {} and {} (got {})",
                bcrypt_bounds().start(),
                bcrypt_bounds().end(),
                self.auth.bcrypt_cost
            );
        }
        if self.auth.min_username_len == 0 || self.auth.min_password_len == 0 {
            anyhow::bail!("auth minimum lengths must be at least 1");
        }
        if self.gateway.max_upload_bytes == 0 {
            anyhow::bail!("gateway.max_upload_bytes must be greater than zero");
        }
        Ok(())
    }
}

fn bcrypt_bounds() -> std::ops::RangeInclusive<u32> {
    4..=31
}

fn default_config_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "phi").map(|dirs| dirs.config_dir().join("config.toml"))
}
