//! TOML configuration with environment overrides.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// Environment variable overriding the trigger secret, so the secret can
/// stay out of config files.
pub const TRIGGER_SECRET_ENV: &str = "ACCESSWATCH_TRIGGER_SECRET";

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// API bind address.
    pub bind: String,
    /// SQLite database path.
    pub db_path: String,
    /// Shared secret for trigger endpoints.
    pub trigger_secret: Option<String>,
    /// Scan engine service endpoint.
    pub scan_endpoint: Option<String>,
    /// Webhook endpoint for notification delivery.
    pub webhook_endpoint: Option<String>,
    /// Max due schedules processed per trigger invocation.
    pub batch_size: usize,
    /// Wall-clock budget per invocation, seconds.
    pub batch_budget_secs: u64,
    /// Deadline for a single scan engine call, seconds.
    pub scan_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:8080".into(),
            db_path: "data/accesswatch.db".into(),
            trigger_secret: None,
            scan_endpoint: None,
            webhook_endpoint: None,
            batch_size: crate::monitor::DEFAULT_BATCH_SIZE,
            batch_budget_secs: 300,
            scan_timeout_secs: 60,
        }
    }
}

impl Config {
    /// Load configuration from a TOML file; a missing file falls back to
    /// defaults. The trigger secret env var wins over the file.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(p) => {
                let raw = std::fs::read_to_string(p)
                    .with_context(|| format!("Failed to read config file {}", p.display()))?;
                toml::from_str(&raw)
                    .with_context(|| format!("Invalid config file {}", p.display()))?
            }
            None => Self::default(),
        };
        if let Ok(secret) = std::env::var(TRIGGER_SECRET_ENV) {
            if !secret.is_empty() {
                config.trigger_secret = Some(secret);
            }
        }
        Ok(config)
    }

    pub fn batch_budget(&self) -> Duration {
        Duration::from_secs(self.batch_budget_secs)
    }

    pub fn scan_timeout(&self) -> Duration {
        Duration::from_secs(self.scan_timeout_secs)
    }
}
