// ⚙️ Engine Configuration - TOML file + environment overrides
//
// Every field has a default, so a missing file is a valid configuration.
// Tenant configuration (field maps, enrichment, webhooks, status settings)
// is data in the repository, not part of this file.

use anyhow::{Context as AnyhowContext, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// SQLite database file
    pub database_path: PathBuf,

    /// Deadline for every external CRM call
    pub rpc_timeout_ms: u64,

    /// Items in flight during bulk operations
    pub bulk_concurrency: usize,

    /// Deadline for outbound webhooks
    pub webhook_timeout_ms: u64,

    /// tracing filter directive, RUST_LOG wins when set
    pub log_filter: String,

    /// JSON log lines instead of human-readable ones
    pub log_json: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            database_path: PathBuf::from("lead-sync.db"),
            rpc_timeout_ms: 30_000,
            bulk_concurrency: 8,
            webhook_timeout_ms: 10_000,
            log_filter: "lead_sync=info".to_string(),
            log_json: false,
        }
    }
}

impl EngineConfig {
    /// Load from a TOML file (defaults when absent), then apply
    /// LEAD_SYNC_* environment overrides
    pub fn load(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let content = fs::read_to_string(path)
                .context(format!("Failed to read config file: {:?}", path))?;
            Self::from_toml(&content)
                .context(format!("Failed to parse config file: {:?}", path))?
        } else {
            EngineConfig::default()
        };

        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).context("Invalid TOML configuration")
    }

    /// Apply overrides from a variable lookup
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(path) = lookup("LEAD_SYNC_DATABASE") {
            self.database_path = PathBuf::from(path);
        }
        if let Some(ms) = lookup("LEAD_SYNC_RPC_TIMEOUT_MS") {
            self.rpc_timeout_ms = ms
                .parse()
                .context(format!("LEAD_SYNC_RPC_TIMEOUT_MS is not a number: {}", ms))?;
        }
        if let Some(n) = lookup("LEAD_SYNC_BULK_CONCURRENCY") {
            self.bulk_concurrency = n
                .parse()
                .context(format!("LEAD_SYNC_BULK_CONCURRENCY is not a number: {}", n))?;
        }
        Ok(())
    }

    pub fn rpc_timeout(&self) -> Duration {
        Duration::from_millis(self.rpc_timeout_ms)
    }

    pub fn webhook_timeout(&self) -> Duration {
        Duration::from_millis(self.webhook_timeout_ms)
    }
}

// ============================================================================
// TESTS
// ============================================================================
