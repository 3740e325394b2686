//! Layered configuration for Dispatch.
//!
//! Configuration is loaded from `config/default.toml`, optionally
//! overridden by `config/<profile>.toml`, and finally by `DISPATCH_*`
//! environment variables — the same three-layer shape
//! `cortex_core::config::GlobalConfig` uses (file defaults, profile
//! overlay, env override), minus the hot-reload machinery this system
//! doesn't need.

use crate::error::{CoreError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment variable prefix for all Dispatch configuration overrides.
pub const ENV_PREFIX: &str = "DISPATCH_";

/// Bidirectional sync conflict-resolution strategy. Defaults to
/// `newest-wins`; see SPEC_FULL.md Open Question (1) for why this default
/// was chosen over `github-wins`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SyncStrategy {
    GithubWins,
    BeadsWins,
    NewestWins,
}

impl Default for SyncStrategy {
    fn default() -> Self {
        Self::NewestWins
    }
}

/// Exponential-backoff-with-jitter tuning, the Retry Layer's config
/// surface.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub jitter_factor: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 1000,
            max_delay_ms: 30_000,
            jitter_factor: 0.3,
        }
    }
}

/// Type and priority label maps plus body-relation regex patterns used by
/// the Convention Codec. All fields are overridable; overrides deep-merge
/// onto these defaults field-by-field.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Conventions {
    pub type_map: TypeMap,
    pub priority_map: PriorityMap,
    pub in_progress_label: String,
    pub dependency_pattern: String,
    pub blocks_pattern: String,
    pub parent_pattern: String,
    pub separator: String,
}

impl Default for Conventions {
    fn default() -> Self {
        Self {
            type_map: TypeMap::default(),
            priority_map: PriorityMap::default(),
            in_progress_label: "status:in-progress".to_string(),
            dependency_pattern: r"(?i)^depends on:\s*(.+)$".to_string(),
            blocks_pattern: r"(?i)^blocks:\s*(.+)$".to_string(),
            parent_pattern: r"(?i)^parent:\s*(.+)$".to_string(),
            separator: "---\n<!-- sync-metadata - do not edit below -->".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TypeMap {
    pub bug: String,
    pub feature: String,
    pub task: String,
    pub epic: String,
    pub chore: String,
}

impl Default for TypeMap {
    fn default() -> Self {
        Self {
            bug: "bug".to_string(),
            feature: "enhancement".to_string(),
            task: "task".to_string(),
            epic: "epic".to_string(),
            chore: "chore".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PriorityMap {
    pub labels: Vec<String>,
}

impl Default for PriorityMap {
    fn default() -> Self {
        Self {
            labels: vec![
                "P0".to_string(),
                "P1".to_string(),
                "P2".to_string(),
                "P3".to_string(),
                "P4".to_string(),
            ],
        }
    }
}

impl PriorityMap {
    pub fn label_for(&self, priority: u8) -> Option<&str> {
        self.labels.get(priority as usize).map(String::as_str)
    }

    pub fn priority_for(&self, label: &str) -> Option<u8> {
        self.labels.iter().position(|l| l == label).map(|i| i as u8)
    }
}

/// Top-level configuration surface (spec.md §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    pub database_url: String,
    pub retry: RetryConfig,
    pub sync_strategy: SyncStrategy,
    pub conventions: Conventions,
    pub pr_approval_timeout_secs: u64,
    pub reconciliation_interval_secs: u64,
    pub webhook_secret: String,
    pub http_bind: String,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            database_url: "sqlite://dispatch.db".to_string(),
            retry: RetryConfig::default(),
            sync_strategy: SyncStrategy::default(),
            conventions: Conventions::default(),
            pr_approval_timeout_secs: 7 * 24 * 3600,
            reconciliation_interval_secs: 5 * 60,
            webhook_secret: String::new(),
            http_bind: "0.0.0.0:8080".to_string(),
        }
    }
}

impl DispatchConfig {
    /// Load configuration: defaults, overlaid by `path` if it exists,
    /// overlaid by `DISPATCH_*` environment variables.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let mut config = Self::default();
        let path = path.as_ref();
        if path.exists() {
            let raw = std::fs::read_to_string(path)
                .map_err(|e| CoreError::Config(format!("reading {}: {e}", path.display())))?;
            config = toml::from_str(&raw)
                .map_err(|e| CoreError::Config(format!("parsing {}: {e}", path.display())))?;
        }
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load from the default search path, `./dispatch.toml`.
    pub fn load_default() -> Result<Self> {
        Self::load(default_config_path())
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var(format!("{ENV_PREFIX}DATABASE_URL")) {
            self.database_url = v;
        }
        if let Ok(v) = std::env::var(format!("{ENV_PREFIX}WEBHOOK_SECRET")) {
            self.webhook_secret = v;
        }
        if let Ok(v) = std::env::var(format!("{ENV_PREFIX}HTTP_BIND")) {
            self.http_bind = v;
        }
        if let Ok(v) = std::env::var(format!("{ENV_PREFIX}MAX_RETRIES")) {
            if let Ok(n) = v.parse() {
                self.retry.max_retries = n;
            }
        }
        if let Ok(v) = std::env::var(format!("{ENV_PREFIX}SYNC_STRATEGY")) {
            self.sync_strategy = match v.as_str() {
                "github-wins" => SyncStrategy::GithubWins,
                "beads-wins" => SyncStrategy::BeadsWins,
                _ => SyncStrategy::NewestWins,
            };
        }
    }
}

fn default_config_path() -> PathBuf {
    std::env::var("DISPATCH_CONFIG_PATH")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("dispatch.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_uses_newest_wins() {
        let config = DispatchConfig::default();
        assert_eq!(config.sync_strategy, SyncStrategy::NewestWins);
        assert_eq!(config.retry.max_retries, 3);
    }

    #[test]
    fn priority_map_round_trips() {
        let map = PriorityMap::default();
        assert_eq!(map.label_for(0), Some("P0"));
        assert_eq!(map.priority_for("P3"), Some(3));
        assert_eq!(map.priority_for("unknown"), None);
    }

    #[test]
    fn load_missing_file_falls_back_to_defaults() {
        let config = DispatchConfig::load("/nonexistent/dispatch.toml").unwrap();
        assert_eq!(config.http_bind, "0.0.0.0:8080");
    }

    #[test]
    fn load_overlays_file_contents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dispatch.toml");
        std::fs::write(&path, "http_bind = \"127.0.0.1:9090\"\n").unwrap();
        let config = DispatchConfig::load(&path).unwrap();
        assert_eq!(config.http_bind, "127.0.0.1:9090");
    }
}
