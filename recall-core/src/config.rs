//! Configuration for the recall system.
//!
//! Maps directly to `recall.toml`:
//!
//! ```toml
//! [general]
//! log_level = "info"
//!
//! [persistence]
//! backend = "sqlite"
//! path = "recall.db"
//! debounce_ms = 2000
//!
//! [tracking]
//! documents = ["notes/rust.md"]
//! stale_policy = "retain"
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::store::FlushPolicy;

/// Top-level recall configuration, loadable from TOML.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecallConfig {
    /// General settings.
    #[serde(default)]
    pub general: GeneralConfig,
    /// Durable storage settings.
    #[serde(default)]
    pub persistence: PersistenceConfig,
    /// Tracked documents and reconciliation policy.
    #[serde(default)]
    pub tracking: TrackingConfig,
}

impl RecallConfig {
    /// Load configuration from a TOML string.
    ///
    /// # Errors
    /// Returns `RecallError::Config` if the TOML is invalid.
    pub fn from_toml(toml_str: &str) -> crate::error::Result<Self> {
        toml::from_str(toml_str).map_err(|e| crate::RecallError::Config(e.to_string()))
    }

    /// Load configuration from a TOML file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> crate::error::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Render the configuration as TOML.
    ///
    /// # Errors
    /// Returns `RecallError::Config` if serialization fails.
    pub fn to_toml(&self) -> crate::error::Result<String> {
        toml::to_string_pretty(self).map_err(|e| crate::RecallError::Config(e.to_string()))
    }

    /// Write the configuration to `path` as TOML.
    ///
    /// # Errors
    /// Returns an error if serialization or the write fails.
    pub fn save(&self, path: &Path) -> crate::error::Result<()> {
        std::fs::write(path, self.to_toml()?)?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Sub-configs
// ---------------------------------------------------------------------------

/// General system settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Log level: trace, debug, info, warn, error.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

/// Which durable backend holds the card snapshot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Single-table SQLite database.
    #[default]
    Sqlite,
    /// Checksummed JSON file.
    Json,
}

/// Persistence / flush configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistenceConfig {
    /// Backend: "sqlite" or "json".
    #[serde(default)]
    pub backend: BackendKind,
    /// Location of the snapshot file.
    #[serde(default = "default_path")]
    pub path: PathBuf,
    /// Use WAL mode (sqlite backend).
    #[serde(default = "default_true")]
    pub wal_mode: bool,
    /// Verify snapshot checksums (json backend).
    #[serde(default = "default_true")]
    pub checksum_enabled: bool,
    /// Rotating backups kept on close (sqlite backend); 0 disables them.
    #[serde(default)]
    pub backup_count: u32,
    /// Quiet period after the last mutation before a flush.
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
    /// Longest a mutation may wait for a flush while mutations keep coming.
    #[serde(default = "default_max_coalesce_ms")]
    pub max_coalesce_ms: u64,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::Sqlite,
            path: default_path(),
            wal_mode: true,
            checksum_enabled: true,
            backup_count: 0,
            debounce_ms: default_debounce_ms(),
            max_coalesce_ms: default_max_coalesce_ms(),
        }
    }
}

impl PersistenceConfig {
    /// Flush timing derived from this configuration.
    #[must_use]
    pub fn flush_policy(&self) -> FlushPolicy {
        FlushPolicy::new(
            Duration::from_millis(self.debounce_ms),
            Duration::from_millis(self.max_coalesce_ms),
        )
    }
}

/// What reconciliation does with cards whose heading disappeared.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StalePolicy {
    /// Keep them, with their review history, indefinitely.
    #[default]
    Retain,
    /// Delete them during reconciliation.
    Delete,
}

/// The set of documents opted into review.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackingConfig {
    /// Tracked document paths, in the order they were tracked.
    #[serde(default)]
    pub documents: Vec<String>,
    /// Handling of cards whose heading is gone.
    #[serde(default)]
    pub stale_policy: StalePolicy,
}

impl TrackingConfig {
    /// Whether `path` is tracked.
    #[must_use]
    pub fn is_tracked(&self, path: &str) -> bool {
        self.documents.iter().any(|d| d == path)
    }

    /// Start tracking `path`; returns `false` if it already was.
    pub fn track(&mut self, path: &str) -> bool {
        if self.is_tracked(path) {
            return false;
        }
        self.documents.push(path.to_string());
        true
    }

    /// Stop tracking `path`; returns `false` if it was not tracked.
    pub fn untrack(&mut self, path: &str) -> bool {
        let before = self.documents.len();
        self.documents.retain(|d| d != path);
        self.documents.len() != before
    }

    /// Replace `old` with `new`; returns `false` if `old` was not tracked.
    pub fn rename(&mut self, old: &str, new: &str) -> bool {
        if !self.untrack(old) {
            return false;
        }
        self.track(new);
        true
    }
}

// ---------------------------------------------------------------------------
// Serde default helpers
// ---------------------------------------------------------------------------

fn default_true() -> bool { true }
fn default_log_level() -> String { "info".to_string() }
fn default_path() -> PathBuf { PathBuf::from("recall.db") }
fn default_debounce_ms() -> u64 { 2000 }
fn default_max_coalesce_ms() -> u64 { 10_000 }

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_toml_gives_defaults() {
        let config = RecallConfig::from_toml("").expect("parse");
        assert_eq!(config, RecallConfig::default());
        assert_eq!(config.persistence.backend, BackendKind::Sqlite);
        assert_eq!(config.persistence.debounce_ms, 2000);
        assert_eq!(config.tracking.stale_policy, StalePolicy::Retain);
    }

    #[test]
    fn partial_sections_fill_in_defaults() {
        let config = RecallConfig::from_toml(
            r#"
            [persistence]
            backend = "json"
            path = "state/cards.json"

            [tracking]
            documents = ["a.md", "b.md"]
            stale_policy = "delete"
            "#,
        )
        .expect("parse");
        assert_eq!(config.persistence.backend, BackendKind::Json);
        assert_eq!(config.persistence.path, PathBuf::from("state/cards.json"));
        assert!(config.persistence.wal_mode);
        assert_eq!(config.tracking.documents, vec!["a.md", "b.md"]);
        assert_eq!(config.tracking.stale_policy, StalePolicy::Delete);
        assert_eq!(config.general.log_level, "info");
    }

    #[test]
    fn invalid_toml_is_config_error() {
        let err = RecallConfig::from_toml("[persistence]\nbackend = 'floppy'").expect_err("bad backend");
        assert!(matches!(err, crate::RecallError::Config(_)));
    }

    #[test]
    fn save_and_reload() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("recall.toml");
        let mut config = RecallConfig::default();
        config.tracking.track("notes/x.md");
        config.save(&path).expect("save");
        assert_eq!(RecallConfig::from_file(&path).expect("load"), config);
    }

    #[test]
    fn tracking_list_operations() {
        let mut t = TrackingConfig::default();
        assert!(t.track("a.md"));
        assert!(!t.track("a.md"));
        assert!(t.track("b.md"));
        assert!(t.rename("a.md", "c.md"));
        assert!(!t.rename("zzz.md", "y.md"));
        assert_eq!(t.documents, vec!["b.md", "c.md"]);
        assert!(t.untrack("b.md"));
        assert!(!t.untrack("b.md"));
        assert!(t.is_tracked("c.md"));
    }

    #[test]
    fn flush_policy_from_config() {
        let policy = PersistenceConfig::default().flush_policy();
        assert_eq!(policy.quiet, Duration::from_secs(2));
        assert_eq!(policy.max_coalesce, Duration::from_secs(10));
    }
}
