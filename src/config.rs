//! Runtime settings: worker-pool sizes, query budget and thumbnail retention.
//!
//! Values are resolved once with priority environment variables > config
//! file > defaults. Engines copy what they need at construction, so a
//! running query never observes a change.

use crate::utils::get_config_path;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Default per-query budget in milliseconds
pub const DEFAULT_QUERY_TIMEOUT_MS: u64 = 30_000;

/// Default number of records between two progress reports during a build
pub const DEFAULT_PROGRESS_INTERVAL: usize = 4096;

/// Persisted application settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    /// Search worker threads (0 = derived from the processor count)
    #[serde(default)]
    pub search_threads: usize,

    /// Sort worker threads (0 = derived from the processor count)
    #[serde(default)]
    pub sort_threads: usize,

    /// Thumbnail worker threads (0 = derived from the processor count)
    #[serde(default)]
    pub thumbnail_threads: usize,

    /// Whole-query budget in milliseconds (0 = unbounded)
    #[serde(default = "default_query_timeout_ms")]
    pub query_timeout_ms: u64,

    /// Decoded thumbnails kept in memory before eviction, in MiB
    #[serde(default = "default_thumbnail_retention_mb")]
    pub thumbnail_retention_mb: usize,

    /// Decoded thumbnails kept in memory before eviction, by count
    #[serde(default = "default_thumbnail_retention_count")]
    pub thumbnail_retention_count: usize,

    /// Records between two progress callbacks while building a hash database
    #[serde(default = "default_progress_interval")]
    pub progress_interval: usize,
}

fn default_query_timeout_ms() -> u64 {
    DEFAULT_QUERY_TIMEOUT_MS
}

fn default_thumbnail_retention_mb() -> usize {
    256
}

fn default_thumbnail_retention_count() -> usize {
    512
}

fn default_progress_interval() -> usize {
    DEFAULT_PROGRESS_INTERVAL
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            search_threads: 0,
            sort_threads: 0,
            thumbnail_threads: 0,
            query_timeout_ms: default_query_timeout_ms(),
            thumbnail_retention_mb: default_thumbnail_retention_mb(),
            thumbnail_retention_count: default_thumbnail_retention_count(),
            progress_interval: default_progress_interval(),
        }
    }
}

impl Settings {
    /// Load settings with priority: environment variables > config file > defaults
    pub fn load() -> Result<Self> {
        let config_path = get_config_path()?;
        let mut settings = Self::load_from(&config_path)?;
        settings.apply_env();
        Ok(settings)
    }

    /// Load settings from an explicit file, or defaults if it does not exist
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path).context("Failed to read config file")?;
        let settings: Settings =
            serde_json::from_str(&content).context("Failed to parse config file")?;
        Ok(settings)
    }

    /// Save settings to the app data directory
    pub fn save(&self) -> Result<()> {
        let config_path = get_config_path()?;
        let content = serde_json::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(&config_path, content).context("Failed to write config file")?;
        Ok(())
    }

    fn apply_env(&mut self) {
        self.apply_vars(|key| std::env::var(key).ok());
    }

    fn apply_vars(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(n) = lookup("PACKSCOPE_SEARCH_THREADS").and_then(|v| v.parse().ok()) {
            self.search_threads = n;
        }
        if let Some(n) = lookup("PACKSCOPE_SORT_THREADS").and_then(|v| v.parse().ok()) {
            self.sort_threads = n;
        }
        if let Some(n) = lookup("PACKSCOPE_THUMBNAIL_THREADS").and_then(|v| v.parse().ok()) {
            self.thumbnail_threads = n;
        }
        if let Some(ms) = lookup("PACKSCOPE_QUERY_TIMEOUT_MS").and_then(|v| v.parse().ok()) {
            self.query_timeout_ms = ms;
        }
    }

    /// Effective search pool size
    pub fn effective_search_threads(&self) -> usize {
        resolve_threads(self.search_threads, num_cpus())
    }

    /// Effective sort pool size; sorting gets half the cores by default
    pub fn effective_sort_threads(&self) -> usize {
        resolve_threads(self.sort_threads, (num_cpus() / 2).max(1))
    }

    /// Effective thumbnail pool size; a quarter of the cores by default
    pub fn effective_thumbnail_threads(&self) -> usize {
        resolve_threads(self.thumbnail_threads, (num_cpus() / 4).max(1))
    }

    /// Whole-query budget, `None` when unbounded
    pub fn query_timeout(&self) -> Option<Duration> {
        (self.query_timeout_ms > 0).then(|| Duration::from_millis(self.query_timeout_ms))
    }

    /// Thumbnail retention threshold in bytes
    pub fn thumbnail_retention_bytes(&self) -> u64 {
        self.thumbnail_retention_mb as u64 * 1024 * 1024
    }
}

fn resolve_threads(configured: usize, fallback: usize) -> usize {
    if configured == 0 { fallback } else { configured }
}

/// Get the number of CPUs available
fn num_cpus() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_settings_default() {
        let settings = Settings::default();
        assert_eq!(settings.search_threads, 0);
        assert_eq!(settings.query_timeout_ms, DEFAULT_QUERY_TIMEOUT_MS);
        assert_eq!(settings.progress_interval, DEFAULT_PROGRESS_INTERVAL);
    }

    #[test]
    fn test_effective_threads() {
        let mut settings = Settings::default();
        assert!(settings.effective_search_threads() >= 1);
        assert!(settings.effective_sort_threads() >= 1);
        assert!(settings.effective_thumbnail_threads() >= 1);

        settings.search_threads = 3;
        assert_eq!(settings.effective_search_threads(), 3);
    }

    #[test]
    fn test_query_timeout_zero_is_unbounded() {
        let mut settings = Settings::default();
        assert_eq!(settings.query_timeout(), Some(Duration::from_secs(30)));
        settings.query_timeout_ms = 0;
        assert_eq!(settings.query_timeout(), None);
    }

    #[test]
    fn test_partial_json() {
        let json = r#"{"search_threads": 6}"#;
        let settings: Settings = serde_json::from_str(json).unwrap();
        assert_eq!(settings.search_threads, 6);
        assert_eq!(settings.query_timeout_ms, DEFAULT_QUERY_TIMEOUT_MS);
        assert_eq!(settings.thumbnail_retention_count, 512);
    }

    #[test]
    fn test_empty_json() {
        let settings: Settings = serde_json::from_str("{}").unwrap();
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = [
            ("PACKSCOPE_SEARCH_THREADS", "2"),
            ("PACKSCOPE_QUERY_TIMEOUT_MS", "50"),
            ("PACKSCOPE_SORT_THREADS", "not-a-number"),
        ]
        .into_iter()
        .collect();

        let mut settings = Settings::default();
        settings.apply_vars(|key| vars.get(key).map(|v| v.to_string()));

        assert_eq!(settings.search_threads, 2);
        assert_eq!(settings.query_timeout_ms, 50);
        assert_eq!(settings.sort_threads, 0);
    }

    #[test]
    fn test_load_from_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings::load_from(&dir.path().join("config.json")).unwrap();
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{"sort_threads": 1, "query_timeout_ms": 0}"#).unwrap();

        let settings = Settings::load_from(&path).unwrap();
        assert_eq!(settings.sort_threads, 1);
        assert_eq!(settings.query_timeout(), None);
    }
}
