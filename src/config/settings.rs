//! Application configuration

use anyhow::Result;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use dashkit_core::{
    CACHE_TTL, DEFAULT_DISPLAY_HINTS, LOCAL_TABLE_READY_TIMEOUT, MIN_REFRESH_INTERVAL_SECS,
};

/// Application-wide configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Version of the config format
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default)]
    pub cache: CacheSettings,
    #[serde(default)]
    pub local_tables: LocalTableSettings,
    #[serde(default)]
    pub refresh: RefreshSettings,
    #[serde(default)]
    pub foreign_keys: ForeignKeySettings,
    /// Per card type overrides merged over the built-in default config,
    /// keyed by type key (e.g. "dataTable", "chart")
    #[serde(default)]
    pub card_defaults: HashMap<String, Value>,
}

fn default_version() -> u32 {
    1
}

impl AppConfig {
    /// Load configuration from disk, or defaults when there is no file yet
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;

        if !config_path.exists() {
            return Ok(Self::default());
        }

        Self::load_from_path(&config_path)
    }

    /// Save configuration to disk
    pub fn save(&self) -> Result<()> {
        self.save_to_path(&Self::config_path()?)
    }

    /// Get the configuration file path
    pub fn config_path() -> Result<PathBuf> {
        let dirs = directories::ProjectDirs::from("com", "dashkit", "dashkit")
            .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?;

        Ok(dirs.config_dir().join("config.json"))
    }

    /// Load configuration from a specific file path
    pub fn load_from_path(path: &PathBuf) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a specific file path
    pub fn save_to_path(&self, path: &PathBuf) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            version: default_version(),
            cache: CacheSettings::default(),
            local_tables: LocalTableSettings::default(),
            refresh: RefreshSettings::default(),
            foreign_keys: ForeignKeySettings::default(),
            card_defaults: HashMap::new(),
        }
    }
}

/// Query cache settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheSettings {
    /// Entry lifetime from insertion
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,
}

fn default_ttl_secs() -> u64 {
    CACHE_TTL.as_secs()
}

impl CacheSettings {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            ttl_secs: default_ttl_secs(),
        }
    }
}

/// Local table bus settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocalTableSettings {
    /// How long a fetch waits for an upstream table to become ready
    #[serde(default = "default_ready_timeout_ms")]
    pub ready_timeout_ms: u64,
}

fn default_ready_timeout_ms() -> u64 {
    LOCAL_TABLE_READY_TIMEOUT.as_millis() as u64
}

impl LocalTableSettings {
    pub fn ready_timeout(&self) -> Duration {
        Duration::from_millis(self.ready_timeout_ms)
    }
}

impl Default for LocalTableSettings {
    fn default() -> Self {
        Self {
            ready_timeout_ms: default_ready_timeout_ms(),
        }
    }
}

/// Auto-refresh settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefreshSettings {
    /// Smallest non-zero interval the validator accepts
    #[serde(default = "default_min_interval_secs")]
    pub min_interval_secs: u64,
}

fn default_min_interval_secs() -> u64 {
    MIN_REFRESH_INTERVAL_SECS
}

impl Default for RefreshSettings {
    fn default() -> Self {
        Self {
            min_interval_secs: default_min_interval_secs(),
        }
    }
}

/// Foreign-key display settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForeignKeySettings {
    /// Column name words that mark a display column, in priority order
    #[serde(default = "default_display_hints")]
    pub display_hints: Vec<String>,
}

fn default_display_hints() -> Vec<String> {
    DEFAULT_DISPLAY_HINTS.iter().map(|s| s.to_string()).collect()
}

impl Default for ForeignKeySettings {
    fn default() -> Self {
        Self {
            display_hints: default_display_hints(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_file_gives_defaults() {
        let config: AppConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, AppConfig::default());
        assert_eq!(config.cache.ttl(), Duration::from_secs(300));
        assert_eq!(config.local_tables.ready_timeout(), Duration::from_secs(10));
        assert_eq!(config.refresh.min_interval_secs, 5);
        assert_eq!(config.foreign_keys.display_hints[0], "name");
    }

    #[test]
    fn test_partial_sections() {
        let config: AppConfig =
            serde_json::from_str(r#"{"cache": {"ttl_secs": 60}, "local_tables": {}}"#).unwrap();
        assert_eq!(config.cache.ttl_secs, 60);
        assert_eq!(config.local_tables.ready_timeout_ms, 10_000);
    }

    #[test]
    fn test_save_and_load_path() {
        let path = std::env::temp_dir()
            .join(format!("dashkit-test-{}", uuid::Uuid::new_v4()))
            .join("config.json");
        let mut config = AppConfig::default();
        config.refresh.min_interval_secs = 15;
        config
            .card_defaults
            .insert("dataTable".into(), serde_json::json!({"pageSize": 50}));

        config.save_to_path(&path).unwrap();
        let loaded = AppConfig::load_from_path(&path).unwrap();
        assert_eq!(loaded, config);

        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }
}
