//! Configuration management for omnidict.
//!
//! Handles loading, saving, and validating configuration from
//! platform-specific config directories.

use crate::dictionaries::SourceId;
use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Application name used for config directory.
const APP_NAME: &str = "Omnidict";

/// Default config filename.
const CONFIG_FILENAME: &str = "config.toml";

/// Main configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Lookup behavior settings.
    pub lookup: LookupConfig,

    /// File paths.
    pub paths: PathsConfig,
}

/// Lookup behavior configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LookupConfig {
    /// Upper bound on concurrently running source lookups.
    pub max_concurrent_lookups: usize,

    /// HTTP request timeout in seconds.
    pub request_timeout_sec: u64,

    /// Delay before each remote fetch in seconds.
    pub delay_between_requests_sec: f64,

    /// Dictionary sources queried by a lookup.
    pub sources: Vec<String>,
}

impl Default for LookupConfig {
    fn default() -> Self {
        Self {
            max_concurrent_lookups: 8,
            request_timeout_sec: 30,
            delay_between_requests_sec: 0.0,
            sources: SourceId::ALL.iter().map(|s| s.as_str().to_string()).collect(),
        }
    }
}

/// File path configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Directory holding one cache database per source.
    pub cache_directory: Option<PathBuf>,
}

impl Config {
    /// Returns the platform-specific config directory path.
    pub fn config_dir() -> Result<PathBuf, ConfigError> {
        dirs::config_dir()
            .map(|p| p.join(APP_NAME))
            .ok_or(ConfigError::NoConfigDir)
    }

    /// Returns the full path to the config file.
    pub fn config_path() -> Result<PathBuf, ConfigError> {
        Ok(Self::config_dir()?.join(CONFIG_FILENAME))
    }

    /// Loads configuration from the default location.
    ///
    /// If the config file doesn't exist, creates a default one.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::config_path()?;
        Self::load_from(&path)
    }

    /// Loads configuration from a specific path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            let config = Config::default();
            config.save_to(path)?;
            return Ok(config);
        }

        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Saves configuration to a specific path.
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content =
            toml::to_string_pretty(self).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        std::fs::write(path, content)?;
        Ok(())
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.lookup.max_concurrent_lookups == 0 {
            return Err(invalid("lookup.max_concurrent_lookups", "must be greater than 0"));
        }

        if self.lookup.request_timeout_sec == 0 {
            return Err(invalid("lookup.request_timeout_sec", "must be greater than 0"));
        }

        if !(self.lookup.delay_between_requests_sec >= 0.0) {
            return Err(invalid(
                "lookup.delay_between_requests_sec",
                "must be zero or positive",
            ));
        }

        self.source_ids().map(|_| ())
    }

    /// Parses the configured source list, rejecting unknown and repeated names.
    pub fn source_ids(&self) -> Result<Vec<SourceId>, ConfigError> {
        if self.lookup.sources.is_empty() {
            return Err(invalid("lookup.sources", "at least one source is required"));
        }

        let mut seen = HashSet::new();
        let mut ids = Vec::with_capacity(self.lookup.sources.len());
        for name in &self.lookup.sources {
            let id: SourceId = name
                .parse()
                .map_err(|_| invalid("lookup.sources", &format!("unknown source '{}'", name)))?;
            if !seen.insert(id) {
                return Err(invalid("lookup.sources", &format!("'{}' listed twice", name)));
            }
            ids.push(id);
        }
        Ok(ids)
    }

    /// Returns the effective cache directory, using config or default.
    pub fn cache_dir(&self) -> Result<PathBuf, ConfigError> {
        if let Some(ref dir) = self.paths.cache_directory {
            Ok(dir.clone())
        } else {
            Ok(Self::config_dir()?.join("cache"))
        }
    }
}

fn invalid(key: &str, message: &str) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        message: message.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.lookup.max_concurrent_lookups, 8);
        assert_eq!(config.lookup.sources, vec!["webster", "cambridge", "soha"]);
        assert!(config.paths.cache_directory.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_creates_default_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join(CONFIG_FILENAME);

        let config = Config::load_from(&path).unwrap();
        assert!(path.exists());
        assert_eq!(config.lookup.request_timeout_sec, 30);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_FILENAME);
        std::fs::write(&path, "[lookup]\nsources = [\"soha\"]\n").unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.source_ids().unwrap(), vec![SourceId::Soha]);
        assert_eq!(config.lookup.max_concurrent_lookups, 8);
    }

    #[test]
    fn test_unknown_source_rejected() {
        let mut config = Config::default();
        config.lookup.sources = vec!["webster".to_string(), "oxford".to_string()];
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_duplicate_source_rejected() {
        let mut config = Config::default();
        config.lookup.sources = vec!["soha".to_string(), "soha".to_string()];
        assert!(config.source_ids().is_err());
    }

    #[test]
    fn test_zero_concurrency_rejected() {
        let mut config = Config::default();
        config.lookup.max_concurrent_lookups = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_explicit_cache_dir() {
        let mut config = Config::default();
        config.paths.cache_directory = Some(PathBuf::from("/tmp/omnidict-cache"));
        assert_eq!(
            config.cache_dir().unwrap(),
            PathBuf::from("/tmp/omnidict-cache")
        );
    }
}
