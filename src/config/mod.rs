//! Container configuration
//!
//! Settings are read from a [`ConfigSource`], a string key/value store that can
//! be filled from the process environment or programmatically, and parsed into
//! a typed [`MelderConfig`].

use crate::error::{MelderError, Result};
use dashmap::DashMap;
use std::env;
use std::sync::Arc;

/// Enables the instance metadata side table.
pub const DEBUG_KEY: &str = "MELDER_DEBUG";
/// Enables disposal tracking.
pub const DISPOSAL_KEY: &str = "MELDER_DISPOSAL";
/// Bounds the depth of a single resolution.
pub const MAX_DEPTH_KEY: &str = "MELDER_MAX_DEPTH";

const ENV_PREFIX: &str = "MELDER_";

/// Raw configuration values
#[derive(Clone, Default)]
pub struct ConfigSource {
    values: Arc<DashMap<String, String>>,
}

impl ConfigSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load every `MELDER_*` variable of the current process.
    pub fn from_env() -> Self {
        let source = Self::default();
        for (key, value) in env::vars().filter(|(key, _)| key.starts_with(ENV_PREFIX)) {
            source.set(&key, &value);
        }
        source
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.values.get(key).map(|v| v.clone())
    }

    pub fn set(&self, key: &str, value: &str) {
        self.values.insert(key.to_string(), value.to_string());
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Typed container settings. Frozen once the container is built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MelderConfig {
    /// Record creation metadata for every instance.
    pub debugging: bool,
    /// Track disposable instances and dispose them on seal.
    pub disposal: bool,
    /// Longest dependency chain a single resolution may follow.
    pub max_resolution_depth: usize,
}

impl Default for MelderConfig {
    fn default() -> Self {
        Self {
            debugging: false,
            disposal: true,
            max_resolution_depth: 128,
        }
    }
}

impl MelderConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_source(&ConfigSource::from_env())
    }

    /// Parse a source. Missing keys keep their defaults.
    pub fn from_source(source: &ConfigSource) -> Result<Self> {
        let mut config = Self::default();

        if let Some(value) = source.get(DEBUG_KEY) {
            config.debugging = parse_bool(DEBUG_KEY, &value)?;
        }
        if let Some(value) = source.get(DISPOSAL_KEY) {
            config.disposal = parse_bool(DISPOSAL_KEY, &value)?;
        }
        if let Some(value) = source.get(MAX_DEPTH_KEY) {
            config.max_resolution_depth = value
                .trim()
                .parse()
                .map_err(|e| MelderError::invalid_config(MAX_DEPTH_KEY, format!("'{}': {}", value, e)))?;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_resolution_depth == 0 {
            return Err(MelderError::invalid_config(MAX_DEPTH_KEY, "must be greater than zero"));
        }
        Ok(())
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(MelderError::invalid_config(key, format!("'{}' is not a boolean", value))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_when_empty() {
        let config = MelderConfig::from_source(&ConfigSource::new()).unwrap();
        assert_eq!(config, MelderConfig::default());
        assert!(!config.debugging);
        assert!(config.disposal);
        assert_eq!(config.max_resolution_depth, 128);
    }

    #[test]
    fn test_parse_values() {
        let source = ConfigSource::new();
        source.set(DEBUG_KEY, "Yes");
        source.set(DISPOSAL_KEY, "off");
        source.set(MAX_DEPTH_KEY, " 16 ");

        let config = MelderConfig::from_source(&source).unwrap();
        assert!(config.debugging);
        assert!(!config.disposal);
        assert_eq!(config.max_resolution_depth, 16);
    }

    #[test]
    fn test_rejects_malformed_values() {
        let source = ConfigSource::new();
        source.set(DEBUG_KEY, "maybe");
        let err = MelderConfig::from_source(&source).unwrap_err();
        assert!(matches!(err, MelderError::InvalidConfig { ref key, .. } if key == DEBUG_KEY));

        let source = ConfigSource::new();
        source.set(MAX_DEPTH_KEY, "-3");
        assert!(MelderConfig::from_source(&source).is_err());

        let source = ConfigSource::new();
        source.set(MAX_DEPTH_KEY, "0");
        assert!(MelderConfig::from_source(&source).is_err());
    }

    #[test]
    fn test_source_is_shared_between_clones() {
        let source = ConfigSource::new();
        let clone = source.clone();
        clone.set("MELDER_DEBUG", "1");
        assert_eq!(source.get("MELDER_DEBUG").as_deref(), Some("1"));
        assert_eq!(source.len(), 1);
    }
}
