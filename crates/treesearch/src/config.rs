use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{IndexError, Result};

pub const DEFAULT_OPTION_MARKER: char = '/';

/// Engine configuration. Every field falls back to its default when absent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub option_marker: char,
    pub normalize_cache_enabled: bool,
    pub normalize_cache_expiry_secs: u64,
    pub normalize_cache_sweep_secs: u64,
    pub watch: bool,
    pub include_hidden: bool,
    pub exclude_directories: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            option_marker: DEFAULT_OPTION_MARKER,
            normalize_cache_enabled: true,
            normalize_cache_expiry_secs: 60,
            normalize_cache_sweep_secs: 30,
            watch: true,
            include_hidden: true,
            exclude_directories: false,
        }
    }
}

impl EngineConfig {
    pub fn from_json_str(raw: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(raw)
            .map_err(|error| IndexError::Config(format!("failed to parse config: {error}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(IndexError::PathNotFound(path.to_path_buf()));
        }
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    fn validate(&self) -> Result<()> {
        if self.option_marker.is_whitespace() || self.option_marker == '"' {
            return Err(IndexError::Config(format!(
                "option marker {:?} collides with the query tokenizer",
                self.option_marker
            )));
        }
        Ok(())
    }

    pub fn normalize_cache_expiry(&self) -> Duration {
        Duration::from_secs(self.normalize_cache_expiry_secs)
    }

    pub fn normalize_cache_sweep(&self) -> Duration {
        Duration::from_secs(self.normalize_cache_sweep_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_use_defaults() {
        let config = EngineConfig::from_json_str(r#"{ "watch": false }"#).unwrap();
        assert!(!config.watch);
        assert_eq!(config.option_marker, '/');
        assert_eq!(config.normalize_cache_expiry_secs, 60);
    }

    #[test]
    fn whitespace_marker_is_rejected() {
        let error = EngineConfig::from_json_str(r#"{ "option_marker": " " }"#).unwrap_err();
        assert!(matches!(error, IndexError::Config(_)));
    }

    #[test]
    fn load_reads_file() {
        let temp = tempfile::TempDir::new().unwrap();
        let path = temp.path().join("engine.json");
        std::fs::write(&path, r#"{ "option_marker": "-", "include_hidden": false }"#).unwrap();
        let config = EngineConfig::load(&path).unwrap();
        assert_eq!(config.option_marker, '-');
        assert!(!config.include_hidden);
    }

    #[test]
    fn load_missing_file_reports_path() {
        let error = EngineConfig::load(Path::new("/definitely/not/here.json")).unwrap_err();
        assert!(matches!(error, IndexError::PathNotFound(_)));
    }
}
