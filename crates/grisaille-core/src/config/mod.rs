//! Configuration management for Grisaille.
//!
//! Configuration is loaded from the platform config directory with sensible
//! defaults. Paths are passed explicitly to the components that need them;
//! nothing reads ambient process state after loading.

mod types;
mod validate;

pub use types::*;

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Root configuration structure for Grisaille.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Store and archive locations
    pub storage: StorageConfig,

    /// Processing settings
    pub processing: ProcessingConfig,

    /// Default transform sequence
    pub transform: TransformConfig,

    /// Resource limits
    pub limits: LimitsConfig,

    /// Archive settings
    pub archive: ArchiveConfig,

    /// Logging settings
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from the default location.
    ///
    /// Returns default configuration if the file doesn't exist.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse and validate configuration from a TOML string.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Get the default config file path.
    ///
    /// - macOS: ~/Library/Application Support/com.grisaille.grisaille/config.toml
    /// - Linux: ~/.config/grisaille/config.toml
    /// - Windows: C:\Users\<User>\AppData\Roaming\grisaille\config\config.toml
    ///
    /// Falls back to ~/.grisaille/config.toml if directory detection fails.
    pub fn default_path() -> PathBuf {
        directories::ProjectDirs::from("com", "grisaille", "grisaille")
            .map(|dirs| dirs.config_dir().to_path_buf().join("config.toml"))
            .unwrap_or_else(|| {
                let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
                PathBuf::from(home).join(".grisaille").join("config.toml")
            })
    }

    /// Resolved content store root (with ~ expansion).
    pub fn store_dir(&self) -> PathBuf {
        expand(&self.storage.store_dir)
    }

    /// Resolved archive staging directory (with ~ expansion).
    pub fn archive_dir(&self) -> PathBuf {
        expand(&self.storage.archive_dir)
    }

    /// Serialize the config to a pretty TOML string.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::ValidationError(e.to_string()))
    }
}

fn expand(path: &Path) -> PathBuf {
    let path_str = path.to_string_lossy();
    PathBuf::from(shellexpand::tilde(&path_str).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::Operation;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.processing.parallel_workers >= 1);
        assert_eq!(config.limits.max_file_size_mb, 100);
        assert_eq!(config.archive.compression_level, 6);
        assert_eq!(config.transform.operations, Operation::default_sequence());
    }

    #[test]
    fn test_config_to_toml_roundtrip() {
        let config = Config::default();
        let toml = config.to_toml().unwrap();
        assert!(toml.contains("[storage]"));
        assert!(toml.contains("[processing]"));

        let parsed = Config::from_toml(&toml).unwrap();
        assert_eq!(parsed.transform.operations, config.transform.operations);
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config = Config::from_toml(
            r#"
            [processing]
            parallel_workers = 2

            [[transform.operations]]
            op = "adjust_contrast"
            factor = 1.2
            "#,
        )
        .unwrap();
        assert_eq!(config.processing.parallel_workers, 2);
        assert_eq!(
            config.transform.operations,
            vec![Operation::AdjustContrast { factor: 1.2 }]
        );
        assert_eq!(config.limits.max_image_dimension, 10000);
    }

    #[test]
    fn test_tilde_expansion() {
        let mut config = Config::default();
        config.storage.store_dir = PathBuf::from("/srv/images");
        assert_eq!(config.store_dir(), PathBuf::from("/srv/images"));
        assert!(!config.archive_dir().to_string_lossy().starts_with('~'));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[archive]\ncompression_level = 9\n").unwrap();
        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.archive.compression_level, 9);
    }
}
