//! Configuration validation with range checks.

use crate::error::ConfigError;

use super::Config;

impl Config {
    /// Validate configuration values are within acceptable ranges.
    pub(crate) fn validate(&self) -> Result<(), ConfigError> {
        if self.processing.parallel_workers == 0 {
            return Err(ConfigError::ValidationError(
                "processing.parallel_workers must be > 0".into(),
            ));
        }
        if self.limits.max_file_size_mb == 0 {
            return Err(ConfigError::ValidationError(
                "limits.max_file_size_mb must be > 0".into(),
            ));
        }
        if self.limits.max_image_dimension == 0 {
            return Err(ConfigError::ValidationError(
                "limits.max_image_dimension must be > 0".into(),
            ));
        }
        if self.archive.compression_level > 9 {
            return Err(ConfigError::ValidationError(
                "archive.compression_level must be between 0 and 9".into(),
            ));
        }
        for (index, op) in self.transform.operations.iter().enumerate() {
            op.check(self.limits.max_image_dimension).map_err(|message| {
                ConfigError::ValidationError(format!("transform.operations[{index}]: {message}"))
            })?;
        }
        Ok(())
    }
}
