use super::{BufferConfig, ConfigError};
use std::time::Duration;

impl BufferConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.size == Some(0) {
            return Err(ConfigError::InvalidConfig(
                "Buffer size must be greater than 0".to_string(),
            ));
        }

        if self.ttl == Some(Duration::ZERO) {
            return Err(ConfigError::InvalidConfig(
                "Flush ttl must be greater than 0".to_string(),
            ));
        }

        if self.file_size_limit == 0 {
            return Err(ConfigError::InvalidConfig(
                "File size limit must be greater than 0".to_string(),
            ));
        }

        if self.line_separator.as_deref() == Some("") {
            return Err(ConfigError::InvalidConfig(
                "Line separator cannot be empty".to_string(),
            ));
        }

        if let Some(filename) = &self.filename
            && filename.as_os_str().is_empty()
        {
            return Err(ConfigError::InvalidConfig(
                "Target filename cannot be empty".to_string(),
            ));
        }

        Ok(())
    }
}
