use super::{BufferConfig, ConfigError, LogLevel, unescape_separator};
use crate::writer::RotationKind;
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug, Clone)]
#[command(
    author,
    version,
    about = "Coalesce stdin lines into buffered console or file writes",
    long_about = None
)]
pub struct Cli {
    /// Flush interval in milliseconds (ignored when --size is set)
    #[arg(long, env = "OUTPUT_BUFFER_TTL_MS")]
    pub ttl_ms: Option<u64>,

    /// Flush as soon as the buffered content reaches this many bytes
    #[arg(long, env = "OUTPUT_BUFFER_SIZE")]
    pub size: Option<usize>,

    /// Target file (writes to stdout when omitted)
    #[arg(long, short = 'f', env = "OUTPUT_BUFFER_FILE")]
    pub file: Option<PathBuf>,

    /// Target file size in bytes at which the rotation policy runs
    #[arg(long, env = "OUTPUT_BUFFER_FILE_SIZE_LIMIT")]
    pub file_size_limit: Option<u64>,

    /// Separator between pushed lines; accepts \n, \r and \t escapes
    #[arg(long, env = "OUTPUT_BUFFER_EOL")]
    pub eol: Option<String>,

    /// What to do when the target file reaches its size limit
    #[arg(long, env = "OUTPUT_BUFFER_ROTATION", value_enum)]
    pub rotation: Option<RotationKind>,

    /// TOML configuration file; flags override its values
    #[arg(long, env = "OUTPUT_BUFFER_CONFIG")]
    pub config: Option<PathBuf>,

    /// Log level
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: LogLevel,
}

impl Cli {
    pub fn from_args<I, T>(args: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        Cli::try_parse_from(args).map_err(|e| ConfigError::InvalidConfig(e.to_string()))
    }

    /// Resolve the buffer configuration: the config file (if any) first, then
    /// every flag that was given on top of it.
    pub fn buffer_config(&self) -> Result<BufferConfig, ConfigError> {
        let mut config = match &self.config {
            Some(path) => BufferConfig::from_file(path)?,
            None => BufferConfig::default(),
        };

        if let Some(ttl_ms) = self.ttl_ms {
            config.ttl = Some(Duration::from_millis(ttl_ms));
        }
        if let Some(size) = self.size {
            config.size = Some(size);
        }
        if let Some(file) = &self.file {
            config.filename = Some(file.clone());
        }
        if let Some(limit) = self.file_size_limit {
            config.file_size_limit = limit;
        }
        if let Some(eol) = &self.eol {
            config.line_separator = Some(unescape_separator(eol));
        }
        if let Some(rotation) = self.rotation {
            config.rotation = rotation;
        }

        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_flags_map_onto_buffer_config() {
        let cli = Cli::from_args([
            "rask-output-buffer",
            "--size",
            "4096",
            "--file",
            "logs/out.log",
            "--eol",
            "\\r\\n",
            "--rotation",
            "archive",
        ])
        .unwrap();

        let config = cli.buffer_config().unwrap();
        assert_eq!(config.size, Some(4096));
        assert_eq!(config.filename, Some(PathBuf::from("logs/out.log")));
        assert_eq!(config.line_separator.as_deref(), Some("\r\n"));
        assert_eq!(config.rotation, RotationKind::Archive);
    }

    #[test]
    fn test_flags_override_config_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "ttl_ms = 200\nfile_size_limit = 512").unwrap();

        let path = file.path().to_str().unwrap().to_string();
        let cli = Cli::from_args([
            "rask-output-buffer",
            "--config",
            path.as_str(),
            "--ttl-ms",
            "50",
        ])
        .unwrap();

        let config = cli.buffer_config().unwrap();
        assert_eq!(config.ttl, Some(Duration::from_millis(50)));
        assert_eq!(config.file_size_limit, 512);
    }

    #[test]
    fn test_invalid_flag_value_is_a_config_error() {
        let result = Cli::from_args(["rask-output-buffer", "--size", "lots"]);
        assert!(matches!(result, Err(ConfigError::InvalidConfig(_))));
    }

    #[test]
    fn test_zero_size_flag_fails_validation() {
        let cli = Cli::from_args(["rask-output-buffer", "--size", "0"]).unwrap();
        assert!(cli.buffer_config().is_err());
    }
}
