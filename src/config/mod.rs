mod cli;
pub mod serde_helpers;
mod validation;

use crate::writer::RotationKind;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use serde_helpers::{load_env_raw_opt, load_env_var, load_env_var_opt};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

pub use cli::Cli;

/// Flush interval used when neither `ttl` nor `size` is configured.
pub const DEFAULT_TTL: Duration = Duration::from_millis(1000);
/// Target file size at which the rotation policy takes over (2 MiB).
pub const DEFAULT_FILE_SIZE_LIMIT: u64 = 2 * 1024 * 1024;

#[cfg(windows)]
pub const PLATFORM_LINE_ENDING: &str = "\r\n";
#[cfg(not(windows))]
pub const PLATFORM_LINE_ENDING: &str = "\n";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("File error: {0}")]
    FileError(#[from] std::io::Error),
    #[error("Parse error: {0}")]
    ParseError(#[from] toml::de::Error),
    #[error("Environment error: {0}")]
    EnvError(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<LogLevel> for tracing::Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Error => tracing::Level::ERROR,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Trace => tracing::Level::TRACE,
        }
    }
}

/// When a buffer flushes on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushMode {
    /// Flush `ttl` after the first push into an empty buffer.
    Ttl(Duration),
    /// Flush synchronously once the content would reach this many bytes.
    Size(usize),
}

/// Buffer settings. Fixed once a buffer is built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BufferConfig {
    /// Flush interval. Ignored when `size` is set.
    #[serde(rename = "ttl_ms", with = "serde_helpers::option_millis")]
    pub ttl: Option<Duration>,
    pub size: Option<usize>,
    /// Target file; the console when unset.
    pub filename: Option<PathBuf>,
    pub file_size_limit: u64,
    /// Defaults to the platform line ending for files and `"\n"` for the console.
    pub line_separator: Option<String>,
    pub rotation: RotationKind,
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            ttl: None,
            size: None,
            filename: None,
            file_size_limit: DEFAULT_FILE_SIZE_LIMIT,
            line_separator: None,
            rotation: RotationKind::Overwrite,
        }
    }
}

impl BufferConfig {
    pub fn console() -> Self {
        Self::default()
    }

    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self {
            filename: Some(path.into()),
            ..Self::default()
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    pub fn with_size(mut self, size: usize) -> Self {
        self.size = Some(size);
        self
    }

    pub fn with_file_size_limit(mut self, limit: u64) -> Self {
        self.file_size_limit = limit;
        self
    }

    pub fn with_line_separator(mut self, separator: impl Into<String>) -> Self {
        self.line_separator = Some(separator.into());
        self
    }

    pub fn with_rotation(mut self, rotation: RotationKind) -> Self {
        self.rotation = rotation;
        self
    }

    /// `size` wins over `ttl` when both are set.
    pub fn flush_mode(&self) -> FlushMode {
        match (self.size, self.ttl) {
            (Some(size), Some(ttl)) => {
                warn!(
                    "Both ttl ({}ms) and size ({} bytes) configured; size takes precedence",
                    ttl.as_millis(),
                    size
                );
                FlushMode::Size(size)
            }
            (Some(size), None) => FlushMode::Size(size),
            (None, ttl) => FlushMode::Ttl(ttl.unwrap_or(DEFAULT_TTL)),
        }
    }

    pub fn effective_separator(&self) -> &str {
        match (&self.line_separator, &self.filename) {
            (Some(separator), _) => separator,
            (None, Some(_)) => PLATFORM_LINE_ENDING,
            (None, None) => "\n",
        }
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: BufferConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = BufferConfig::default();

        let mut ttl_ms: Option<u64> = None;
        load_env_var_opt("OUTPUT_BUFFER_TTL_MS", &mut ttl_ms)?;
        config.ttl = ttl_ms.map(Duration::from_millis);
        load_env_var_opt("OUTPUT_BUFFER_SIZE", &mut config.size)?;
        load_env_raw_opt("OUTPUT_BUFFER_FILE", &mut config.filename);
        load_env_var("OUTPUT_BUFFER_FILE_SIZE_LIMIT", &mut config.file_size_limit)?;
        load_env_raw_opt("OUTPUT_BUFFER_EOL", &mut config.line_separator);
        config.line_separator = config.line_separator.as_deref().map(unescape_separator);

        if let Ok(rotation) = std::env::var("OUTPUT_BUFFER_ROTATION") {
            config.rotation = match rotation.to_lowercase().as_str() {
                "overwrite" => RotationKind::Overwrite,
                "archive" => RotationKind::Archive,
                _ => {
                    return Err(ConfigError::EnvError(format!(
                        "Invalid OUTPUT_BUFFER_ROTATION: {rotation}. Valid values: overwrite, archive"
                    )));
                }
            };
        }

        config.validate()?;
        Ok(config)
    }
}

/// Turns the literal escapes `\n`, `\r` and `\t` into their characters, so
/// separators can be passed through flags and environment variables.
pub fn unescape_separator(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('t') => out.push('\t'),
            Some('\\') => out.push('\\'),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}
