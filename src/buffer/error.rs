use crate::config::ConfigError;
use crate::writer::WriteError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BufferError {
    #[error("Cannot push data after closing the buffer")]
    Closed,

    #[error(transparent)]
    Write(#[from] WriteError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Buffer requires a tokio runtime: {0}")]
    NoRuntime(String),
}

impl BufferError {
    pub fn is_closed(&self) -> bool {
        matches!(self, BufferError::Closed)
    }
}
