use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

/// I/O failure while delivering a flushed chunk.
///
/// Sources are held in an `Arc` so the same failure can be handed to an error
/// handler and to an awaiting `flush` caller.
#[derive(Error, Debug, Clone)]
pub enum WriteError {
    #[error("Failed to create directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: Arc<io::Error>,
    },

    #[error("Failed to stat {path}: {source}")]
    Stat {
        path: PathBuf,
        #[source]
        source: Arc<io::Error>,
    },

    #[error("Failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: Arc<io::Error>,
    },

    #[error("Failed to append to {path}: {source}")]
    Append {
        path: PathBuf,
        #[source]
        source: Arc<io::Error>,
    },

    #[error("Failed to rename {from} to {to}: {source}")]
    Rename {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: Arc<io::Error>,
    },

    #[error("Failed to write to console: {0}")]
    Console(#[source] Arc<io::Error>),

    #[error("Write task for {path} panicked")]
    TaskPanicked { path: PathBuf },

    #[error("Write queue for {path} stopped before the task completed")]
    QueueDropped { path: PathBuf },
}

impl WriteError {
    pub fn create_dir(path: &Path, source: io::Error) -> Self {
        Self::CreateDir {
            path: path.to_path_buf(),
            source: Arc::new(source),
        }
    }

    pub fn stat(path: &Path, source: io::Error) -> Self {
        Self::Stat {
            path: path.to_path_buf(),
            source: Arc::new(source),
        }
    }

    pub fn write(path: &Path, source: io::Error) -> Self {
        Self::Write {
            path: path.to_path_buf(),
            source: Arc::new(source),
        }
    }

    pub fn append(path: &Path, source: io::Error) -> Self {
        Self::Append {
            path: path.to_path_buf(),
            source: Arc::new(source),
        }
    }

    pub fn rename(from: &Path, to: &Path, source: io::Error) -> Self {
        Self::Rename {
            from: from.to_path_buf(),
            to: to.to_path_buf(),
            source: Arc::new(source),
        }
    }

    pub fn console(source: io::Error) -> Self {
        Self::Console(Arc::new(source))
    }

    /// Underlying OS error kind, when the failure came from the filesystem.
    pub fn io_kind(&self) -> Option<io::ErrorKind> {
        match self {
            Self::CreateDir { source, .. }
            | Self::Stat { source, .. }
            | Self::Write { source, .. }
            | Self::Append { source, .. }
            | Self::Rename { source, .. }
            | Self::Console(source) => Some(source.kind()),
            Self::TaskPanicked { .. } | Self::QueueDropped { .. } => None,
        }
    }
}
