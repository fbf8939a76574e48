// A file target: where flushed chunks land, and the single write step the
// serializer runs for each chunk (create, append, or rotate).

use super::error::WriteError;
use super::fs::FileSystem;
use super::rotation::{RotationOutcome, RotationPolicy};
use std::fmt;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

/// What a completed write task did with its chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// Target did not exist; it was created with the chunk.
    Created,
    Appended,
    /// Size limit reached; the rotation policy ran before the chunk landed.
    Rotated,
}

pub struct FileTarget {
    path: PathBuf,
    key: PathBuf,
    file_size_limit: u64,
    rotation: Arc<dyn RotationPolicy>,
    fs: Arc<dyn FileSystem>,
}

impl FileTarget {
    pub fn new(
        path: impl Into<PathBuf>,
        file_size_limit: u64,
        rotation: Arc<dyn RotationPolicy>,
        fs: Arc<dyn FileSystem>,
    ) -> Self {
        let path = path.into();
        let key = canonical_key(&path);
        Self {
            path,
            key,
            file_size_limit,
            rotation,
            fs,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Identity used to serialize writes across buffers sharing this file.
    pub fn key(&self) -> &Path {
        &self.key
    }

    pub fn file_size_limit(&self) -> u64 {
        self.file_size_limit
    }

    pub(crate) async fn write_chunk(&self, chunk: &[u8]) -> Result<WriteOutcome, WriteError> {
        let path = self.path.as_path();
        let fs = self.fs.as_ref();

        let exists = fs
            .exists(path)
            .await
            .map_err(|e| WriteError::stat(path, e))?;
        if !exists {
            self.create(chunk).await?;
            return Ok(WriteOutcome::Created);
        }

        let current = fs
            .file_size(path)
            .await
            .map_err(|e| WriteError::stat(path, e))?;
        if current + (chunk.len() as u64) < self.file_size_limit {
            fs.append_file(path, chunk)
                .await
                .map_err(|e| WriteError::append(path, e))?;
            return Ok(WriteOutcome::Appended);
        }

        debug!(
            "{} would reach {} bytes (limit {}), rotating",
            path.display(),
            current + chunk.len() as u64,
            self.file_size_limit
        );
        match self.rotation.rotate(fs, path, chunk).await? {
            RotationOutcome::Written => {}
            RotationOutcome::Recreate => self.create(chunk).await?,
        }
        Ok(WriteOutcome::Rotated)
    }

    async fn create(&self, chunk: &[u8]) -> Result<(), WriteError> {
        let path = self.path.as_path();
        if let Some(parent) = path.parent() {
            self.fs
                .ensure_dir(parent)
                .await
                .map_err(|e| WriteError::create_dir(parent, e))?;
        }
        self.fs
            .write_file(path, chunk)
            .await
            .map_err(|e| WriteError::write(path, e))
    }
}

impl fmt::Debug for FileTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileTarget")
            .field("path", &self.path)
            .field("key", &self.key)
            .field("file_size_limit", &self.file_size_limit)
            .finish_non_exhaustive()
    }
}

/// Canonical identity of a target path, stable whether or not the file exists.
///
/// The deepest existing ancestor directory is resolved through the filesystem
/// (symlinks and `..` included); only the components below it, which cannot
/// be symlinks yet, are normalized lexically. The file name itself is never
/// resolved.
///
/// The key is taken once, when the [`FileTarget`] is created. A directory
/// created later as a symlink under the missing part of the path is not
/// followed by targets that already exist.
pub fn canonical_key(path: &Path) -> PathBuf {
    let absolute = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());
    let components: Vec<Component<'_>> = absolute.components().collect();

    for split in (1..components.len()).rev() {
        let ancestor: PathBuf = components[..split].iter().collect();
        if let Ok(resolved) = std::fs::canonicalize(&ancestor) {
            return normalize_onto(resolved, &components[split..]);
        }
    }
    normalize_onto(PathBuf::new(), &components)
}

fn normalize_onto(mut base: PathBuf, rest: &[Component<'_>]) -> PathBuf {
    for component in rest {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                base.pop();
            }
            other => base.push(other.as_os_str()),
        }
    }
    base
}
