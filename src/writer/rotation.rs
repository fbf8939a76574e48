// Rotation policies run when appending a chunk would push the target file
// past its size limit. A policy either persists the chunk itself or asks the
// serializer to recreate the target with the chunk once it is done.

use super::error::WriteError;
use super::fs::FileSystem;
use chrono::{DateTime, Local};
use clap::ValueEnum;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

/// How the write task continues after a rotation policy returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RotationOutcome {
    /// The policy already persisted the chunk.
    Written,
    /// The serializer creates a fresh target file containing the chunk.
    Recreate,
}

pub trait RotationPolicy: Send + Sync {
    fn rotate<'a>(
        &'a self,
        fs: &'a dyn FileSystem,
        path: &'a Path,
        chunk: &'a [u8],
    ) -> BoxFuture<'a, Result<RotationOutcome, WriteError>>;
}

/// Replaces the target's contents with just the pending chunk.
#[derive(Debug, Clone, Copy, Default)]
pub struct OverwriteRotation;

impl RotationPolicy for OverwriteRotation {
    fn rotate<'a>(
        &'a self,
        fs: &'a dyn FileSystem,
        path: &'a Path,
        chunk: &'a [u8],
    ) -> BoxFuture<'a, Result<RotationOutcome, WriteError>> {
        Box::pin(async move {
            fs.write_file(path, chunk)
                .await
                .map_err(|e| WriteError::write(path, e))?;
            Ok(RotationOutcome::Written)
        })
    }
}

/// Moves the full file aside under a timestamped name, then lets the
/// serializer recreate the target. Older archives are never touched.
#[derive(Debug, Clone, Copy, Default)]
pub struct ArchiveRotation;

impl RotationPolicy for ArchiveRotation {
    fn rotate<'a>(
        &'a self,
        fs: &'a dyn FileSystem,
        path: &'a Path,
        _chunk: &'a [u8],
    ) -> BoxFuture<'a, Result<RotationOutcome, WriteError>> {
        Box::pin(async move {
            let base = archive_path(path, Local::now());
            let mut candidate = base.clone();
            let mut attempt = 1;
            while fs
                .exists(&candidate)
                .await
                .map_err(|e| WriteError::stat(&candidate, e))?
            {
                candidate = with_suffix(&base, attempt);
                attempt += 1;
            }

            fs.rename(path, &candidate)
                .await
                .map_err(|e| WriteError::rename(path, &candidate, e))?;
            debug!("Archived {} to {}", path.display(), candidate.display());
            Ok(RotationOutcome::Recreate)
        })
    }
}

/// `logs/app.log` at 2025-01-10 12:00:00 becomes `logs/app_20250110_120000.log`.
pub fn archive_path(path: &Path, now: DateTime<Local>) -> PathBuf {
    let timestamp = now.format("%Y%m%d_%H%M%S");
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "output".to_string());
    let filename = match path.extension() {
        Some(ext) => format!("{}_{}.{}", stem, timestamp, ext.to_string_lossy()),
        None => format!("{}_{}", stem, timestamp),
    };
    path.with_file_name(filename)
}

fn with_suffix(base: &Path, n: u32) -> PathBuf {
    let stem = base
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    let filename = match base.extension() {
        Some(ext) => format!("{}_{}.{}", stem, n, ext.to_string_lossy()),
        None => format!("{}_{}", stem, n),
    };
    base.with_file_name(filename)
}

/// Built-in policies selectable from configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RotationKind {
    /// Overwrite the target with the pending chunk (default)
    #[default]
    Overwrite,
    /// Rename the full target to a timestamped archive and start a new one
    Archive,
}

impl RotationKind {
    pub fn policy(self) -> Arc<dyn RotationPolicy> {
        match self {
            RotationKind::Overwrite => Arc::new(OverwriteRotation),
            RotationKind::Archive => Arc::new(ArchiveRotation),
        }
    }
}
