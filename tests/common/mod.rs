#![allow(dead_code)]

use futures::future::BoxFuture;
use parking_lot::Mutex;
use rask_output_buffer::writer::{ConsoleSink, FileSystem, TokioFs};
use std::collections::VecDeque;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;

static REAL_FS: TokioFs = TokioFs;

/// Poll `condition` until it holds, failing the test after five seconds.
pub async fn wait_until<F: FnMut() -> bool>(mut condition: F) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached within 5s");
}

#[derive(Clone, Default)]
pub struct CapturingConsole {
    pub lines: Arc<Mutex<Vec<String>>>,
}

impl ConsoleSink for CapturingConsole {
    fn write_line(&self, line: &str) -> io::Result<()> {
        self.lines.lock().push(line.to_string());
        Ok(())
    }
}

/// Delays each write by the next entry of `delays`, recording the order in
/// which writes actually reach the disk.
#[derive(Clone, Default)]
pub struct SlowFs {
    delays: Arc<Mutex<VecDeque<Duration>>>,
    pub completed: Arc<Mutex<Vec<Vec<u8>>>>,
}

impl SlowFs {
    pub fn new(delays: impl IntoIterator<Item = Duration>) -> Self {
        Self {
            delays: Arc::new(Mutex::new(delays.into_iter().collect())),
            completed: Arc::default(),
        }
    }

    async fn pause(&self) {
        let delay = self.delays.lock().pop_front().unwrap_or_default();
        tokio::time::sleep(delay).await;
    }
}

impl FileSystem for SlowFs {
    fn exists<'a>(&'a self, path: &'a Path) -> BoxFuture<'a, io::Result<bool>> {
        REAL_FS.exists(path)
    }

    fn file_size<'a>(&'a self, path: &'a Path) -> BoxFuture<'a, io::Result<u64>> {
        REAL_FS.file_size(path)
    }

    fn ensure_dir<'a>(&'a self, path: &'a Path) -> BoxFuture<'a, io::Result<()>> {
        REAL_FS.ensure_dir(path)
    }

    fn write_file<'a>(&'a self, path: &'a Path, data: &'a [u8]) -> BoxFuture<'a, io::Result<()>> {
        Box::pin(async move {
            self.pause().await;
            REAL_FS.write_file(path, data).await?;
            self.completed.lock().push(data.to_vec());
            Ok(())
        })
    }

    fn append_file<'a>(&'a self, path: &'a Path, data: &'a [u8]) -> BoxFuture<'a, io::Result<()>> {
        Box::pin(async move {
            self.pause().await;
            REAL_FS.append_file(path, data).await?;
            self.completed.lock().push(data.to_vec());
            Ok(())
        })
    }

    fn rename<'a>(&'a self, from: &'a Path, to: &'a Path) -> BoxFuture<'a, io::Result<()>> {
        REAL_FS.rename(from, to)
    }
}

/// Holds every write until a permit is released with [`GatedFs::open`].
#[derive(Clone)]
pub struct GatedFs {
    gate: Arc<Semaphore>,
}

impl GatedFs {
    pub fn new() -> Self {
        Self {
            gate: Arc::new(Semaphore::new(0)),
        }
    }

    /// Let `n` more writes through.
    pub fn open(&self, n: usize) {
        self.gate.add_permits(n);
    }

    async fn pass(&self) -> io::Result<()> {
        let permit = self.gate.acquire().await.map_err(io::Error::other)?;
        permit.forget();
        Ok(())
    }
}

impl FileSystem for GatedFs {
    fn exists<'a>(&'a self, path: &'a Path) -> BoxFuture<'a, io::Result<bool>> {
        REAL_FS.exists(path)
    }

    fn file_size<'a>(&'a self, path: &'a Path) -> BoxFuture<'a, io::Result<u64>> {
        REAL_FS.file_size(path)
    }

    fn ensure_dir<'a>(&'a self, path: &'a Path) -> BoxFuture<'a, io::Result<()>> {
        REAL_FS.ensure_dir(path)
    }

    fn write_file<'a>(&'a self, path: &'a Path, data: &'a [u8]) -> BoxFuture<'a, io::Result<()>> {
        Box::pin(async move {
            self.pass().await?;
            REAL_FS.write_file(path, data).await
        })
    }

    fn append_file<'a>(&'a self, path: &'a Path, data: &'a [u8]) -> BoxFuture<'a, io::Result<()>> {
        Box::pin(async move {
            self.pass().await?;
            REAL_FS.append_file(path, data).await
        })
    }

    fn rename<'a>(&'a self, from: &'a Path, to: &'a Path) -> BoxFuture<'a, io::Result<()>> {
        REAL_FS.rename(from, to)
    }
}

/// Fails every write and append with `PermissionDenied`.
#[derive(Clone, Copy, Default)]
pub struct ReadOnlyFs;

impl FileSystem for ReadOnlyFs {
    fn exists<'a>(&'a self, path: &'a Path) -> BoxFuture<'a, io::Result<bool>> {
        REAL_FS.exists(path)
    }

    fn file_size<'a>(&'a self, path: &'a Path) -> BoxFuture<'a, io::Result<u64>> {
        REAL_FS.file_size(path)
    }

    fn ensure_dir<'a>(&'a self, path: &'a Path) -> BoxFuture<'a, io::Result<()>> {
        REAL_FS.ensure_dir(path)
    }

    fn write_file<'a>(&'a self, _path: &'a Path, _data: &'a [u8]) -> BoxFuture<'a, io::Result<()>> {
        Box::pin(async { Err(io::Error::new(io::ErrorKind::PermissionDenied, "read-only")) })
    }

    fn append_file<'a>(&'a self, _path: &'a Path, _data: &'a [u8]) -> BoxFuture<'a, io::Result<()>> {
        Box::pin(async { Err(io::Error::new(io::ErrorKind::PermissionDenied, "read-only")) })
    }

    fn rename<'a>(&'a self, from: &'a Path, to: &'a Path) -> BoxFuture<'a, io::Result<()>> {
        REAL_FS.rename(from, to)
    }
}

pub fn read(path: &Path) -> String {
    std::fs::read_to_string(path).unwrap_or_default()
}

pub fn files_in(dir: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = std::fs::read_dir(dir)
        .unwrap()
        .map(|entry| entry.unwrap().path())
        .collect();
    files.sort();
    files
}
