use crate::writer::WriteOutcome;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BufferStats {
    /// Items accepted by `push` (skipped `None` values are not counted).
    pub pushes: u64,
    /// Chunks handed to the console or the write serializer.
    pub flushes: u64,
    /// Bytes confirmed written, trailing separators included.
    pub bytes_flushed: u64,
    pub rotations: u64,
    pub write_errors: u64,
}

#[derive(Debug, Default)]
pub(crate) struct StatsCollector {
    pushes: AtomicU64,
    flushes: AtomicU64,
    bytes_flushed: AtomicU64,
    rotations: AtomicU64,
    write_errors: AtomicU64,
}

impl StatsCollector {
    pub(crate) fn record_push(&self) {
        self.pushes.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_flush(&self) {
        self.flushes.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_written(&self, bytes: usize, outcome: Option<WriteOutcome>) {
        self.bytes_flushed.fetch_add(bytes as u64, Ordering::Relaxed);
        if outcome == Some(WriteOutcome::Rotated) {
            self.rotations.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub(crate) fn record_error(&self) {
        self.write_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> BufferStats {
        BufferStats {
            pushes: self.pushes.load(Ordering::Relaxed),
            flushes: self.flushes.load(Ordering::Relaxed),
            bytes_flushed: self.bytes_flushed.load(Ordering::Relaxed),
            rotations: self.rotations.load(Ordering::Relaxed),
            write_errors: self.write_errors.load(Ordering::Relaxed),
        }
    }
}
