// Per-target write queues.
//
// Each canonical target path owns an ordered list of pending write tasks and an
// explicit Idle/Running state. Enqueueing on an Idle queue spawns one drain
// task; the drain task runs tasks strictly one at a time in submission order
// and removes the queue once it is empty, which leaves the target Idle. Tasks
// for different targets drain independently.

use super::error::WriteError;
use super::file::{FileTarget, WriteOutcome, canonical_key};
use bytes::Bytes;
use futures::FutureExt;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock};
use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tracing::{error, trace};

/// Invoked exactly once when a write task finishes, successfully or not.
pub type Completion = Box<dyn FnOnce(Result<WriteOutcome, WriteError>) + Send>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueState {
    Idle,
    Running,
}

struct WriteTask {
    target: Arc<FileTarget>,
    chunk: Bytes,
    on_complete: Completion,
}

struct TargetQueue {
    state: QueueState,
    pending: VecDeque<WriteTask>,
}

impl TargetQueue {
    fn new() -> Self {
        Self {
            state: QueueState::Idle,
            pending: VecDeque::new(),
        }
    }
}

/// Serializes writes by target identity. Clones share the same queues.
#[derive(Clone, Default)]
pub struct WriteSerializer {
    queues: Arc<Mutex<HashMap<PathBuf, TargetQueue>>>,
}

static GLOBAL: LazyLock<WriteSerializer> = LazyLock::new(WriteSerializer::new);

impl WriteSerializer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Process-wide serializer used by buffers that were not given one, so that
    /// independent buffers writing the same file never interleave.
    pub fn global() -> Self {
        GLOBAL.clone()
    }

    /// Queue `chunk` for `target`. `on_complete` runs on the drain task after
    /// the write finishes; it must not block.
    pub fn enqueue(
        &self,
        runtime: &Handle,
        target: Arc<FileTarget>,
        chunk: Bytes,
        on_complete: Completion,
    ) {
        let key = target.key().to_path_buf();
        let start_drain = {
            let mut queues = self.queues.lock();
            let queue = queues.entry(key.clone()).or_insert_with(TargetQueue::new);
            queue.pending.push_back(WriteTask {
                target,
                chunk,
                on_complete,
            });
            trace!(
                "Queued write for {} ({} pending)",
                key.display(),
                queue.pending.len()
            );
            if queue.state == QueueState::Idle {
                queue.state = QueueState::Running;
                true
            } else {
                false
            }
        };

        if start_drain {
            let serializer = self.clone();
            runtime.spawn(async move { serializer.drain(key).await });
        }
    }

    /// Queue `chunk` and return a receiver resolving with the task's result.
    pub fn submit(
        &self,
        runtime: &Handle,
        target: Arc<FileTarget>,
        chunk: Bytes,
    ) -> oneshot::Receiver<Result<WriteOutcome, WriteError>> {
        let (tx, rx) = oneshot::channel();
        self.enqueue(
            runtime,
            target,
            chunk,
            Box::new(move |result| {
                let _ = tx.send(result);
            }),
        );
        rx
    }

    /// Targets without a queue are Idle.
    pub fn state(&self, path: &Path) -> QueueState {
        self.queues
            .lock()
            .get(&canonical_key(path))
            .map_or(QueueState::Idle, |q| q.state)
    }

    /// Tasks waiting behind the one currently running.
    pub fn pending(&self, path: &Path) -> usize {
        self.queues
            .lock()
            .get(&canonical_key(path))
            .map_or(0, |q| q.pending.len())
    }

    async fn drain(self, key: PathBuf) {
        loop {
            let task = {
                let mut queues = self.queues.lock();
                let Some(queue) = queues.get_mut(&key) else {
                    return;
                };
                match queue.pending.pop_front() {
                    Some(task) => task,
                    None => {
                        queues.remove(&key);
                        return;
                    }
                }
            };
            run_task(task).await;
        }
    }
}

async fn run_task(task: WriteTask) {
    let WriteTask {
        target,
        chunk,
        on_complete,
    } = task;

    let result = AssertUnwindSafe(target.write_chunk(&chunk))
        .catch_unwind()
        .await
        .unwrap_or_else(|_| {
            Err(WriteError::TaskPanicked {
                path: target.path().to_path_buf(),
            })
        });

    if std::panic::catch_unwind(AssertUnwindSafe(|| on_complete(result))).is_err() {
        error!(
            "Completion handler for {} panicked; continuing with the next queued write",
            target.path().display()
        );
    }
}
