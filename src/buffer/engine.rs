// The buffer engine: holds pushed content in memory and decides when it is
// released. Every hand-off to the console or the write serializer happens
// while the state lock is held, so chunks reach the target in push order.
// Results are settled (and the error handler run) only after the lock is
// released, so a handler may call back into the buffer.

use super::builder::OutputBufferBuilder;
use super::error::BufferError;
use super::payload::IntoPayload;
use super::report::Reporter;
use super::stats::BufferStats;
use crate::config::{BufferConfig, FlushMode};
use crate::writer::{ConsoleSink, FileTarget, WriteError, WriteSerializer};
use bytes::{Bytes, BytesMut};
use parking_lot::Mutex;
use std::fmt::{Debug, Display};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tokio::task::AbortHandle;
use tracing::{debug, trace};

pub(crate) enum Sink {
    Console(Arc<dyn ConsoleSink>),
    File {
        target: Arc<FileTarget>,
        serializer: WriteSerializer,
    },
}

struct BufferState {
    /// `None` until something is pushed, and again after every flush or clean.
    content: Option<BytesMut>,
    closed: bool,
    timer: Option<AbortHandle>,
}

/// A chunk that has left the buffer but whose result is not settled yet.
enum Delivery {
    /// Console write already performed.
    Console { result: io::Result<()>, bytes: usize },
    /// Awaited file write; the drain task settles it.
    Queued(oneshot::Receiver<Result<(), WriteError>>),
    /// Unawaited file write; the drain task settles it.
    Background,
}

struct Inner {
    state: Mutex<BufferState>,
    mode: FlushMode,
    separator: String,
    sink: Sink,
    reporter: Arc<Reporter>,
    runtime: Handle,
}

/// Write-coalescing output buffer.
///
/// Pushed items are joined with the line separator and released as one chunk
/// either `ttl` after the first push into an empty buffer, or as soon as the
/// content would reach `size` bytes. Chunks go to the console or are appended
/// to a file through a [`WriteSerializer`].
///
/// Dropping an open buffer flushes any pending content in the background.
pub struct OutputBuffer {
    inner: Arc<Inner>,
}

impl OutputBuffer {
    pub fn builder() -> OutputBufferBuilder {
        OutputBufferBuilder::new(BufferConfig::default())
    }

    pub fn new(config: BufferConfig) -> Result<Self, BufferError> {
        OutputBufferBuilder::new(config).build()
    }

    /// Console buffer with default settings.
    pub fn console() -> Result<Self, BufferError> {
        Self::new(BufferConfig::console())
    }

    /// File buffer with default settings.
    pub fn to_file(path: impl Into<PathBuf>) -> Result<Self, BufferError> {
        Self::new(BufferConfig::file(path))
    }

    pub(super) fn assemble(
        mode: FlushMode,
        separator: String,
        sink: Sink,
        reporter: Reporter,
        runtime: Handle,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(BufferState {
                    content: None,
                    closed: false,
                    timer: None,
                }),
                mode,
                separator,
                sink,
                reporter: Arc::new(reporter),
                runtime,
            }),
        }
    }

    /// Append one item. Never waits on I/O; a flush triggered by the size
    /// threshold continues in the background.
    pub fn push(&self, item: impl IntoPayload) -> Result<(), BufferError> {
        let payload = item.into_payload();
        let inner = &self.inner;
        let mut released = Vec::new();
        {
            let mut state = inner.state.lock();
            if state.closed {
                return Err(BufferError::Closed);
            }
            let Some(payload) = payload else {
                return Ok(());
            };
            inner.reporter.stats.record_push();
            let data = payload.into_bytes();

            match inner.mode {
                FlushMode::Ttl(ttl) => {
                    if state.timer.is_none() {
                        state.timer = Some(inner.arm_timer(ttl));
                    }
                    inner.append(&mut state, &data);
                }
                FlushMode::Size(limit) => {
                    // The new item seeds the next chunk rather than being split.
                    let projected = state
                        .content
                        .as_ref()
                        .map(|c| c.len() + inner.separator.len() + data.len());
                    if projected.is_some_and(|len| len >= limit)
                        && let Some(chunk) = take_chunk(&mut state)
                    {
                        released.push(inner.dispatch(chunk, false));
                    }
                    inner.append(&mut state, &data);
                    if state.content.as_ref().is_some_and(|c| c.len() >= limit)
                        && let Some(chunk) = take_chunk(&mut state)
                    {
                        released.push(inner.dispatch(chunk, false));
                    }
                }
            }
        }
        for delivery in released {
            inner.release(delivery);
        }
        Ok(())
    }

    /// Push several items in order. Stops at the first failure.
    pub fn push_all<I>(&self, items: I) -> Result<(), BufferError>
    where
        I: IntoIterator,
        I::Item: IntoPayload,
    {
        for item in items {
            self.push(item)?;
        }
        Ok(())
    }

    pub fn push_display<T: Display + ?Sized>(&self, value: &T) -> Result<(), BufferError> {
        self.push(super::Payload::display(value))
    }

    pub fn push_debug<T: Debug + ?Sized>(&self, value: &T) -> Result<(), BufferError> {
        self.push(super::Payload::debug(value))
    }

    /// Release the pending content now and wait until it has been written.
    ///
    /// Without an error handler, a write failure is returned here, along with
    /// any failure of an earlier background flush that nobody awaited.
    pub async fn flush(&self) -> Result<(), BufferError> {
        let delivery = {
            let mut state = self.inner.state.lock();
            take_chunk(&mut state).map(|chunk| self.inner.dispatch(chunk, true))
        };
        self.inner.complete(delivery).await
    }

    /// Pending content as text; empty when nothing is buffered.
    pub fn get(&self) -> String {
        self.inner
            .state
            .lock()
            .content
            .as_ref()
            .map(|content| String::from_utf8_lossy(content).into_owned())
            .unwrap_or_default()
    }

    /// Drop the pending content without writing it.
    pub fn clean(&self) {
        self.inner.state.lock().content = None;
    }

    /// Close without writing: pending content is discarded.
    pub fn destroy(&self) {
        let mut state = self.inner.state.lock();
        state.closed = true;
        if let Some(timer) = state.timer.take() {
            timer.abort();
        }
        state.content = None;
    }

    /// Close after a final flush. Pushes fail from the moment this is called;
    /// the returned future resolves once the final write has finished, even
    /// when that write failed.
    pub async fn close(&self) -> Result<(), BufferError> {
        let delivery = {
            let mut state = self.inner.state.lock();
            state.closed = true;
            if let Some(timer) = state.timer.take() {
                timer.abort();
            }
            take_chunk(&mut state).map(|chunk| self.inner.dispatch(chunk, true))
        };
        debug!("Output buffer closed");
        self.inner.complete(delivery).await
    }

    pub fn is_closed(&self) -> bool {
        self.inner.state.lock().closed
    }

    pub fn mode(&self) -> FlushMode {
        self.inner.mode
    }

    pub fn line_separator(&self) -> &str {
        &self.inner.separator
    }

    /// Target file, or `None` for the console.
    pub fn filename(&self) -> Option<&Path> {
        match &self.inner.sink {
            Sink::Console(_) => None,
            Sink::File { target, .. } => Some(target.path()),
        }
    }

    pub fn stats(&self) -> BufferStats {
        self.inner.reporter.stats.snapshot()
    }
}

impl Drop for OutputBuffer {
    fn drop(&mut self) {
        let delivery = {
            let mut state = self.inner.state.lock();
            if state.closed {
                return;
            }
            state.closed = true;
            if let Some(timer) = state.timer.take() {
                timer.abort();
            }
            take_chunk(&mut state).map(|chunk| {
                debug!("Flushing {} pending bytes on drop", chunk.len());
                self.inner.dispatch(chunk, false)
            })
        };
        if let Some(delivery) = delivery {
            self.inner.release(delivery);
        }
    }
}

impl Debug for OutputBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutputBuffer")
            .field("mode", &self.inner.mode)
            .field("filename", &self.filename())
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

fn take_chunk(state: &mut BufferState) -> Option<BytesMut> {
    state.content.take().filter(|content| !content.is_empty())
}

impl Inner {
    fn append(&self, state: &mut BufferState, data: &Bytes) {
        match state.content.as_mut() {
            Some(content) => {
                content.reserve(self.separator.len() + data.len());
                content.extend_from_slice(self.separator.as_bytes());
                content.extend_from_slice(data);
            }
            None => state.content = Some(BytesMut::from(&data[..])),
        }
    }

    fn arm_timer(self: &Arc<Self>, ttl: Duration) -> AbortHandle {
        let inner = Arc::downgrade(self);
        self.runtime
            .spawn(async move {
                tokio::time::sleep(ttl).await;
                if let Some(inner) = inner.upgrade() {
                    inner.flush_expired();
                }
            })
            .abort_handle()
    }

    fn flush_expired(&self) {
        let delivery = {
            let mut state = self.state.lock();
            state.timer = None;
            take_chunk(&mut state).map(|chunk| {
                trace!("ttl expired, flushing {} bytes", chunk.len());
                self.dispatch(chunk, false)
            })
        };
        if let Some(delivery) = delivery {
            self.release(delivery);
        }
    }

    /// Hand a chunk to the sink. Must be called with the state lock held;
    /// the returned delivery must be settled after the lock is released.
    fn dispatch(&self, mut chunk: BytesMut, awaited: bool) -> Delivery {
        self.reporter.stats.record_flush();
        match &self.sink {
            Sink::Console(console) => Delivery::Console {
                result: console.write_line(&String::from_utf8_lossy(&chunk)),
                bytes: chunk.len() + 1,
            },
            Sink::File { target, serializer } => {
                chunk.extend_from_slice(self.separator.as_bytes());
                let data = chunk.freeze();
                let bytes = data.len();
                let reporter = Arc::clone(&self.reporter);
                trace!("Submitting {} bytes for {}", bytes, target.path().display());

                if awaited {
                    let (tx, rx) = oneshot::channel();
                    serializer.enqueue(
                        &self.runtime,
                        Arc::clone(target),
                        data,
                        Box::new(move |result| {
                            let settled = reporter.settle(result.map(Some), bytes, true);
                            // The flush future was dropped; keep the error for the next caller.
                            if let Err(Err(err)) = tx.send(settled) {
                                reporter.hold(err);
                            }
                        }),
                    );
                    Delivery::Queued(rx)
                } else {
                    serializer.enqueue(
                        &self.runtime,
                        Arc::clone(target),
                        data,
                        Box::new(move |result| {
                            let _ = reporter.settle(result.map(Some), bytes, false);
                        }),
                    );
                    Delivery::Background
                }
            }
        }
    }

    fn settle_console(
        &self,
        result: io::Result<()>,
        bytes: usize,
        awaited: bool,
    ) -> Result<(), WriteError> {
        let result = result.map(|()| None).map_err(WriteError::console);
        self.reporter.settle(result, bytes, awaited)
    }

    /// Settle a delivery nobody waits for. Failures go to the handler or are held.
    fn release(&self, delivery: Delivery) {
        if let Delivery::Console { result, bytes } = delivery {
            let _ = self.settle_console(result, bytes, false);
        }
    }

    async fn complete(&self, delivery: Option<Delivery>) -> Result<(), BufferError> {
        let result = match delivery {
            None | Some(Delivery::Background) => Ok(()),
            Some(Delivery::Console { result, bytes }) => {
                self.settle_console(result, bytes, true)
            }
            Some(Delivery::Queued(rx)) => rx.await.unwrap_or_else(|_| {
                Err(WriteError::QueueDropped {
                    path: self.target_path(),
                })
            }),
        };
        result?;
        match self.reporter.take_held() {
            Some(err) => Err(err.into()),
            None => Ok(()),
        }
    }

    fn target_path(&self) -> PathBuf {
        match &self.sink {
            Sink::Console(_) => PathBuf::from("<console>"),
            Sink::File { target, .. } => target.path().to_path_buf(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io;

    #[derive(Clone, Default)]
    struct CapturingConsole {
        lines: Arc<Mutex<Vec<String>>>,
    }

    impl ConsoleSink for CapturingConsole {
        fn write_line(&self, line: &str) -> io::Result<()> {
            self.lines.lock().push(line.to_string());
            Ok(())
        }
    }

    struct BrokenConsole;

    impl ConsoleSink for BrokenConsole {
        fn write_line(&self, _line: &str) -> io::Result<()> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "stdout closed"))
        }
    }

    fn console_buffer(config: BufferConfig) -> (OutputBuffer, CapturingConsole) {
        let console = CapturingConsole::default();
        let buffer = OutputBufferBuilder::new(config)
            .console(console.clone())
            .build()
            .unwrap();
        (buffer, console)
    }

    #[tokio::test]
    async fn test_get_joins_items_with_separator() {
        let (buffer, _) = console_buffer(BufferConfig::console());

        assert_eq!(buffer.get(), "");
        buffer.push("Hello, World!").unwrap();
        buffer.push("Hi, Ayon!").unwrap();
        buffer.push(json!({"hello": "world!"})).unwrap();

        assert_eq!(buffer.get(), "Hello, World!\nHi, Ayon!\n{\"hello\":\"world!\"}");
        buffer.destroy();
    }

    #[tokio::test]
    async fn test_absent_values_are_skipped() {
        let (buffer, _) = console_buffer(BufferConfig::console());

        buffer.push(None::<&str>).unwrap();
        buffer.push(json!(null)).unwrap();
        assert_eq!(buffer.get(), "");

        buffer.push("a").unwrap();
        buffer.push(None::<String>).unwrap();
        buffer.push("b").unwrap();
        assert_eq!(buffer.get(), "a\nb");
        assert_eq!(buffer.stats().pushes, 2);
        buffer.destroy();
    }

    #[tokio::test]
    async fn test_flush_writes_one_console_line() {
        let (buffer, console) = console_buffer(BufferConfig::console());

        buffer.push_all(["one", "two"]).unwrap();
        buffer.flush().await.unwrap();

        assert_eq!(buffer.get(), "");
        assert_eq!(*console.lines.lock(), vec!["one\ntwo".to_string()]);

        // Nothing pending: no second write.
        buffer.flush().await.unwrap();
        assert_eq!(console.lines.lock().len(), 1);
        assert_eq!(buffer.stats().bytes_flushed, 8);
        buffer.destroy();
    }

    #[tokio::test]
    async fn test_size_mode_flushes_before_crossing() {
        let (buffer, console) = console_buffer(BufferConfig::console().with_size(10));

        buffer.push("1234").unwrap();
        buffer.push("5678").unwrap();
        assert_eq!(buffer.get(), "1234\n5678");
        assert!(console.lines.lock().is_empty());

        // 9 + 1 + 4 would reach the threshold: the old content goes first.
        buffer.push("abcd").unwrap();
        assert_eq!(*console.lines.lock(), vec!["1234\n5678".to_string()]);
        assert_eq!(buffer.get(), "abcd");

        // A single oversized item is flushed on its own.
        buffer.push("this item is too long").unwrap();
        assert_eq!(
            *console.lines.lock(),
            vec![
                "1234\n5678".to_string(),
                "abcd".to_string(),
                "this item is too long".to_string(),
            ]
        );
        assert_eq!(buffer.get(), "");
        buffer.destroy();
    }

    #[tokio::test]
    async fn test_clean_discards_without_closing() {
        let (buffer, console) = console_buffer(BufferConfig::console());

        buffer.push("dropped").unwrap();
        buffer.clean();
        assert_eq!(buffer.get(), "");
        assert!(!buffer.is_closed());

        buffer.push("kept").unwrap();
        buffer.flush().await.unwrap();
        assert_eq!(*console.lines.lock(), vec!["kept".to_string()]);
        buffer.destroy();
    }

    #[tokio::test]
    async fn test_push_after_close_fails() {
        let (buffer, console) = console_buffer(BufferConfig::console());

        buffer.push("last").unwrap();
        buffer.close().await.unwrap();

        assert!(buffer.is_closed());
        assert_eq!(*console.lines.lock(), vec!["last".to_string()]);
        let err = buffer.push("late").unwrap_err();
        assert!(err.is_closed());
        assert_eq!(err.to_string(), "Cannot push data after closing the buffer");
        // A skipped value still reports the closed state.
        assert!(buffer.push(None::<&str>).unwrap_err().is_closed());
    }

    #[tokio::test]
    async fn test_destroy_discards_pending_content() {
        let (buffer, console) = console_buffer(BufferConfig::console());

        buffer.push("never written").unwrap();
        buffer.destroy();

        assert!(buffer.is_closed());
        assert_eq!(buffer.get(), "");
        assert!(buffer.push("x").unwrap_err().is_closed());
        drop(buffer);
        assert!(console.lines.lock().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_ttl_flushes_once_per_window() {
        let (buffer, console) =
            console_buffer(BufferConfig::console().with_ttl(Duration::from_millis(100)));

        buffer.push("a").unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        buffer.push("b").unwrap();
        assert!(console.lines.lock().is_empty());

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(*console.lines.lock(), vec!["a\nb".to_string()]);
        assert_eq!(buffer.get(), "");

        // The next push starts a new window.
        buffer.push("c").unwrap();
        tokio::time::sleep(Duration::from_millis(99)).await;
        assert_eq!(console.lines.lock().len(), 1);
        tokio::time::sleep(Duration::from_millis(2)).await;
        assert_eq!(
            *console.lines.lock(),
            vec!["a\nb".to_string(), "c".to_string()]
        );
        buffer.destroy();
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_cancels_pending_timer() {
        let (buffer, console) =
            console_buffer(BufferConfig::console().with_ttl(Duration::from_millis(100)));

        buffer.push("only once").unwrap();
        buffer.close().await.unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;

        assert_eq!(*console.lines.lock(), vec!["only once".to_string()]);
    }

    #[tokio::test]
    async fn test_drop_flushes_pending_console_content() {
        let (buffer, console) = console_buffer(BufferConfig::console());

        buffer.push("bye").unwrap();
        drop(buffer);

        assert_eq!(*console.lines.lock(), vec!["bye".to_string()]);
    }

    #[tokio::test]
    async fn test_console_failure_is_returned_from_flush() {
        let buffer = OutputBufferBuilder::new(BufferConfig::console())
            .console(BrokenConsole)
            .build()
            .unwrap();

        buffer.push("lost").unwrap();
        let err = buffer.flush().await.unwrap_err();

        assert!(matches!(err, BufferError::Write(WriteError::Console(_))));
        assert_eq!(buffer.get(), "");
        assert_eq!(buffer.stats().write_errors, 1);
        buffer.destroy();
    }

    #[test]
    fn test_error_handler_can_call_back_into_buffer() {
        let (done_tx, done_rx) = std::sync::mpsc::channel();
        std::thread::spawn(move || {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .unwrap();
            let slot: Arc<std::sync::OnceLock<Arc<OutputBuffer>>> = Arc::default();
            let seen = Arc::new(Mutex::new(Vec::new()));
            let (handler_slot, handler_seen) = (Arc::clone(&slot), Arc::clone(&seen));

            let buffer = Arc::new(
                OutputBufferBuilder::new(BufferConfig::console().with_size(4))
                    .console(BrokenConsole)
                    .runtime(runtime.handle().clone())
                    .on_error(move |_| {
                        if let Some(buffer) = handler_slot.get() {
                            handler_seen.lock().push((buffer.is_closed(), buffer.get()));
                        }
                    })
                    .build()
                    .unwrap(),
            );
            slot.set(Arc::clone(&buffer)).unwrap();

            // Reaches the threshold inside push.
            buffer.push("abcd").unwrap();
            runtime.block_on(async {
                buffer.push("x").unwrap();
                buffer.flush().await.unwrap();
                buffer.push("y").unwrap();
                buffer.close().await.unwrap();
            });
            let _ = done_tx.send(seen.lock().clone());
        });

        let seen = done_rx
            .recv_timeout(Duration::from_secs(5))
            .expect("error handler did not return");
        assert_eq!(
            seen,
            vec![
                (false, String::new()),
                (false, String::new()),
                (true, String::new()),
            ]
        );
    }

    #[test]
    fn test_build_outside_runtime_fails() {
        let result = OutputBuffer::console();
        assert!(matches!(result, Err(BufferError::NoRuntime(_))));
    }

    #[test]
    fn test_build_with_explicit_runtime() {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        let buffer = OutputBufferBuilder::new(BufferConfig::console().with_size(64))
            .console(CapturingConsole::default())
            .runtime(runtime.handle().clone())
            .build()
            .unwrap();

        assert_eq!(buffer.mode(), FlushMode::Size(64));
        assert_eq!(buffer.line_separator(), "\n");
        assert!(buffer.filename().is_none());
        buffer.destroy();
    }
}
