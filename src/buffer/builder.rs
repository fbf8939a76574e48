use super::engine::{OutputBuffer, Sink};
use super::error::BufferError;
use super::report::{ErrorHandler, Reporter};
use crate::config::BufferConfig;
use crate::writer::{
    ConsoleSink, FileSystem, FileTarget, RotationPolicy, StdoutConsole, TokioFs, WriteError,
    WriteSerializer,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;

/// Builds an [`OutputBuffer`] from a [`BufferConfig`] plus the collaborators
/// that cannot live in a config file.
pub struct OutputBufferBuilder {
    config: BufferConfig,
    rotation: Option<Arc<dyn RotationPolicy>>,
    on_error: Option<ErrorHandler>,
    console: Option<Arc<dyn ConsoleSink>>,
    fs: Option<Arc<dyn FileSystem>>,
    serializer: Option<WriteSerializer>,
    runtime: Option<Handle>,
}

impl OutputBufferBuilder {
    pub fn new(config: BufferConfig) -> Self {
        Self {
            config,
            rotation: None,
            on_error: None,
            console: None,
            fs: None,
            serializer: None,
            runtime: None,
        }
    }

    pub fn config(mut self, config: BufferConfig) -> Self {
        self.config = config;
        self
    }

    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.config.ttl = Some(ttl);
        self
    }

    pub fn size(mut self, size: usize) -> Self {
        self.config.size = Some(size);
        self
    }

    pub fn filename(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.filename = Some(path.into());
        self
    }

    pub fn file_size_limit(mut self, limit: u64) -> Self {
        self.config.file_size_limit = limit;
        self
    }

    pub fn line_separator(mut self, separator: impl Into<String>) -> Self {
        self.config.line_separator = Some(separator.into());
        self
    }

    /// Overrides the policy selected by `config.rotation`.
    pub fn rotation<P: RotationPolicy + 'static>(mut self, policy: P) -> Self {
        self.rotation = Some(Arc::new(policy));
        self
    }

    pub fn on_error<F>(mut self, handler: F) -> Self
    where
        F: Fn(&WriteError) + Send + Sync + 'static,
    {
        self.on_error = Some(Arc::new(handler));
        self
    }

    pub fn console<C: ConsoleSink + 'static>(mut self, console: C) -> Self {
        self.console = Some(Arc::new(console));
        self
    }

    pub fn filesystem<F: FileSystem + 'static>(mut self, fs: F) -> Self {
        self.fs = Some(Arc::new(fs));
        self
    }

    /// Share write ordering with other buffers. Defaults to
    /// [`WriteSerializer::global`].
    pub fn serializer(mut self, serializer: WriteSerializer) -> Self {
        self.serializer = Some(serializer);
        self
    }

    /// Runtime for timers and write tasks. Defaults to the current runtime.
    pub fn runtime(mut self, runtime: Handle) -> Self {
        self.runtime = Some(runtime);
        self
    }

    pub fn build(self) -> Result<OutputBuffer, BufferError> {
        let config = self.config;
        config.validate()?;

        let runtime = match self.runtime {
            Some(runtime) => runtime,
            None => Handle::try_current().map_err(|e| BufferError::NoRuntime(e.to_string()))?,
        };

        let mode = config.flush_mode();
        let separator = config.effective_separator().to_string();
        let sink = match &config.filename {
            Some(path) => Sink::File {
                target: Arc::new(FileTarget::new(
                    path.clone(),
                    config.file_size_limit,
                    self.rotation.unwrap_or_else(|| config.rotation.policy()),
                    self.fs.unwrap_or_else(|| Arc::new(TokioFs)),
                )),
                serializer: self.serializer.unwrap_or_else(WriteSerializer::global),
            },
            None => Sink::Console(self.console.unwrap_or_else(|| Arc::new(StdoutConsole))),
        };

        Ok(OutputBuffer::assemble(
            mode,
            separator,
            sink,
            Reporter::new(self.on_error),
            runtime,
        ))
    }
}
