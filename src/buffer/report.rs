use super::stats::StatsCollector;
use crate::writer::{WriteError, WriteOutcome};
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::error;

/// Receives every write failure when installed on a buffer.
pub type ErrorHandler = Arc<dyn Fn(&WriteError) + Send + Sync>;

/// Settles finished deliveries: updates stats and routes failures either to
/// the installed handler, back to an awaiting caller, or into the held slot
/// that the next awaited `flush`/`close` reports.
pub(crate) struct Reporter {
    handler: Option<ErrorHandler>,
    held: Mutex<Option<WriteError>>,
    pub(crate) stats: StatsCollector,
}

impl Reporter {
    pub(crate) fn new(handler: Option<ErrorHandler>) -> Self {
        Self {
            handler,
            held: Mutex::new(None),
            stats: StatsCollector::default(),
        }
    }

    pub(crate) fn settle(
        &self,
        result: Result<Option<WriteOutcome>, WriteError>,
        bytes: usize,
        awaited: bool,
    ) -> Result<(), WriteError> {
        match result {
            Ok(outcome) => {
                self.stats.record_written(bytes, outcome);
                Ok(())
            }
            Err(err) => {
                self.stats.record_error();
                if let Some(handler) = &self.handler {
                    handler(&err);
                    Ok(())
                } else if awaited {
                    Err(err)
                } else {
                    self.hold(err);
                    Ok(())
                }
            }
        }
    }

    /// Keep an error nobody is waiting for. Only the first one is kept until
    /// it is taken; later ones are logged.
    pub(crate) fn hold(&self, err: WriteError) {
        error!("Background flush failed: {err}");
        let mut held = self.held.lock();
        if held.is_none() {
            *held = Some(err);
        }
    }

    pub(crate) fn take_held(&self) -> Option<WriteError> {
        self.held.lock().take()
    }
}
