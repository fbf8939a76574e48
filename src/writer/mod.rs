pub mod console;
pub mod error;
pub mod file;
pub mod fs;
pub mod rotation;
pub mod serializer;

pub use console::{ConsoleSink, StdoutConsole};
pub use error::WriteError;
pub use file::{FileTarget, WriteOutcome, canonical_key};
pub use fs::{FileSystem, TokioFs};
pub use rotation::{ArchiveRotation, OverwriteRotation, RotationKind, RotationOutcome, RotationPolicy};
pub use serializer::{Completion, QueueState, WriteSerializer};
