#![warn(rust_2018_idioms)]
#![deny(
    clippy::explicit_iter_loop,
    clippy::manual_let_else,
    clippy::semicolon_if_nothing_returned
)]
#![allow(
    clippy::cast_possible_truncation, // Millisecond and byte counts stay far below u64::MAX
    clippy::missing_errors_doc,
    clippy::module_name_repetitions,  // e.g. BufferError in buffer module
    clippy::must_use_candidate
)]

pub mod app;
pub mod buffer;
pub mod config;
pub mod writer;

pub use buffer::{BufferError, BufferStats, IntoPayload, OutputBuffer, OutputBufferBuilder, Payload};
pub use config::{BufferConfig, ConfigError, FlushMode};
pub use writer::{RotationKind, RotationPolicy, WriteError, WriteSerializer};

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
