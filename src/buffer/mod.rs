pub mod builder;
pub mod engine;
pub mod error;
pub mod payload;
pub mod report;
pub mod stats;

pub use builder::OutputBufferBuilder;
pub use engine::OutputBuffer;
pub use error::BufferError;
pub use payload::{IntoPayload, Payload};
pub use report::ErrorHandler;
pub use stats::BufferStats;
