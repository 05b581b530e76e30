//! Error definitions for the control channel

use thiserror::Error;

/// Producer-side enqueue failures
///
/// Never propagated past the call site: the producer logs it and either drops
/// the intent or tries it again later.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum QueueError {
    #[error("event queue full")]
    Full,

    #[error("event queue already stopped")]
    Stopped,
}

/// Consumer and session failures
#[derive(Debug, Error)]
pub enum ControlError {
    /// Writing a frame to the sink failed; the stream is now unsynchronized
    #[error("Sink write failed: {0}")]
    SinkWrite(#[from] std::io::Error),

    #[error("Dispatcher error: {0}")]
    Dispatcher(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Task error: {0}")]
    TaskJoin(String),
}
