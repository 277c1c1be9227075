//! Inbound command surface exposed to the hosting pipeline.

use thiserror::Error;

use crate::{log_record::LogRecord, measurement::Measurement};

/// Reasons a target refuses to accept a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum HandlerError {
    /// The inbox is at capacity; the command was dropped.
    #[error("target queue full")]
    QueueFull,
    /// The actor has stopped, either by shutdown or after a fault.
    #[error("target closed")]
    Closed,
}

/// Trait implemented by targets that accept records from a logging pipeline.
///
/// Implementations are `Send + Sync` so a single target can be shared by
/// every producer thread. Calls never block on network I/O; each command is
/// forwarded to the target's own consumer thread.
pub trait TargetTrait: Send + Sync {
    /// Enqueue a log record for delivery.
    fn log(&self, record: LogRecord) -> Result<(), HandlerError>;

    /// Enqueue a measurement for delivery.
    fn measure(&self, measurement: Measurement) -> Result<(), HandlerError>;

    /// Wait until every previously enqueued command has been processed.
    ///
    /// Returns `false` when the target has stopped or does not acknowledge in
    /// time.
    fn flush(&self) -> bool;
}
