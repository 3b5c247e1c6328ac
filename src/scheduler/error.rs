//! Scheduler and delegate queue errors.

use thiserror::Error;

/// Errors returned by [`DelegateQueue`](super::DelegateQueue).
#[derive(Debug, Clone, Error, PartialEq)]
pub enum QueueError {
    #[error("Delegate queue has been disposed")]
    Disposed,

    #[error("Callback panicked on the queue's worker thread: {0}")]
    CallbackPanicked(String),

    #[error("Failed to spawn worker thread: {0}")]
    Spawn(String),
}

/// Errors returned by [`Scheduler`](super::Scheduler).
#[derive(Debug, Clone, Error, PartialEq)]
pub enum SchedulerError {
    #[error("Scheduler has been disposed")]
    Disposed,

    #[error("Repeat count must be at least one")]
    InvalidCount,

    #[error("Invalid scheduler configuration: {0}")]
    InvalidConfig(String),

    #[error("Failed to spawn worker thread: {0}")]
    Spawn(String),
}
