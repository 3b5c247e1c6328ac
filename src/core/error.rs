//! Error types for the state machine runtime.

use crate::scheduler::QueueError;
use thiserror::Error;

/// Error type returned by user callbacks (guards, actions, entry/exit
/// handlers, observers and scheduled callbacks).
pub type HandlerError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Result type returned by user callbacks.
pub type HandlerResult<T = ()> = Result<T, HandlerError>;

/// A user callback panicked; the panic was caught and converted.
#[derive(Debug, Clone, Error, PartialEq)]
#[error("Handler panicked: {0}")]
pub struct HandlerPanic(pub String);

/// Failures observed while dispatching, reported through `ExceptionThrown`.
///
/// None of these abort a dispatch. Each wraps the original cause together
/// with the state and event it happened in.
#[derive(Debug, Error)]
pub enum StateMachineError {
    #[error("Guard for event '{event}' in state '{state}' failed: {source}")]
    Guard {
        state: String,
        event: String,
        #[source]
        source: HandlerError,
    },

    #[error("Entry handler of state '{state}' failed: {source}")]
    Entry {
        state: String,
        event: Option<String>,
        #[source]
        source: HandlerError,
    },

    #[error("Exit handler of state '{state}' failed: {source}")]
    Exit {
        state: String,
        event: Option<String>,
        #[source]
        source: HandlerError,
    },

    #[error("Action for event '{event}' in state '{state}' failed: {source}")]
    Action {
        state: String,
        event: String,
        target: Option<String>,
        #[source]
        source: HandlerError,
    },

    #[error("Observer of '{hook}' failed: {source}")]
    Observer {
        hook: &'static str,
        #[source]
        source: HandlerError,
    },

    #[error("Dispatch of event '{event}' failed: {reason}")]
    Dispatch { event: String, reason: String },
}

impl StateMachineError {
    /// Short name of the error kind, used in log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Guard { .. } => "guard",
            Self::Entry { .. } => "entry",
            Self::Exit { .. } => "exit",
            Self::Action { .. } => "action",
            Self::Observer { .. } => "observer",
            Self::Dispatch { .. } => "dispatch",
        }
    }
}

/// Programming errors returned directly to the caller.
#[derive(Debug, Error)]
pub enum MachineError {
    #[error("State machine has not been initialized. Call initialize() first")]
    NotInitialized,

    #[error("State machine is already initialized")]
    AlreadyInitialized,

    #[error("State machine has been disposed")]
    Disposed,

    #[error("State '{state}' already belongs to superstate '{owner}'")]
    OwnershipConflict { state: String, owner: String },

    #[error("Invalid state hierarchy: {reason}")]
    InvalidHierarchy { reason: String },

    #[error("Unknown state '{state}'")]
    UnknownState { state: String },

    #[error("Synchronous call from the machine's own worker thread would deadlock")]
    WouldDeadlock,

    #[error(transparent)]
    Queue(#[from] QueueError),
}
