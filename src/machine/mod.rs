//! The dispatch core.
//!
//! [`StateMachine`] owns the state graph, the current-state storage and the
//! lifecycle observers. It dispatches one event at a time on the calling
//! thread; the execution models in [`crate::execution`] decide when and where
//! that happens.
//!
//! Lifecycle events, in the order a dispatch raises them:
//!
//! - `BeginDispatch`: every dispatch, before anything else
//! - `BeginTransition`: a guard passed, before the first exit
//! - `TransitionCompleted` or `TransitionDeclined`: exactly one of them
//! - `ExceptionThrown`: whenever a handler failed along the way

mod events;
mod notify;
mod state_machine;
mod storage;

pub use events::{
    CompletedObserver, DispatchObserver, ErrorObserver, Lifecycle, TransitionCompletedEventArgs,
    TransitionErrorEventArgs,
};
pub use state_machine::{StateHandle, StateMachine};
pub use storage::{ExternalStorage, InternalStorage, StateStorage};
