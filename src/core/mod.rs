//! Core types shared by every layer of the runtime.
//!
//! - State and event identity traits
//! - The per-dispatch `EventContext`
//! - Guards, handler lists and callback aliases
//! - Error types

mod context;
mod error;
mod guard;
mod handlers;
mod state;

pub use context::EventContext;
pub use error::{HandlerError, HandlerPanic, HandlerResult, MachineError, StateMachineError};
pub use guard::Guard;
pub use handlers::{action, state_handler, Action, HandlerId, HandlerList, StateHandler};
pub use state::{Event, EventArgs, HistoryType, State};

pub(crate) use handlers::{invoke, panic_message};
