//! Execution models: when and on which thread events get dispatched.
//!
//! - [`PassiveStateMachine`]: events wait in a deque until the host calls
//!   `execute()`
//! - [`ActiveStateMachine`]: events are dispatched on a dedicated worker
//!   thread as soon as it gets to them

mod active;
mod passive;
mod sender;

pub use active::{ActiveSender, ActiveStateMachine};
pub use passive::{PassiveSender, PassiveStateMachine};
pub use sender::EventSender;
