//! Callback queues and timed scheduling.
//!
//! - [`DelegateQueue`]: ordered callbacks on one worker thread, with
//!   priority posts and blocking sends. Active state machines run on one.
//! - [`Scheduler`]: delayed and periodic callbacks driven by a polling timer,
//!   each task served by its own pooled worker thread.
//! - [`SynchronizationContext`]: where callbacks get marshaled to.

mod delegate_queue;
mod error;
mod events;
mod sync_context;
mod task;
mod timed;

pub use delegate_queue::{DelegateQueue, QueueHandle};
pub use error::{QueueError, SchedulerError};
pub use events::InvokeCompletedEventArgs;
pub use sync_context::{Callback, InlineContext, SynchronizationContext};
pub use task::{RepeatCount, ScheduledCallback, TaskId};
pub use timed::Scheduler;
