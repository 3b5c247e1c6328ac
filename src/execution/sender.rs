//! Queueing strategy shared by the execution models.

use crate::core::{Event, EventArgs, MachineError};

/// Something events can be queued on.
///
/// Both execution models and their detached sender handles implement this,
/// so host code (and handlers) can queue events without knowing which model
/// is running underneath.
pub trait EventSender<E: Event, A: EventArgs> {
    /// Queue at the back.
    fn send(&self, event: E, args: Option<A>) -> Result<(), MachineError>;

    /// Queue at the front; never interrupts a dispatch already running.
    fn send_priority(&self, event: E, args: Option<A>) -> Result<(), MachineError>;
}
