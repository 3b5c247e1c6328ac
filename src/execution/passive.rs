//! Passive execution: the host drains the queue when it chooses.

use super::sender::EventSender;
use crate::core::{Event, EventArgs, MachineError, State};
use crate::machine::StateMachine;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

struct Pending<E, A> {
    event: E,
    args: Option<A>,
}

type PendingQueue<E, A> = Arc<Mutex<VecDeque<Pending<E, A>>>>;

fn enqueue<E, A>(
    queue: &Mutex<VecDeque<Pending<E, A>>>,
    initialized: &AtomicBool,
    pending: Pending<E, A>,
    priority: bool,
) -> Result<(), MachineError> {
    if !initialized.load(Ordering::Acquire) {
        return Err(MachineError::NotInitialized);
    }
    let mut queue = queue.lock();
    if priority {
        queue.push_front(pending);
    } else {
        queue.push_back(pending);
    }
    Ok(())
}

/// State machine whose queued events are dispatched by [`execute`].
///
/// Nothing runs in the background; `send` only queues. Sending before the
/// machine is initialized fails with [`MachineError::NotInitialized`].
///
/// [`execute`]: PassiveStateMachine::execute
///
/// # Example
///
/// ```rust
/// use hsm_runtime::execution::PassiveStateMachine;
/// use hsm_runtime::state_enum;
///
/// state_enum! {
///     pub enum Turnstile { Locked, Unlocked }
/// }
///
/// let mut turnstile: PassiveStateMachine<Turnstile, &str, ()> = PassiveStateMachine::new();
/// turnstile
///     .machine_mut()
///     .add_transition(Turnstile::Locked, "coin", Turnstile::Unlocked, vec![]);
/// turnstile.initialize(Turnstile::Locked).unwrap();
///
/// turnstile.send("coin", None).unwrap();
/// assert_eq!(turnstile.current_state(), Some(Turnstile::Locked));
///
/// assert_eq!(turnstile.execute().unwrap(), 1);
/// assert_eq!(turnstile.current_state(), Some(Turnstile::Unlocked));
/// ```
pub struct PassiveStateMachine<S: State, E: Event, A: EventArgs> {
    machine: StateMachine<S, E, A>,
    queue: PendingQueue<E, A>,
    initialized: Arc<AtomicBool>,
}

impl<S: State, E: Event, A: EventArgs> PassiveStateMachine<S, E, A> {
    pub fn new() -> Self {
        Self::from_machine(StateMachine::new())
    }

    /// Wrap a machine that was already built or customized.
    pub fn from_machine(machine: StateMachine<S, E, A>) -> Self {
        Self {
            initialized: machine.initialized_flag(),
            machine,
            queue: Arc::new(Mutex::new(VecDeque::new())),
        }
    }

    pub fn machine(&self) -> &StateMachine<S, E, A> {
        &self.machine
    }

    pub fn machine_mut(&mut self) -> &mut StateMachine<S, E, A> {
        &mut self.machine
    }

    pub fn into_machine(self) -> StateMachine<S, E, A> {
        self.machine
    }

    pub fn initialize(&mut self, initial: S) -> Result<(), MachineError> {
        self.machine.initialize(initial)
    }

    pub fn current_state(&self) -> Option<S> {
        self.machine.current_state()
    }

    pub fn send(&self, event: E, args: Option<A>) -> Result<(), MachineError> {
        enqueue(&self.queue, &self.initialized, Pending { event, args }, false)
    }

    pub fn send_priority(&self, event: E, args: Option<A>) -> Result<(), MachineError> {
        enqueue(&self.queue, &self.initialized, Pending { event, args }, true)
    }

    pub fn pending_count(&self) -> usize {
        self.queue.lock().len()
    }

    /// Detached handle that queues onto this machine, usable from handlers.
    pub fn sender(&self) -> PassiveSender<E, A> {
        PassiveSender {
            queue: Arc::clone(&self.queue),
            initialized: Arc::clone(&self.initialized),
        }
    }

    /// Dispatch queued events, front first, until the queue is empty.
    ///
    /// Events queued by handlers while draining are dispatched by the same
    /// call. Returns how many events were dispatched.
    pub fn execute(&mut self) -> Result<usize, MachineError> {
        if !self.machine.is_initialized() {
            return Err(MachineError::NotInitialized);
        }
        let mut dispatched = 0;
        loop {
            let Some(pending) = self.queue.lock().pop_front() else {
                break;
            };
            self.machine.dispatch(pending.event, pending.args)?;
            dispatched += 1;
        }
        tracing::trace!(dispatched, "passive queue drained");
        Ok(dispatched)
    }
}

impl<S: State, E: Event, A: EventArgs> Default for PassiveStateMachine<S, E, A> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: State, E: Event, A: EventArgs> EventSender<E, A> for PassiveStateMachine<S, E, A> {
    fn send(&self, event: E, args: Option<A>) -> Result<(), MachineError> {
        PassiveStateMachine::send(self, event, args)
    }

    fn send_priority(&self, event: E, args: Option<A>) -> Result<(), MachineError> {
        PassiveStateMachine::send_priority(self, event, args)
    }
}

/// Queues events onto a [`PassiveStateMachine`].
pub struct PassiveSender<E: Event, A: EventArgs> {
    queue: PendingQueue<E, A>,
    initialized: Arc<AtomicBool>,
}

impl<E: Event, A: EventArgs> Clone for PassiveSender<E, A> {
    fn clone(&self) -> Self {
        Self {
            queue: Arc::clone(&self.queue),
            initialized: Arc::clone(&self.initialized),
        }
    }
}

impl<E: Event, A: EventArgs> EventSender<E, A> for PassiveSender<E, A> {
    fn send(&self, event: E, args: Option<A>) -> Result<(), MachineError> {
        enqueue(&self.queue, &self.initialized, Pending { event, args }, false)
    }

    fn send_priority(&self, event: E, args: Option<A>) -> Result<(), MachineError> {
        enqueue(&self.queue, &self.initialized, Pending { event, args }, true)
    }
}
