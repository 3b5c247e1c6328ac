//! Active execution: events are dispatched on a dedicated worker thread.

use super::sender::EventSender;
use crate::config::ActiveConfig;
use crate::core::{Event, EventArgs, MachineError, State};
use crate::graph::TransitionResult;
use crate::machine::{Lifecycle, StateMachine, StateStorage};
use crate::scheduler::{DelegateQueue, QueueError, QueueHandle};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

type Core<S, E, A> = Arc<Mutex<StateMachine<S, E, A>>>;

fn queue_error(error: QueueError) -> MachineError {
    match error {
        QueueError::Disposed => MachineError::Disposed,
        other => MachineError::Queue(other),
    }
}

/// Events are only accepted once the machine has been initialized.
fn accepting(initialized: &AtomicBool, queue: &QueueHandle) -> Result<(), MachineError> {
    if queue.is_disposed() {
        return Err(MachineError::Disposed);
    }
    if !initialized.load(Ordering::Acquire) {
        return Err(MachineError::NotInitialized);
    }
    Ok(())
}

fn dispatch_queued<S: State, E: Event, A: EventArgs>(
    core: &Mutex<StateMachine<S, E, A>>,
    event: E,
    args: Option<A>,
) {
    if let Err(error) = core.lock().dispatch(event.clone(), args) {
        tracing::warn!(event = ?event, error = %error, "queued event dropped");
    }
}

/// State machine that owns a worker thread and dispatches queued events on
/// it, one at a time.
///
/// Lifecycle events run through the machine's synchronization context. By
/// default that is [`InlineContext`](crate::scheduler::InlineContext), so
/// observers run on the worker thread.
///
/// # Example
///
/// ```rust
/// use hsm_runtime::execution::ActiveStateMachine;
/// use hsm_runtime::state_enum;
///
/// state_enum! {
///     pub enum Link { Down, Up }
/// }
///
/// let link: ActiveStateMachine<Link, &str, ()> = ActiveStateMachine::new().unwrap();
/// link.configure(|m| {
///     m.add_transition(Link::Down, "connect", Link::Up, vec![]);
/// })
/// .unwrap();
/// link.initialize(Link::Down).unwrap();
///
/// link.send("connect", None).unwrap();
/// link.wait_for_pending_events().unwrap();
/// assert_eq!(link.current_state(), Some(Link::Up));
/// ```
pub struct ActiveStateMachine<S: State, E: Event, A: EventArgs> {
    core: Core<S, E, A>,
    queue: DelegateQueue,
    storage: Arc<dyn StateStorage<S>>,
    lifecycle: Lifecycle<S, E, A>,
    initialized: Arc<AtomicBool>,
}

impl<S: State, E: Event, A: EventArgs> ActiveStateMachine<S, E, A> {
    pub fn new() -> Result<Self, MachineError> {
        Self::with_config(ActiveConfig::default())
    }

    pub fn with_config(config: ActiveConfig) -> Result<Self, MachineError> {
        Self::from_machine(StateMachine::new(), config)
    }

    /// Run an existing machine (custom storage or context) on a new worker.
    pub fn from_machine(
        machine: StateMachine<S, E, A>,
        config: ActiveConfig,
    ) -> Result<Self, MachineError> {
        let queue = DelegateQueue::new(config.thread_name.clone()).map_err(queue_error)?;
        tracing::debug!(thread = %config.thread_name, "active state machine started");
        Ok(Self {
            storage: machine.storage(),
            lifecycle: machine.lifecycle(),
            initialized: machine.initialized_flag(),
            core: Arc::new(Mutex::new(machine)),
            queue,
        })
    }

    fn ensure_off_worker(&self) -> Result<(), MachineError> {
        if self.queue.is_worker_thread() {
            return Err(MachineError::WouldDeadlock);
        }
        if self.queue.is_disposed() {
            return Err(MachineError::Disposed);
        }
        Ok(())
    }

    /// Build or inspect the graph. Waits for any dispatch in progress.
    pub fn configure<R>(
        &self,
        f: impl FnOnce(&mut StateMachine<S, E, A>) -> R,
    ) -> Result<R, MachineError> {
        self.ensure_off_worker()?;
        let mut machine = self.core.lock();
        Ok(f(&mut machine))
    }

    /// Initialize on the worker thread and wait for it.
    pub fn initialize(&self, initial: S) -> Result<(), MachineError> {
        self.ensure_off_worker()?;
        let core = Arc::clone(&self.core);
        self.queue
            .send(move || core.lock().initialize(initial))
            .map_err(queue_error)?
    }

    /// Resume from the state already held in storage, on the worker thread.
    pub fn resume(&self) -> Result<S, MachineError> {
        self.ensure_off_worker()?;
        let core = Arc::clone(&self.core);
        self.queue
            .send(move || core.lock().resume())
            .map_err(queue_error)?
    }

    /// Whatever the state storage currently holds.
    pub fn current_state(&self) -> Option<S> {
        self.storage.get()
    }

    pub fn lifecycle(&self) -> Lifecycle<S, E, A> {
        self.lifecycle.clone()
    }

    /// Queue at the back. Fails with [`MachineError::NotInitialized`] until
    /// `initialize` or `resume` has succeeded.
    pub fn send(&self, event: E, args: Option<A>) -> Result<(), MachineError> {
        accepting(&self.initialized, &self.queue.handle())?;
        let core = Arc::clone(&self.core);
        self.queue
            .post(move || dispatch_queued(&core, event, args))
            .map_err(queue_error)
    }

    pub fn send_priority(&self, event: E, args: Option<A>) -> Result<(), MachineError> {
        accepting(&self.initialized, &self.queue.handle())?;
        let core = Arc::clone(&self.core);
        self.queue
            .post_priority(move || dispatch_queued(&core, event, args))
            .map_err(queue_error)
    }

    /// Queue the event and block until it has been dispatched.
    ///
    /// Fails with [`MachineError::WouldDeadlock`] on the worker thread.
    pub fn send_synchronously(
        &self,
        event: E,
        args: Option<A>,
    ) -> Result<TransitionResult<S>, MachineError> {
        self.ensure_off_worker()?;
        accepting(&self.initialized, &self.queue.handle())?;
        let core = Arc::clone(&self.core);
        self.queue
            .send(move || core.lock().dispatch(event, args))
            .map_err(queue_error)?
    }

    /// Block until every event queued so far has been dispatched.
    pub fn wait_for_pending_events(&self) -> Result<(), MachineError> {
        self.ensure_off_worker()?;
        self.queue.send(|| ()).map_err(queue_error)
    }

    pub fn pending_count(&self) -> usize {
        self.queue.len()
    }

    /// Weak handle for queuing events, safe to capture in handlers.
    pub fn sender(&self) -> ActiveSender<S, E, A> {
        ActiveSender {
            core: Arc::downgrade(&self.core),
            queue: self.queue.handle(),
            initialized: Arc::clone(&self.initialized),
        }
    }

    pub fn is_disposed(&self) -> bool {
        self.queue.is_disposed()
    }

    /// Stop the worker. Queued events are dropped and blocked callers
    /// return [`MachineError::Disposed`]. A dispatch already running is not
    /// waited for.
    pub fn dispose(&self) {
        if !self.queue.is_disposed() {
            tracing::debug!("active state machine disposed");
        }
        self.queue.dispose();
    }
}

impl<S: State, E: Event, A: EventArgs> Drop for ActiveStateMachine<S, E, A> {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl<S: State, E: Event, A: EventArgs> EventSender<E, A> for ActiveStateMachine<S, E, A> {
    fn send(&self, event: E, args: Option<A>) -> Result<(), MachineError> {
        ActiveStateMachine::send(self, event, args)
    }

    fn send_priority(&self, event: E, args: Option<A>) -> Result<(), MachineError> {
        ActiveStateMachine::send_priority(self, event, args)
    }
}

/// Queues events onto an [`ActiveStateMachine`] without keeping it alive.
pub struct ActiveSender<S: State, E: Event, A: EventArgs> {
    core: Weak<Mutex<StateMachine<S, E, A>>>,
    queue: QueueHandle,
    initialized: Arc<AtomicBool>,
}

impl<S: State, E: Event, A: EventArgs> Clone for ActiveSender<S, E, A> {
    fn clone(&self) -> Self {
        Self {
            core: Weak::clone(&self.core),
            queue: self.queue.clone(),
            initialized: Arc::clone(&self.initialized),
        }
    }
}

impl<S: State, E: Event, A: EventArgs> ActiveSender<S, E, A> {
    fn core(&self) -> Result<Core<S, E, A>, MachineError> {
        let core = self.core.upgrade().ok_or(MachineError::Disposed)?;
        accepting(&self.initialized, &self.queue)?;
        Ok(core)
    }
}

impl<S: State, E: Event, A: EventArgs> EventSender<E, A> for ActiveSender<S, E, A> {
    fn send(&self, event: E, args: Option<A>) -> Result<(), MachineError> {
        let core = self.core()?;
        self.queue
            .post(move || dispatch_queued(&core, event, args))
            .map_err(queue_error)
    }

    fn send_priority(&self, event: E, args: Option<A>) -> Result<(), MachineError> {
        let core = self.core()?;
        self.queue
            .post_priority(move || dispatch_queued(&core, event, args))
            .map_err(queue_error)
    }
}
