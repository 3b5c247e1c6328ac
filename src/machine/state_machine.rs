//! The dispatch core shared by both execution models.

use super::events::{Lifecycle, TransitionCompletedEventArgs, TransitionErrorEventArgs};
use super::notify::Notifier;
use super::storage::{InternalStorage, StateStorage};
use crate::core::{
    panic_message, Action, Event, EventArgs, EventContext, Guard, HandlerId, HandlerResult,
    HistoryType, MachineError, State, StateMachineError,
};
use crate::graph::{StateGraph, TransitionResult};
use crate::scheduler::{InlineContext, SynchronizationContext};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// A hierarchical state machine: graph, current state and lifecycle events.
///
/// `StateMachine` dispatches synchronously on the calling thread. Queueing
/// lives in [`PassiveStateMachine`](crate::execution::PassiveStateMachine)
/// and [`ActiveStateMachine`](crate::execution::ActiveStateMachine).
///
/// # Example
///
/// ```rust
/// use hsm_runtime::machine::StateMachine;
/// use hsm_runtime::state_enum;
///
/// state_enum! {
///     pub enum Door { Closed, Open }
/// }
///
/// let mut machine: StateMachine<Door, &str, ()> = StateMachine::new();
/// machine.add_transition(Door::Closed, "open", Door::Open, vec![]);
/// machine.add_transition(Door::Open, "close", Door::Closed, vec![]);
/// machine.initialize(Door::Closed).unwrap();
///
/// let result = machine.dispatch("open", None).unwrap();
/// assert!(result.has_fired());
/// assert_eq!(machine.current_state(), Some(Door::Open));
/// ```
pub struct StateMachine<S: State, E: Event, A: EventArgs> {
    pub(crate) graph: StateGraph<S, E, A>,
    storage: Arc<dyn StateStorage<S>>,
    lifecycle: Lifecycle<S, E, A>,
    notifier: Notifier<S, E, A>,
    initialized: Arc<AtomicBool>,
}

impl<S: State, E: Event, A: EventArgs> StateMachine<S, E, A> {
    /// A machine with internal storage that raises events in place.
    pub fn new() -> Self {
        let lifecycle = Lifecycle::new();
        let notifier = Notifier::new(Arc::clone(&lifecycle.observers), Arc::new(InlineContext));
        Self {
            graph: StateGraph::new(),
            storage: Arc::new(InternalStorage::new()),
            lifecycle,
            notifier,
            initialized: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Keep the current state in host-provided storage.
    pub fn with_storage(mut self, storage: Arc<dyn StateStorage<S>>) -> Self {
        self.storage = storage;
        self
    }

    /// Raise lifecycle events through `sync` instead of in place.
    pub fn with_context(mut self, sync: Arc<dyn SynchronizationContext>) -> Self {
        self.notifier.set_context(sync);
        self
    }

    pub fn synchronization_context(&self) -> Arc<dyn SynchronizationContext> {
        self.notifier.context()
    }

    // ---- graph building ----

    /// Register `source --event--> target`.
    pub fn add_transition(
        &mut self,
        source: S,
        event: E,
        target: S,
        actions: Vec<Action<S, E, A>>,
    ) {
        self.graph
            .add_transition(source, event, None, Some(target), actions);
    }

    pub fn add_guarded_transition(
        &mut self,
        source: S,
        event: E,
        guard: Guard<S, E, A>,
        target: S,
        actions: Vec<Action<S, E, A>>,
    ) {
        self.graph
            .add_transition(source, event, Some(guard), Some(target), actions);
    }

    /// Register a transition that runs its actions without leaving `source`.
    pub fn add_internal_transition(
        &mut self,
        source: S,
        event: E,
        guard: Option<Guard<S, E, A>>,
        actions: Vec<Action<S, E, A>>,
    ) {
        self.graph.add_transition(source, event, guard, None, actions);
    }

    /// Register a transition from its parts; `target == None` is internal.
    pub fn define_transition(
        &mut self,
        source: S,
        event: E,
        guard: Option<Guard<S, E, A>>,
        target: Option<S>,
        actions: Vec<Action<S, E, A>>,
    ) {
        self.graph.add_transition(source, event, guard, target, actions);
    }

    pub fn setup_substates(
        &mut self,
        superstate: S,
        history: HistoryType,
        initial: S,
        rest: &[S],
    ) -> Result<(), MachineError> {
        self.graph.setup_substates(superstate, history, initial, rest)
    }

    /// Entry/exit registration for one state, creating it if needed.
    pub fn state(&mut self, id: S) -> StateHandle<'_, S, E, A> {
        self.graph.ensure(id.clone());
        StateHandle {
            graph: &mut self.graph,
            id,
        }
    }

    pub fn graph(&self) -> &StateGraph<S, E, A> {
        &self.graph
    }

    // ---- observers ----

    pub fn lifecycle(&self) -> Lifecycle<S, E, A> {
        self.lifecycle.clone()
    }

    pub fn on_begin_dispatch<F>(&self, observer: F) -> HandlerId
    where
        F: Fn(&EventContext<S, E, A>) -> HandlerResult + Send + Sync + 'static,
    {
        self.lifecycle.on_begin_dispatch(observer)
    }

    pub fn on_begin_transition<F>(&self, observer: F) -> HandlerId
    where
        F: Fn(&EventContext<S, E, A>) -> HandlerResult + Send + Sync + 'static,
    {
        self.lifecycle.on_begin_transition(observer)
    }

    pub fn on_transition_completed<F>(&self, observer: F) -> HandlerId
    where
        F: Fn(&TransitionCompletedEventArgs<S, E, A>) -> HandlerResult + Send + Sync + 'static,
    {
        self.lifecycle.on_transition_completed(observer)
    }

    pub fn on_transition_declined<F>(&self, observer: F) -> HandlerId
    where
        F: Fn(&EventContext<S, E, A>) -> HandlerResult + Send + Sync + 'static,
    {
        self.lifecycle.on_transition_declined(observer)
    }

    pub fn on_exception_thrown<F>(&self, observer: F) -> HandlerId
    where
        F: Fn(&TransitionErrorEventArgs<S, E, A>) -> HandlerResult + Send + Sync + 'static,
    {
        self.lifecycle.on_exception_thrown(observer)
    }

    pub fn remove_observer(&self, id: HandlerId) -> bool {
        self.lifecycle.remove_observer(id)
    }

    // ---- lifecycle ----

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    /// Shared flag that flips once the machine has been initialized, for
    /// handles that reject events without locking the machine.
    pub(crate) fn initialized_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.initialized)
    }

    /// `None` until the machine has been initialized.
    pub fn current_state(&self) -> Option<S> {
        if self.is_initialized() {
            self.storage.get()
        } else {
            None
        }
    }

    pub fn storage(&self) -> Arc<dyn StateStorage<S>> {
        Arc::clone(&self.storage)
    }

    /// Enter `initial` (and its ancestors, root first), then descend through
    /// initial substates to a leaf.
    pub fn initialize(&mut self, initial: S) -> Result<(), MachineError> {
        if self.is_initialized() {
            return Err(MachineError::AlreadyInitialized);
        }
        let idx = self.graph.ensure(initial);
        let leaf = self.graph.enter_from_root(idx, &self.notifier);
        let leaf = self.graph.id(leaf).clone();
        tracing::debug!(state = leaf.name(), "state machine initialized");
        self.storage.set(leaf);
        self.initialized.store(true, Ordering::Release);
        Ok(())
    }

    /// Pick up the state already held by the storage, without running entry
    /// handlers.
    pub fn resume(&mut self) -> Result<S, MachineError> {
        if self.is_initialized() {
            return Err(MachineError::AlreadyInitialized);
        }
        let state = self.storage.get().ok_or(MachineError::NotInitialized)?;
        if !self.graph.contains(&state) {
            return Err(MachineError::UnknownState {
                state: state.name().to_string(),
            });
        }
        tracing::debug!(state = state.name(), "state machine resumed");
        self.initialized.store(true, Ordering::Release);
        Ok(state)
    }

    pub(crate) fn resume_at(&mut self, state: S) {
        self.storage.set(state);
        self.initialized.store(true, Ordering::Release);
    }

    /// Dispatch one event and wait for the outcome.
    ///
    /// Handler failures never surface here; they are raised through
    /// `ExceptionThrown`. Only calling before `initialize` is an error.
    pub fn dispatch(
        &mut self,
        event: E,
        args: Option<A>,
    ) -> Result<TransitionResult<S>, MachineError> {
        if !self.is_initialized() {
            return Err(MachineError::NotInitialized);
        }
        let current = self.storage.get().ok_or(MachineError::NotInitialized)?;
        let context = EventContext::new(current, event, args);
        tracing::debug!(
            state = context.source_state().name(),
            event = ?context.event_id(),
            "dispatching event"
        );

        self.notifier.begin_dispatch(&context);

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.dispatch_in(&context)));
        let result = match outcome {
            Ok(Ok(result)) => result,
            Ok(Err(reason)) => {
                self.handle_dispatch_failure(&context, reason);
                TransitionResult::not_fired()
            }
            Err(payload) => {
                self.handle_dispatch_failure(&context, panic_message(payload.as_ref()));
                TransitionResult::not_fired()
            }
        };
        Ok(result)
    }

    fn dispatch_in(
        &mut self,
        context: &EventContext<S, E, A>,
    ) -> Result<TransitionResult<S>, String> {
        let current = context.source_state();
        let origin = self
            .graph
            .index_of(current)
            .ok_or_else(|| format!("current state '{}' is not part of the graph", current.name()))?;

        let result = self.graph.dispatch(origin, context, &self.notifier);
        match result.new_state() {
            Some(state) => {
                tracing::debug!(
                    from = current.name(),
                    to = state.name(),
                    event = ?context.event_id(),
                    "transition completed"
                );
                self.storage.set(state.clone());
                self.notifier.completed(TransitionCompletedEventArgs::new(
                    context.clone(),
                    state.clone(),
                    result.action_error().cloned(),
                ));
            }
            None => {
                tracing::debug!(
                    state = current.name(),
                    event = ?context.event_id(),
                    "transition declined"
                );
                self.notifier.declined(context);
            }
        }
        Ok(result)
    }

    /// Route a failure that escaped the whole dispatch into `ExceptionThrown`.
    pub(crate) fn handle_dispatch_failure(&self, context: &EventContext<S, E, A>, reason: String) {
        let error = StateMachineError::Dispatch {
            event: format!("{:?}", context.event_id()),
            reason,
        };
        tracing::warn!(error = %error, "dispatch failed");
        self.notifier.exception(Some(context), Arc::new(error));
    }
}

impl<S: State, E: Event, A: EventArgs> Default for StateMachine<S, E, A> {
    fn default() -> Self {
        Self::new()
    }
}

/// Entry/exit registration for one state.
pub struct StateHandle<'a, S: State, E: Event, A: EventArgs> {
    graph: &'a mut StateGraph<S, E, A>,
    id: S,
}

impl<S: State, E: Event, A: EventArgs> StateHandle<'_, S, E, A> {
    pub fn id(&self) -> &S {
        &self.id
    }

    pub fn on_entry<F>(&mut self, handler: F) -> HandlerId
    where
        F: Fn(Option<&EventContext<S, E, A>>) -> HandlerResult + Send + Sync + 'static,
    {
        self.graph.add_entry_handler(self.id.clone(), Arc::new(handler))
    }

    pub fn remove_entry(&mut self, id: HandlerId) -> bool {
        self.graph.remove_entry_handler(&self.id, id)
    }

    pub fn on_exit<F>(&mut self, handler: F) -> HandlerId
    where
        F: Fn(Option<&EventContext<S, E, A>>) -> HandlerResult + Send + Sync + 'static,
    {
        self.graph.add_exit_handler(self.id.clone(), Arc::new(handler))
    }

    pub fn remove_exit(&mut self, id: HandlerId) -> bool {
        self.graph.remove_exit_handler(&self.id, id)
    }

    pub fn superstate(&self) -> Option<&S> {
        self.graph.superstate_of(&self.id)
    }

    pub fn level(&self) -> usize {
        self.graph.level_of(&self.id).unwrap_or(1)
    }
}
