//! Marshaling lifecycle events to the machine's synchronization context.

use super::events::{Observers, TransitionCompletedEventArgs, TransitionErrorEventArgs};
use crate::core::{Event, EventArgs, EventContext, State, StateMachineError};
use crate::graph::TransitionSink;
use crate::scheduler::SynchronizationContext;
use std::sync::Arc;

/// Raises lifecycle events: `Begin*` through the blocking `send`, the rest
/// through `post`. Lists with no observers are skipped.
pub(crate) struct Notifier<S: State, E: Event, A: EventArgs> {
    observers: Arc<Observers<S, E, A>>,
    sync: Arc<dyn SynchronizationContext>,
}

impl<S: State, E: Event, A: EventArgs> Notifier<S, E, A> {
    pub(crate) fn new(
        observers: Arc<Observers<S, E, A>>,
        sync: Arc<dyn SynchronizationContext>,
    ) -> Self {
        Self { observers, sync }
    }

    pub(crate) fn set_context(&mut self, sync: Arc<dyn SynchronizationContext>) {
        self.sync = sync;
    }

    pub(crate) fn context(&self) -> Arc<dyn SynchronizationContext> {
        Arc::clone(&self.sync)
    }

    pub(crate) fn begin_dispatch(&self, context: &EventContext<S, E, A>) {
        if !self.observers.has_begin_dispatch() {
            return;
        }
        let observers = Arc::clone(&self.observers);
        let context = context.clone();
        self.sync.send(Box::new(move || {
            observers.raise_context("BeginDispatch", &observers.begin_dispatch, &context)
        }));
    }

    pub(crate) fn declined(&self, context: &EventContext<S, E, A>) {
        if !self.observers.has_declined() {
            return;
        }
        let observers = Arc::clone(&self.observers);
        let context = context.clone();
        self.sync.post(Box::new(move || {
            observers.raise_context("TransitionDeclined", &observers.declined, &context)
        }));
    }

    pub(crate) fn completed(&self, args: TransitionCompletedEventArgs<S, E, A>) {
        if !self.observers.has_completed() {
            return;
        }
        let observers = Arc::clone(&self.observers);
        self.sync
            .post(Box::new(move || observers.raise_completed(&args)));
    }

    pub(crate) fn exception(
        &self,
        context: Option<&EventContext<S, E, A>>,
        error: Arc<StateMachineError>,
    ) {
        if !self.observers.has_exception() {
            return;
        }
        let observers = Arc::clone(&self.observers);
        let args = TransitionErrorEventArgs::new(context.cloned(), error);
        self.sync
            .post(Box::new(move || observers.raise_exception(&args)));
    }
}

impl<S: State, E: Event, A: EventArgs> TransitionSink<S, E, A> for Notifier<S, E, A> {
    fn begin_transition(&self, context: &EventContext<S, E, A>) {
        if !self.observers.has_begin_transition() {
            return;
        }
        let observers = Arc::clone(&self.observers);
        let context = context.clone();
        self.sync.send(Box::new(move || {
            observers.raise_context("BeginTransition", &observers.begin_transition, &context)
        }));
    }

    fn report(&self, context: Option<&EventContext<S, E, A>>, error: Arc<StateMachineError>) {
        self.exception(context, error);
    }
}
