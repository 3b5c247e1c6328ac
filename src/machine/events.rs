//! Lifecycle events raised by a dispatch and the observers that receive them.

use crate::core::{
    invoke, Event, EventArgs, EventContext, HandlerId, HandlerList, HandlerResult, State,
    StateMachineError,
};
use parking_lot::RwLock;
use std::sync::Arc;

/// Observer of `BeginDispatch`, `BeginTransition` and `TransitionDeclined`.
pub type DispatchObserver<S, E, A> =
    Arc<dyn Fn(&EventContext<S, E, A>) -> HandlerResult + Send + Sync>;

/// Observer of `TransitionCompleted`.
pub type CompletedObserver<S, E, A> =
    Arc<dyn Fn(&TransitionCompletedEventArgs<S, E, A>) -> HandlerResult + Send + Sync>;

/// Observer of `ExceptionThrown`.
pub type ErrorObserver<S, E, A> =
    Arc<dyn Fn(&TransitionErrorEventArgs<S, E, A>) -> HandlerResult + Send + Sync>;

/// Payload of `TransitionCompleted`.
#[derive(Clone, Debug)]
pub struct TransitionCompletedEventArgs<S: State, E: Event, A: EventArgs> {
    context: EventContext<S, E, A>,
    target_state: S,
    action_error: Option<Arc<StateMachineError>>,
}

impl<S: State, E: Event, A: EventArgs> TransitionCompletedEventArgs<S, E, A> {
    pub(crate) fn new(
        context: EventContext<S, E, A>,
        target_state: S,
        action_error: Option<Arc<StateMachineError>>,
    ) -> Self {
        Self {
            context,
            target_state,
            action_error,
        }
    }

    pub fn event_id(&self) -> &E {
        self.context.event_id()
    }

    pub fn source_state(&self) -> &S {
        self.context.source_state()
    }

    pub fn args(&self) -> Option<&A> {
        self.context.args()
    }

    /// Leaf state the machine settled in.
    pub fn target_state(&self) -> &S {
        &self.target_state
    }

    /// Last error raised by the transition's actions, if any failed.
    pub fn action_error(&self) -> Option<&Arc<StateMachineError>> {
        self.action_error.as_ref()
    }
}

/// Payload of `ExceptionThrown`.
///
/// The context is absent for failures raised while initializing.
#[derive(Clone, Debug)]
pub struct TransitionErrorEventArgs<S: State, E: Event, A: EventArgs> {
    context: Option<EventContext<S, E, A>>,
    error: Arc<StateMachineError>,
}

impl<S: State, E: Event, A: EventArgs> TransitionErrorEventArgs<S, E, A> {
    pub(crate) fn new(
        context: Option<EventContext<S, E, A>>,
        error: Arc<StateMachineError>,
    ) -> Self {
        Self { context, error }
    }

    pub fn event_id(&self) -> Option<&E> {
        self.context.as_ref().map(EventContext::event_id)
    }

    pub fn source_state(&self) -> Option<&S> {
        self.context.as_ref().map(EventContext::source_state)
    }

    pub fn args(&self) -> Option<&A> {
        self.context.as_ref().and_then(EventContext::args)
    }

    pub fn error(&self) -> &Arc<StateMachineError> {
        &self.error
    }
}

/// Every registered lifecycle observer of one machine.
///
/// Shared with callbacks marshaled to a synchronization context, so lists
/// are snapshotted under the lock and invoked outside it.
pub(crate) struct Observers<S: State, E: Event, A: EventArgs> {
    pub(crate) begin_dispatch: RwLock<HandlerList<DispatchObserver<S, E, A>>>,
    pub(crate) begin_transition: RwLock<HandlerList<DispatchObserver<S, E, A>>>,
    pub(crate) declined: RwLock<HandlerList<DispatchObserver<S, E, A>>>,
    pub(crate) completed: RwLock<HandlerList<CompletedObserver<S, E, A>>>,
    pub(crate) exception: RwLock<HandlerList<ErrorObserver<S, E, A>>>,
}

impl<S: State, E: Event, A: EventArgs> Observers<S, E, A> {
    pub(crate) fn new() -> Self {
        Self {
            begin_dispatch: RwLock::new(HandlerList::new()),
            begin_transition: RwLock::new(HandlerList::new()),
            declined: RwLock::new(HandlerList::new()),
            completed: RwLock::new(HandlerList::new()),
            exception: RwLock::new(HandlerList::new()),
        }
    }

    pub(crate) fn remove(&self, id: HandlerId) -> bool {
        self.begin_dispatch.write().remove(id)
            || self.begin_transition.write().remove(id)
            || self.declined.write().remove(id)
            || self.completed.write().remove(id)
            || self.exception.write().remove(id)
    }

    /// Run one of the context observer lists; failures go to `ExceptionThrown`.
    pub(crate) fn raise_context(
        &self,
        hook: &'static str,
        list: &RwLock<HandlerList<DispatchObserver<S, E, A>>>,
        context: &EventContext<S, E, A>,
    ) {
        let handlers = list.read().snapshot();
        for handler in handlers {
            if let Err(source) = invoke(|| handler(context)) {
                self.observer_failed(hook, Some(context), source);
            }
        }
    }

    pub(crate) fn raise_completed(&self, args: &TransitionCompletedEventArgs<S, E, A>) {
        let handlers = self.completed.read().snapshot();
        for handler in handlers {
            if let Err(source) = invoke(|| handler(args)) {
                self.observer_failed("TransitionCompleted", Some(&args.context), source);
            }
        }
    }

    /// Failures of `ExceptionThrown` observers are logged and dropped.
    pub(crate) fn raise_exception(&self, args: &TransitionErrorEventArgs<S, E, A>) {
        let handlers = self.exception.read().snapshot();
        for handler in handlers {
            if let Err(error) = invoke(|| handler(args)) {
                tracing::warn!(
                    error = %error,
                    original = %args.error,
                    "ExceptionThrown observer failed"
                );
            }
        }
    }

    fn observer_failed(
        &self,
        hook: &'static str,
        context: Option<&EventContext<S, E, A>>,
        source: crate::core::HandlerError,
    ) {
        let error = StateMachineError::Observer { hook, source };
        tracing::warn!(hook, error = %error, "lifecycle observer failed");
        let args = TransitionErrorEventArgs::new(context.cloned(), Arc::new(error));
        self.raise_exception(&args);
    }

    pub(crate) fn has_begin_dispatch(&self) -> bool {
        !self.begin_dispatch.read().is_empty()
    }

    pub(crate) fn has_begin_transition(&self) -> bool {
        !self.begin_transition.read().is_empty()
    }

    pub(crate) fn has_declined(&self) -> bool {
        !self.declined.read().is_empty()
    }

    pub(crate) fn has_completed(&self) -> bool {
        !self.completed.read().is_empty()
    }

    pub(crate) fn has_exception(&self) -> bool {
        !self.exception.read().is_empty()
    }
}

/// Registration surface for lifecycle observers.
///
/// Cheap to clone; every clone registers on the same machine. Safe to use
/// from inside handlers while a dispatch is running.
pub struct Lifecycle<S: State, E: Event, A: EventArgs> {
    pub(crate) observers: Arc<Observers<S, E, A>>,
}

impl<S: State, E: Event, A: EventArgs> Clone for Lifecycle<S, E, A> {
    fn clone(&self) -> Self {
        Self {
            observers: Arc::clone(&self.observers),
        }
    }
}

impl<S: State, E: Event, A: EventArgs> Lifecycle<S, E, A> {
    pub(crate) fn new() -> Self {
        Self {
            observers: Arc::new(Observers::new()),
        }
    }

    /// Raised once per dispatch, before anything else happens.
    pub fn on_begin_dispatch<F>(&self, observer: F) -> HandlerId
    where
        F: Fn(&EventContext<S, E, A>) -> HandlerResult + Send + Sync + 'static,
    {
        self.observers.begin_dispatch.write().add(Arc::new(observer))
    }

    /// Raised when a transition's guard passed, before the first exit.
    pub fn on_begin_transition<F>(&self, observer: F) -> HandlerId
    where
        F: Fn(&EventContext<S, E, A>) -> HandlerResult + Send + Sync + 'static,
    {
        self.observers.begin_transition.write().add(Arc::new(observer))
    }

    pub fn on_transition_completed<F>(&self, observer: F) -> HandlerId
    where
        F: Fn(&TransitionCompletedEventArgs<S, E, A>) -> HandlerResult + Send + Sync + 'static,
    {
        self.observers.completed.write().add(Arc::new(observer))
    }

    pub fn on_transition_declined<F>(&self, observer: F) -> HandlerId
    where
        F: Fn(&EventContext<S, E, A>) -> HandlerResult + Send + Sync + 'static,
    {
        self.observers.declined.write().add(Arc::new(observer))
    }

    /// Failures of these observers are logged and otherwise ignored.
    pub fn on_exception_thrown<F>(&self, observer: F) -> HandlerId
    where
        F: Fn(&TransitionErrorEventArgs<S, E, A>) -> HandlerResult + Send + Sync + 'static,
    {
        self.observers.exception.write().add(Arc::new(observer))
    }

    /// Returns `false` if no observer has this id.
    pub fn remove_observer(&self, id: HandlerId) -> bool {
        self.observers.remove(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};

    #[derive(Clone, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
    enum Valve {
        Shut,
    }

    impl State for Valve {
        fn name(&self) -> &str {
            "Shut"
        }
    }

    type Obs = Observers<Valve, &'static str, u8>;

    #[test]
    fn failing_observer_is_reported_as_exception() {
        let observers = Obs::new();
        let seen = Arc::new(RwLock::new(Vec::new()));
        observers
            .declined
            .write()
            .add(Arc::new(|_: &EventContext<Valve, &str, u8>| Err("bad".into())));
        let sink = Arc::clone(&seen);
        observers.exception.write().add(Arc::new(
            move |args: &TransitionErrorEventArgs<Valve, &str, u8>| {
                sink.write().push(args.error().kind());
                Ok(())
            },
        ));

        let ctx = EventContext::new(Valve::Shut, "open", Some(3));
        observers.raise_context("TransitionDeclined", &observers.declined, &ctx);

        assert_eq!(*seen.read(), vec!["observer"]);
    }

    #[test]
    fn failing_exception_observer_is_swallowed() {
        let observers = Obs::new();
        observers.exception.write().add(Arc::new(
            |_: &TransitionErrorEventArgs<Valve, &str, u8>| -> HandlerResult {
                panic!("observer exploded")
            },
        ));

        let error = Arc::new(StateMachineError::Dispatch {
            event: "open".to_string(),
            reason: "test".to_string(),
        });
        observers.raise_exception(&TransitionErrorEventArgs::new(None, error));
    }

    #[test]
    fn remove_finds_the_right_list() {
        let observers = Obs::new();
        let id = observers
            .completed
            .write()
            .add(Arc::new(|_: &TransitionCompletedEventArgs<Valve, &str, u8>| Ok(())));

        assert!(observers.has_completed());
        assert!(observers.remove(id));
        assert!(!observers.remove(id));
        assert!(!observers.has_completed());
    }

    #[test]
    fn completed_args_expose_the_dispatch() {
        let ctx = EventContext::new(Valve::Shut, "open", Some(9));
        let args = TransitionCompletedEventArgs::new(ctx, Valve::Shut, None);

        assert_eq!(args.event_id(), &"open");
        assert_eq!(args.source_state(), &Valve::Shut);
        assert_eq!(args.args(), Some(&9));
        assert!(args.action_error().is_none());
    }
}
