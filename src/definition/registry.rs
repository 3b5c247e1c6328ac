//! Named guards and actions that definition rows refer to.

use crate::core::{Action, Event, EventArgs, EventContext, Guard, HandlerResult, State};
use std::collections::HashMap;
use std::sync::Arc;

/// Lookup table from names to guard and action callbacks.
pub struct HandlerRegistry<S: State, E: Event, A: EventArgs> {
    guards: HashMap<String, Guard<S, E, A>>,
    actions: HashMap<String, Action<S, E, A>>,
}

impl<S: State, E: Event, A: EventArgs> HandlerRegistry<S, E, A> {
    pub fn new() -> Self {
        Self {
            guards: HashMap::new(),
            actions: HashMap::new(),
        }
    }

    /// Register a guard; an existing guard with the same name is replaced.
    pub fn guard(mut self, name: impl Into<String>, guard: Guard<S, E, A>) -> Self {
        self.guards.insert(name.into(), guard);
        self
    }

    /// Register an infallible predicate as a guard.
    pub fn guard_fn<F>(self, name: impl Into<String>, predicate: F) -> Self
    where
        F: Fn(&EventContext<S, E, A>) -> bool + Send + Sync + 'static,
    {
        self.guard(name, Guard::when(predicate))
    }

    /// Register an action; an existing action with the same name is replaced.
    pub fn action<F>(mut self, name: impl Into<String>, action: F) -> Self
    where
        F: Fn(&EventContext<S, E, A>) -> HandlerResult + Send + Sync + 'static,
    {
        self.actions.insert(name.into(), Arc::new(action));
        self
    }

    pub fn get_guard(&self, name: &str) -> Option<&Guard<S, E, A>> {
        self.guards.get(name)
    }

    pub fn get_action(&self, name: &str) -> Option<&Action<S, E, A>> {
        self.actions.get(name)
    }

    pub fn has_guard(&self, name: &str) -> bool {
        self.guards.contains_key(name)
    }

    pub fn has_action(&self, name: &str) -> bool {
        self.actions.contains_key(name)
    }
}

impl<S: State, E: Event, A: EventArgs> Default for HandlerRegistry<S, E, A> {
    fn default() -> Self {
        Self::new()
    }
}
