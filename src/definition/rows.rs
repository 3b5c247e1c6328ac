//! Declarative rows describing states and transitions.

use crate::core::{Event, HistoryType, State};

/// One state's place in the hierarchy.
///
/// `initial_state` and `history` only matter for superstates.
#[derive(Clone, Debug, PartialEq)]
pub struct StateRow<S: State> {
    pub state: S,
    pub superstate: Option<S>,
    pub initial_state: Option<S>,
    pub history: HistoryType,
}

impl<S: State> StateRow<S> {
    pub fn new(state: S) -> Self {
        Self {
            state,
            superstate: None,
            initial_state: None,
            history: HistoryType::None,
        }
    }

    pub fn superstate(mut self, superstate: S) -> Self {
        self.superstate = Some(superstate);
        self
    }

    pub fn initial(mut self, initial: S) -> Self {
        self.initial_state = Some(initial);
        self
    }

    pub fn history(mut self, history: HistoryType) -> Self {
        self.history = history;
        self
    }
}

/// A transition whose guard and actions are referenced by registry name.
///
/// No target makes it an internal transition.
#[derive(Clone, Debug, PartialEq)]
pub struct TransitionRow<S: State, E: Event> {
    pub source: S,
    pub event: E,
    pub guard: Option<String>,
    pub target: Option<S>,
    pub actions: Vec<String>,
}

impl<S: State, E: Event> TransitionRow<S, E> {
    pub fn new(source: S, event: E) -> Self {
        Self {
            source,
            event,
            guard: None,
            target: None,
            actions: Vec::new(),
        }
    }

    pub fn guard(mut self, name: impl Into<String>) -> Self {
        self.guard = Some(name.into());
        self
    }

    pub fn target(mut self, target: S) -> Self {
        self.target = Some(target);
        self
    }

    /// Append an action; actions run in the order they were added.
    pub fn action(mut self, name: impl Into<String>) -> Self {
        self.actions.push(name.into());
        self
    }
}
