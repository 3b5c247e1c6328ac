//! The context of one in-flight dispatch.

use super::state::{Event, EventArgs, State};

/// Immutable description of the event being dispatched.
///
/// A fresh context is built for every dispatch and dropped when the dispatch
/// returns. Guards, actions, entry/exit handlers and lifecycle observers all
/// see the same context.
#[derive(Clone, Debug, PartialEq)]
pub struct EventContext<S: State, E: Event, A: EventArgs> {
    source_state: S,
    event_id: E,
    args: Option<A>,
}

impl<S: State, E: Event, A: EventArgs> EventContext<S, E, A> {
    pub fn new(source_state: S, event_id: E, args: Option<A>) -> Self {
        Self {
            source_state,
            event_id,
            args,
        }
    }

    /// The machine's current state when the event was dispatched.
    pub fn source_state(&self) -> &S {
        &self.source_state
    }

    pub fn event_id(&self) -> &E {
        &self.event_id
    }

    pub fn args(&self) -> Option<&A> {
        self.args.as_ref()
    }
}
