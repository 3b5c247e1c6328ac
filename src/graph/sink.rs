//! Channel from the graph back to whoever is dispatching.

use crate::core::{Event, EventArgs, EventContext, State, StateMachineError};
use std::sync::Arc;

/// Receives the notifications a transition raises while it fires.
///
/// The graph never reaches for an ambient "current machine"; the dispatcher
/// passes one of these down explicitly.
pub trait TransitionSink<S: State, E: Event, A: EventArgs> {
    /// A transition's guard passed and it is about to exit/act/enter.
    fn begin_transition(&self, context: &EventContext<S, E, A>);

    /// A guard, action, entry or exit handler failed. The traversal goes on.
    fn report(&self, context: Option<&EventContext<S, E, A>>, error: Arc<StateMachineError>);
}
