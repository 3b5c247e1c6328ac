//! Transitions and the exit/action/entry traversal.

use super::node::StateIndex;
use super::sink::TransitionSink;
use super::StateGraph;
use crate::core::{invoke, Action, Event, EventArgs, EventContext, Guard, State, StateMachineError};
use std::sync::Arc;

/// Outcome of dispatching one event.
#[derive(Clone, Debug)]
pub struct TransitionResult<S: State> {
    fired: bool,
    new_state: Option<S>,
    action_error: Option<Arc<StateMachineError>>,
}

impl<S: State> TransitionResult<S> {
    /// The result of a dispatch that no transition accepted.
    pub const fn not_fired() -> Self {
        Self {
            fired: false,
            new_state: None,
            action_error: None,
        }
    }

    pub(crate) fn fired(new_state: S, action_error: Option<Arc<StateMachineError>>) -> Self {
        Self {
            fired: true,
            new_state: Some(new_state),
            action_error,
        }
    }

    pub fn has_fired(&self) -> bool {
        self.fired
    }

    /// Leaf state the machine is in after the transition; `None` if nothing
    /// fired.
    pub fn new_state(&self) -> Option<&S> {
        self.new_state.as_ref()
    }

    /// Last error raised by one of the transition's actions.
    pub fn action_error(&self) -> Option<&Arc<StateMachineError>> {
        self.action_error.as_ref()
    }
}

/// A transition registered on its source state under one event.
///
/// `target == None` makes it an internal transition: actions run, nothing
/// is exited or entered.
pub(crate) struct Transition<S: State, E: Event, A: EventArgs> {
    pub(crate) source: StateIndex,
    pub(crate) guard: Option<Guard<S, E, A>>,
    pub(crate) actions: Vec<Action<S, E, A>>,
    pub(crate) target: Option<StateIndex>,
}

impl<S: State, E: Event, A: EventArgs> Clone for Transition<S, E, A> {
    fn clone(&self) -> Self {
        Self {
            source: self.source,
            guard: self.guard.clone(),
            actions: self.actions.clone(),
            target: self.target,
        }
    }
}

impl<S: State, E: Event, A: EventArgs> Transition<S, E, A> {
    /// Evaluate the guard. A failing guard is reported and counts as `false`.
    fn passes(
        &self,
        graph: &StateGraph<S, E, A>,
        context: &EventContext<S, E, A>,
        sink: &dyn TransitionSink<S, E, A>,
    ) -> bool {
        let Some(guard) = &self.guard else {
            return true;
        };
        match guard.check(context) {
            Ok(pass) => pass,
            Err(source) => {
                let error = StateMachineError::Guard {
                    state: graph.id(self.source).name().to_string(),
                    event: format!("{:?}", context.event_id()),
                    source,
                };
                tracing::warn!(error = %error, "guard failed, treating as false");
                sink.report(Some(context), Arc::new(error));
                false
            }
        }
    }

    /// Try to fire from the current leaf `origin`.
    pub(crate) fn fire(
        &self,
        graph: &mut StateGraph<S, E, A>,
        origin: StateIndex,
        context: &EventContext<S, E, A>,
        sink: &dyn TransitionSink<S, E, A>,
    ) -> TransitionResult<S> {
        if !self.passes(graph, context, sink) {
            return TransitionResult::not_fired();
        }

        sink.begin_transition(context);

        let Some(target) = self.target else {
            let action_error = self.perform_actions(graph, context, sink);
            return TransitionResult::fired(graph.id(origin).clone(), action_error);
        };

        // Leave every state between the current leaf and the source.
        let mut state = origin;
        while state != self.source {
            graph.exit(state, Some(context), sink);
            match graph.superstate(state) {
                Some(parent) => state = parent,
                None => break,
            }
        }

        let mut action_error = None;
        self.traverse(graph, self.source, target, context, sink, &mut action_error);
        let leaf = graph.enter_by_history(target, Some(context), sink);

        tracing::debug!(
            from = graph.id(origin).name(),
            to = graph.id(leaf).name(),
            event = ?context.event_id(),
            "transition fired"
        );
        TransitionResult::fired(graph.id(leaf).clone(), action_error)
    }

    /// Exit from `s` and enter `t`, running the actions once at the point
    /// where the last exit has happened and no entry has yet.
    fn traverse(
        &self,
        graph: &mut StateGraph<S, E, A>,
        s: StateIndex,
        t: StateIndex,
        context: &EventContext<S, E, A>,
        sink: &dyn TransitionSink<S, E, A>,
        action_error: &mut Option<Arc<StateMachineError>>,
    ) {
        let ctx = Some(context);
        let s_super = graph.superstate(s);
        let t_super = graph.superstate(t);

        if s == t {
            graph.exit(s, ctx, sink);
            *action_error = self.perform_actions(graph, context, sink);
            graph.entry(t, ctx, sink);
        } else if s_super == Some(t) {
            graph.exit(s, ctx, sink);
            *action_error = self.perform_actions(graph, context, sink);
        } else if t_super == Some(s) {
            *action_error = self.perform_actions(graph, context, sink);
            graph.entry(t, ctx, sink);
        } else if s_super == t_super {
            graph.exit(s, ctx, sink);
            *action_error = self.perform_actions(graph, context, sink);
            graph.entry(t, ctx, sink);
        } else if graph.level(s) > graph.level(t) {
            graph.exit(s, ctx, sink);
            if let Some(parent) = s_super {
                self.traverse(graph, parent, t, context, sink, action_error);
            }
        } else if graph.level(s) < graph.level(t) {
            if let Some(parent) = t_super {
                self.traverse(graph, s, parent, context, sink, action_error);
            }
            graph.entry(t, ctx, sink);
        } else if let (Some(s_parent), Some(t_parent)) = (s_super, t_super) {
            graph.exit(s, ctx, sink);
            self.traverse(graph, s_parent, t_parent, context, sink, action_error);
            graph.entry(t, ctx, sink);
        }
    }

    /// Run every action; a failing action does not stop the rest.
    fn perform_actions(
        &self,
        graph: &StateGraph<S, E, A>,
        context: &EventContext<S, E, A>,
        sink: &dyn TransitionSink<S, E, A>,
    ) -> Option<Arc<StateMachineError>> {
        let mut last_error = None;
        for action in &self.actions {
            if let Err(source) = invoke(|| action(context)) {
                let error = Arc::new(StateMachineError::Action {
                    state: graph.id(self.source).name().to_string(),
                    event: format!("{:?}", context.event_id()),
                    target: self.target.map(|t| graph.id(t).name().to_string()),
                    source,
                });
                tracing::warn!(error = %error, "transition action failed");
                sink.report(Some(context), Arc::clone(&error));
                last_error = Some(error);
            }
        }
        last_error
    }
}
