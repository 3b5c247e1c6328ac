//! The state hierarchy and its dispatch algorithm.
//!
//! States live in an arena and refer to each other by index, so the
//! superstate/substate/history links never form ownership cycles. The graph
//! has no threading of its own; whoever dispatches owns it.

mod node;
mod sink;
mod transition;

pub use sink::TransitionSink;
pub use transition::TransitionResult;

pub(crate) use node::StateIndex;

use crate::core::{
    invoke, Action, Event, EventArgs, EventContext, Guard, HandlerId, HistoryType, MachineError,
    State, StateHandler, StateMachineError,
};
use node::StateNode;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use transition::Transition;

/// Arena of states and the transitions registered on them.
pub struct StateGraph<S: State, E: Event, A: EventArgs> {
    nodes: Vec<StateNode<S, E, A>>,
    index: HashMap<S, StateIndex>,
}

impl<S: State, E: Event, A: EventArgs> StateGraph<S, E, A> {
    pub fn new() -> Self {
        Self {
            nodes: Vec::new(),
            index: HashMap::new(),
        }
    }

    /// Look up a state, creating it on first reference.
    pub(crate) fn ensure(&mut self, id: S) -> StateIndex {
        if let Some(idx) = self.index.get(&id) {
            return *idx;
        }
        let idx = StateIndex(self.nodes.len());
        self.nodes.push(StateNode::new(id.clone()));
        self.index.insert(id, idx);
        idx
    }

    pub(crate) fn index_of(&self, id: &S) -> Option<StateIndex> {
        self.index.get(id).copied()
    }

    pub(crate) fn id(&self, idx: StateIndex) -> &S {
        &self.nodes[idx.0].id
    }

    pub(crate) fn superstate(&self, idx: StateIndex) -> Option<StateIndex> {
        self.nodes[idx.0].superstate
    }

    pub(crate) fn level(&self, idx: StateIndex) -> usize {
        self.nodes[idx.0].level
    }

    pub fn contains(&self, id: &S) -> bool {
        self.index.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Every known state, in creation order.
    pub fn states(&self) -> impl Iterator<Item = &S> {
        self.nodes.iter().map(|node| &node.id)
    }

    /// Register a transition on `source`. Transitions for the same event are
    /// tried in registration order.
    pub fn add_transition(
        &mut self,
        source: S,
        event: E,
        guard: Option<Guard<S, E, A>>,
        target: Option<S>,
        actions: Vec<Action<S, E, A>>,
    ) {
        let source = self.ensure(source);
        let target = target.map(|t| self.ensure(t));
        self.nodes[source.0]
            .transitions
            .entry(event)
            .or_default()
            .push(Transition {
                source,
                guard,
                actions,
                target,
            });
    }

    /// Make `initial` and `rest` the substates of `superstate`.
    ///
    /// Previous substates are detached. Nothing changes when the request is
    /// rejected.
    pub fn setup_substates(
        &mut self,
        superstate: S,
        history: HistoryType,
        initial: S,
        rest: &[S],
    ) -> Result<(), MachineError> {
        let children: Vec<&S> = std::iter::once(&initial).chain(rest.iter()).collect();
        self.check_substates(&superstate, &children)?;

        let parent = self.ensure(superstate);
        let previous = std::mem::take(&mut self.nodes[parent.0].substates);
        for child in previous {
            self.nodes[child.0].superstate = None;
            self.update_levels(child);
        }

        let mut attached = Vec::with_capacity(children.len());
        for child in children {
            let idx = self.ensure(child.clone());
            self.nodes[idx.0].superstate = Some(parent);
            self.update_levels(idx);
            attached.push(idx);
        }

        let node = &mut self.nodes[parent.0];
        node.initial = attached.first().copied();
        node.substates = attached;
        node.history = None;
        node.history_type = history;
        Ok(())
    }

    fn check_substates(&self, superstate: &S, children: &[&S]) -> Result<(), MachineError> {
        let mut seen = HashSet::new();
        for child in children {
            if !seen.insert(*child) {
                return Err(MachineError::InvalidHierarchy {
                    reason: format!("state '{}' is listed more than once", child.name()),
                });
            }
            if *child == superstate {
                return Err(MachineError::InvalidHierarchy {
                    reason: format!("state '{}' cannot be its own substate", child.name()),
                });
            }
            if self.is_ancestor(child, superstate) {
                return Err(MachineError::InvalidHierarchy {
                    reason: format!(
                        "state '{}' is an ancestor of '{}'",
                        child.name(),
                        superstate.name()
                    ),
                });
            }
            if let Some(owner) = self
                .index_of(child)
                .and_then(|idx| self.superstate(idx))
                .map(|owner| self.id(owner))
            {
                if owner != superstate {
                    return Err(MachineError::OwnershipConflict {
                        state: child.name().to_string(),
                        owner: owner.name().to_string(),
                    });
                }
            }
        }
        Ok(())
    }

    /// True when `candidate` sits above `state` in the hierarchy.
    fn is_ancestor(&self, candidate: &S, state: &S) -> bool {
        let Some(mut current) = self.index_of(state) else {
            return false;
        };
        while let Some(parent) = self.superstate(current) {
            if self.id(parent) == candidate {
                return true;
            }
            current = parent;
        }
        false
    }

    /// Recompute `level` for `idx` and everything below it.
    fn update_levels(&mut self, idx: StateIndex) {
        let mut stack = vec![idx];
        while let Some(current) = stack.pop() {
            let level = match self.nodes[current.0].superstate {
                Some(parent) => self.nodes[parent.0].level + 1,
                None => 1,
            };
            self.nodes[current.0].level = level;
            stack.extend(self.nodes[current.0].substates.iter().copied());
        }
    }

    pub fn add_entry_handler(&mut self, state: S, handler: StateHandler<S, E, A>) -> HandlerId {
        let idx = self.ensure(state);
        self.nodes[idx.0].entry.add(handler)
    }

    pub fn remove_entry_handler(&mut self, state: &S, id: HandlerId) -> bool {
        match self.index_of(state) {
            Some(idx) => self.nodes[idx.0].entry.remove(id),
            None => false,
        }
    }

    pub fn add_exit_handler(&mut self, state: S, handler: StateHandler<S, E, A>) -> HandlerId {
        let idx = self.ensure(state);
        self.nodes[idx.0].exit.add(handler)
    }

    pub fn remove_exit_handler(&mut self, state: &S, id: HandlerId) -> bool {
        match self.index_of(state) {
            Some(idx) => self.nodes[idx.0].exit.remove(id),
            None => false,
        }
    }

    pub fn superstate_of(&self, state: &S) -> Option<&S> {
        let idx = self.index_of(state)?;
        self.superstate(idx).map(|parent| self.id(parent))
    }

    pub fn substates_of(&self, state: &S) -> Vec<&S> {
        self.index_of(state)
            .map(|idx| {
                self.nodes[idx.0]
                    .substates
                    .iter()
                    .map(|child| self.id(*child))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn initial_state_of(&self, state: &S) -> Option<&S> {
        let idx = self.index_of(state)?;
        self.nodes[idx.0].initial.map(|child| self.id(child))
    }

    pub fn history_state_of(&self, state: &S) -> Option<&S> {
        let idx = self.index_of(state)?;
        self.nodes[idx.0].history.map(|child| self.id(child))
    }

    pub fn history_type_of(&self, state: &S) -> Option<HistoryType> {
        self.index_of(state).map(|idx| self.nodes[idx.0].history_type)
    }

    pub fn level_of(&self, state: &S) -> Option<usize> {
        self.index_of(state).map(|idx| self.level(idx))
    }

    /// `(superstate, remembered substate)` for every superstate with history.
    pub fn history_entries(&self) -> Vec<(S, S)> {
        self.nodes
            .iter()
            .filter_map(|node| {
                node.history
                    .map(|child| (node.id.clone(), self.id(child).clone()))
            })
            .collect()
    }

    /// Forget every remembered substate.
    pub(crate) fn clear_history(&mut self) {
        for node in &mut self.nodes {
            node.history = None;
        }
    }

    /// Overwrite a superstate's remembered substate.
    pub fn set_history(&mut self, superstate: &S, substate: &S) -> Result<(), MachineError> {
        let parent = self.index_of(superstate).ok_or_else(|| MachineError::UnknownState {
            state: superstate.name().to_string(),
        })?;
        let child = self.index_of(substate).ok_or_else(|| MachineError::UnknownState {
            state: substate.name().to_string(),
        })?;
        if self.superstate(child) != Some(parent) {
            return Err(MachineError::InvalidHierarchy {
                reason: format!(
                    "state '{}' is not a substate of '{}'",
                    substate.name(),
                    superstate.name()
                ),
            });
        }
        self.nodes[parent.0].history = Some(child);
        Ok(())
    }

    /// Dispatch from the current leaf, bubbling up through superstates until
    /// a transition fires.
    pub(crate) fn dispatch(
        &mut self,
        origin: StateIndex,
        context: &EventContext<S, E, A>,
        sink: &dyn TransitionSink<S, E, A>,
    ) -> TransitionResult<S> {
        let mut current = Some(origin);
        while let Some(state) = current {
            let candidates = self.nodes[state.0]
                .transitions
                .get(context.event_id())
                .cloned()
                .unwrap_or_default();
            for transition in candidates {
                let result = transition.fire(self, origin, context, sink);
                if result.has_fired() {
                    return result;
                }
            }
            current = self.superstate(state);
        }
        TransitionResult::not_fired()
    }

    /// Enter every state from the root down to `idx`, then descend by
    /// history. Returns the leaf.
    pub(crate) fn enter_from_root(
        &mut self,
        idx: StateIndex,
        sink: &dyn TransitionSink<S, E, A>,
    ) -> StateIndex {
        let mut path = vec![idx];
        let mut current = idx;
        while let Some(parent) = self.superstate(current) {
            path.push(parent);
            current = parent;
        }
        for state in path.into_iter().rev() {
            self.entry(state, None, sink);
        }
        self.enter_by_history(idx, None, sink)
    }

    /// Descend from an already-entered state to the leaf its history policy
    /// selects.
    pub(crate) fn enter_by_history(
        &mut self,
        idx: StateIndex,
        context: Option<&EventContext<S, E, A>>,
        sink: &dyn TransitionSink<S, E, A>,
    ) -> StateIndex {
        let node = &self.nodes[idx.0];
        match (node.history_type, node.history) {
            (HistoryType::Shallow, Some(remembered)) => {
                self.entry(remembered, context, sink);
                self.enter_initial_chain(remembered, context, sink)
            }
            (HistoryType::Deep, Some(remembered)) => {
                self.entry(remembered, context, sink);
                self.enter_deep(remembered, context, sink)
            }
            _ => self.enter_initial_chain(idx, context, sink),
        }
    }

    fn enter_initial_chain(
        &mut self,
        idx: StateIndex,
        context: Option<&EventContext<S, E, A>>,
        sink: &dyn TransitionSink<S, E, A>,
    ) -> StateIndex {
        let mut current = idx;
        while let Some(initial) = self.nodes[current.0].initial {
            self.entry(initial, context, sink);
            current = initial;
        }
        current
    }

    fn enter_deep(
        &mut self,
        idx: StateIndex,
        context: Option<&EventContext<S, E, A>>,
        sink: &dyn TransitionSink<S, E, A>,
    ) -> StateIndex {
        let mut current = idx;
        while let Some(remembered) = self.nodes[current.0].history {
            self.entry(remembered, context, sink);
            current = remembered;
        }
        self.enter_initial_chain(current, context, sink)
    }

    pub(crate) fn entry(
        &mut self,
        idx: StateIndex,
        context: Option<&EventContext<S, E, A>>,
        sink: &dyn TransitionSink<S, E, A>,
    ) {
        tracing::trace!(state = self.id(idx).name(), "entering state");
        for handler in self.nodes[idx.0].entry.snapshot() {
            if let Err(source) = invoke(|| handler(context)) {
                let error = StateMachineError::Entry {
                    state: self.id(idx).name().to_string(),
                    event: context.map(|ctx| format!("{:?}", ctx.event_id())),
                    source,
                };
                tracing::warn!(error = %error, "entry handler failed");
                sink.report(context, Arc::new(error));
            }
        }
    }

    /// Run exit handlers and record this state as its superstate's history.
    pub(crate) fn exit(
        &mut self,
        idx: StateIndex,
        context: Option<&EventContext<S, E, A>>,
        sink: &dyn TransitionSink<S, E, A>,
    ) {
        tracing::trace!(state = self.id(idx).name(), "exiting state");
        for handler in self.nodes[idx.0].exit.snapshot() {
            if let Err(source) = invoke(|| handler(context)) {
                let error = StateMachineError::Exit {
                    state: self.id(idx).name().to_string(),
                    event: context.map(|ctx| format!("{:?}", ctx.event_id())),
                    source,
                };
                tracing::warn!(error = %error, "exit handler failed");
                sink.report(context, Arc::new(error));
            }
        }
        if let Some(parent) = self.superstate(idx) {
            self.nodes[parent.0].history = Some(idx);
        }
    }
}

impl<S: State, E: Event, A: EventArgs> Default for StateGraph<S, E, A> {
    fn default() -> Self {
        Self::new()
    }
}
