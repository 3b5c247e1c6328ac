//! State records stored in the graph arena.

use super::transition::Transition;
use crate::core::{Event, EventArgs, HandlerList, HistoryType, State, StateHandler};
use std::collections::HashMap;

/// Position of a state in the graph arena.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub(crate) struct StateIndex(pub(crate) usize);

pub(crate) struct StateNode<S: State, E: Event, A: EventArgs> {
    pub(crate) id: S,
    pub(crate) superstate: Option<StateIndex>,
    pub(crate) substates: Vec<StateIndex>,
    pub(crate) initial: Option<StateIndex>,
    /// Last direct substate exited from.
    pub(crate) history: Option<StateIndex>,
    pub(crate) history_type: HistoryType,
    /// Depth in the hierarchy; roots are level 1.
    pub(crate) level: usize,
    pub(crate) entry: HandlerList<StateHandler<S, E, A>>,
    pub(crate) exit: HandlerList<StateHandler<S, E, A>>,
    pub(crate) transitions: HashMap<E, Vec<Transition<S, E, A>>>,
}

impl<S: State, E: Event, A: EventArgs> StateNode<S, E, A> {
    pub(crate) fn new(id: S) -> Self {
        Self {
            id,
            superstate: None,
            substates: Vec::new(),
            initial: None,
            history: None,
            history_type: HistoryType::None,
            level: 1,
            entry: HandlerList::new(),
            exit: HandlerList::new(),
            transitions: HashMap::new(),
        }
    }
}
