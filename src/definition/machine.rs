//! Fluent machine definitions and their validation.

use super::error::{BuildError, DefinitionViolation};
use super::registry::HandlerRegistry;
use super::rows::{StateRow, TransitionRow};
use crate::core::{Event, EventArgs, State};
use crate::machine::StateMachine;
use std::collections::{HashMap, HashSet};
use stillwater::validation::Validation;
use stillwater::NonEmptyVec;

type Checked = Validation<(), NonEmptyVec<DefinitionViolation>>;

/// State and transition rows for one machine.
///
/// Guards and actions are referenced by name and resolved through a
/// [`HandlerRegistry`] when the definition is applied.
///
/// # Example
///
/// ```rust
/// use hsm_runtime::definition::{HandlerRegistry, MachineDefinition, StateRow, TransitionRow};
/// use hsm_runtime::state_enum;
///
/// state_enum! {
///     pub enum Player { Stopped, Active, Playing, Paused }
/// }
///
/// let definition = MachineDefinition::new()
///     .state(StateRow::new(Player::Active).initial(Player::Playing))
///     .state(StateRow::new(Player::Playing).superstate(Player::Active))
///     .state(StateRow::new(Player::Paused).superstate(Player::Active))
///     .transition(TransitionRow::new(Player::Stopped, "play").target(Player::Active))
///     .transition(TransitionRow::new(Player::Playing, "pause").target(Player::Paused))
///     .transition(
///         TransitionRow::new(Player::Active, "stop")
///             .target(Player::Stopped)
///             .action("log"),
///     );
///
/// let registry: HandlerRegistry<Player, &str, ()> =
///     HandlerRegistry::new().action("log", |_| Ok(()));
///
/// let mut machine = definition.build(&registry).unwrap();
/// machine.initialize(Player::Stopped).unwrap();
/// machine.dispatch("play", None).unwrap();
/// assert_eq!(machine.current_state(), Some(Player::Playing));
/// ```
#[derive(Clone, Debug, PartialEq)]
pub struct MachineDefinition<S: State, E: Event> {
    states: Vec<StateRow<S>>,
    transitions: Vec<TransitionRow<S, E>>,
}

impl<S: State, E: Event> MachineDefinition<S, E> {
    pub fn new() -> Self {
        Self {
            states: Vec::new(),
            transitions: Vec::new(),
        }
    }

    pub fn state(mut self, row: StateRow<S>) -> Self {
        self.states.push(row);
        self
    }

    pub fn states(mut self, rows: impl IntoIterator<Item = StateRow<S>>) -> Self {
        self.states.extend(rows);
        self
    }

    pub fn transition(mut self, row: TransitionRow<S, E>) -> Self {
        self.transitions.push(row);
        self
    }

    pub fn transitions(mut self, rows: impl IntoIterator<Item = TransitionRow<S, E>>) -> Self {
        self.transitions.extend(rows);
        self
    }

    pub fn state_rows(&self) -> &[StateRow<S>] {
        &self.states
    }

    pub fn transition_rows(&self) -> &[TransitionRow<S, E>] {
        &self.transitions
    }

    /// Direct substates of every superstate, in row order.
    fn children(&self) -> HashMap<&S, Vec<&S>> {
        let mut children: HashMap<&S, Vec<&S>> = HashMap::new();
        for row in &self.states {
            if let Some(parent) = &row.superstate {
                children.entry(parent).or_default().push(&row.state);
            }
        }
        children
    }

    /// Check every row, accumulating all violations.
    pub fn validate<A: EventArgs>(&self, registry: &HandlerRegistry<S, E, A>) -> Checked {
        let mut checks: Vec<Checked> = Vec::new();
        checks.extend(self.check_states());
        checks.extend(self.check_transitions(registry));
        Validation::all_vec(checks).map(|_| ())
    }

    fn check_states(&self) -> Vec<Checked> {
        let mut checks = Vec::new();
        let mut seen = HashSet::new();
        let parents: HashMap<&S, &S> = self
            .states
            .iter()
            .filter_map(|row| row.superstate.as_ref().map(|parent| (&row.state, parent)))
            .collect();

        for row in &self.states {
            if !seen.insert(&row.state) {
                checks.push(Validation::fail(DefinitionViolation::DuplicateState {
                    state: row.state.name().to_string(),
                }));
            }
            if row.superstate.as_ref() == Some(&row.state) {
                checks.push(Validation::fail(DefinitionViolation::SelfParent {
                    state: row.state.name().to_string(),
                }));
            } else if in_cycle(&row.state, &parents) {
                checks.push(Validation::fail(DefinitionViolation::HierarchyCycle {
                    state: row.state.name().to_string(),
                }));
            }
        }

        let children = self.children();
        for (parent, kids) in &children {
            let row = self.states.iter().find(|row| &&row.state == parent);
            match row.and_then(|row| row.initial_state.as_ref()) {
                None => checks.push(Validation::fail(DefinitionViolation::MissingInitialState {
                    superstate: parent.name().to_string(),
                })),
                Some(initial) if !kids.contains(&initial) => {
                    checks.push(Validation::fail(DefinitionViolation::ForeignInitialState {
                        superstate: parent.name().to_string(),
                        initial: initial.name().to_string(),
                    }))
                }
                Some(_) => {}
            }
        }

        for row in &self.states {
            if let Some(initial) = &row.initial_state {
                if !children.contains_key(&row.state) {
                    checks.push(Validation::fail(DefinitionViolation::ForeignInitialState {
                        superstate: row.state.name().to_string(),
                        initial: initial.name().to_string(),
                    }));
                }
            }
        }
        checks
    }

    fn check_transitions<A: EventArgs>(&self, registry: &HandlerRegistry<S, E, A>) -> Vec<Checked> {
        let mut checks = Vec::new();
        for row in &self.transitions {
            if let Some(name) = &row.guard {
                if !registry.has_guard(name) {
                    checks.push(Validation::fail(DefinitionViolation::UnknownGuard {
                        source_state: row.source.name().to_string(),
                        event: format!("{:?}", row.event),
                        name: name.clone(),
                    }));
                }
            }
            for name in &row.actions {
                if !registry.has_action(name) {
                    checks.push(Validation::fail(DefinitionViolation::UnknownAction {
                        source_state: row.source.name().to_string(),
                        event: format!("{:?}", row.event),
                        name: name.clone(),
                    }));
                }
            }
        }
        checks
    }

    /// Validate, then add the hierarchy and transitions to `machine`.
    ///
    /// Nothing is applied when validation fails.
    pub fn apply<A: EventArgs>(
        &self,
        registry: &HandlerRegistry<S, E, A>,
        machine: &mut StateMachine<S, E, A>,
    ) -> Result<(), BuildError> {
        if let Validation::Failure(errors) = self.validate(registry) {
            return Err(BuildError::Invalid {
                violations: errors.iter().cloned().collect(),
            });
        }

        let children = self.children();
        for row in &self.states {
            let (Some(kids), Some(initial)) = (children.get(&row.state), &row.initial_state) else {
                continue;
            };
            let rest: Vec<S> = kids
                .iter()
                .filter(|kid| **kid != initial)
                .map(|kid| (*kid).clone())
                .collect();
            machine.setup_substates(row.state.clone(), row.history, initial.clone(), &rest)?;
        }

        for row in &self.transitions {
            let guard = row
                .guard
                .as_deref()
                .and_then(|name| registry.get_guard(name))
                .cloned();
            let actions = row
                .actions
                .iter()
                .filter_map(|name| registry.get_action(name))
                .cloned()
                .collect();
            machine.define_transition(
                row.source.clone(),
                row.event.clone(),
                guard,
                row.target.clone(),
                actions,
            );
        }

        tracing::debug!(
            states = self.states.len(),
            transitions = self.transitions.len(),
            "definition applied"
        );
        Ok(())
    }

    /// Apply the definition to a fresh machine.
    pub fn build<A: EventArgs>(
        &self,
        registry: &HandlerRegistry<S, E, A>,
    ) -> Result<StateMachine<S, E, A>, BuildError> {
        let mut machine = StateMachine::new();
        self.apply(registry, &mut machine)?;
        Ok(machine)
    }
}

impl<S: State, E: Event> Default for MachineDefinition<S, E> {
    fn default() -> Self {
        Self::new()
    }
}

/// True when following superstate links from `state` comes back to it.
fn in_cycle<S: State>(state: &S, parents: &HashMap<&S, &S>) -> bool {
    let mut current = state;
    for _ in 0..parents.len() {
        match parents.get(current) {
            Some(parent) if *parent == state => return true,
            Some(parent) => current = *parent,
            None => return false,
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{HistoryType, MachineError};

    crate::state_enum! {
        enum Media {
            Off,
            On,
            Playing,
            Paused,
            Track1,
            Track2,
        }
    }

    type Registry = HandlerRegistry<Media, &'static str, ()>;

    fn player() -> MachineDefinition<Media, &'static str> {
        MachineDefinition::new()
            .state(
                StateRow::new(Media::On)
                    .initial(Media::Playing)
                    .history(HistoryType::Deep),
            )
            .state(StateRow::new(Media::Playing).superstate(Media::On).initial(Media::Track1))
            .state(StateRow::new(Media::Paused).superstate(Media::On))
            .state(StateRow::new(Media::Track1).superstate(Media::Playing))
            .state(StateRow::new(Media::Track2).superstate(Media::Playing))
            .transition(TransitionRow::new(Media::Off, "power").target(Media::On))
            .transition(TransitionRow::new(Media::On, "power").target(Media::Off))
            .transition(TransitionRow::new(Media::Track1, "next").target(Media::Track2))
            .transition(
                TransitionRow::new(Media::Playing, "pause")
                    .guard("can_pause")
                    .target(Media::Paused)
                    .action("count"),
            )
    }

    fn registry() -> Registry {
        HandlerRegistry::new()
            .guard_fn("can_pause", |_| true)
            .action("count", |_| Ok(()))
    }

    fn violations(result: Checked) -> Vec<DefinitionViolation> {
        match result {
            Validation::Failure(errors) => errors.iter().cloned().collect(),
            Validation::Success(_) => Vec::new(),
        }
    }

    #[test]
    fn valid_definition_passes() {
        assert!(player().validate(&registry()).is_success());
    }

    #[test]
    fn validation_accumulates_every_problem() {
        let definition = player()
            .state(StateRow::new(Media::Paused).superstate(Media::On))
            .state(StateRow::new(Media::Off).superstate(Media::Off))
            .transition(
                TransitionRow::new(Media::Off, "eject")
                    .guard("missing_guard")
                    .action("missing_action"),
            );

        let found = violations(definition.validate(&registry()));

        // Off also becomes a superstate without an initial state.
        assert_eq!(found.len(), 5);
        assert!(found.contains(&DefinitionViolation::MissingInitialState {
            superstate: "Off".to_string()
        }));
        assert!(found.contains(&DefinitionViolation::DuplicateState {
            state: "Paused".to_string()
        }));
        assert!(found.contains(&DefinitionViolation::SelfParent {
            state: "Off".to_string()
        }));
        assert!(found.iter().any(|v| matches!(
            v,
            DefinitionViolation::UnknownGuard { name, .. } if name == "missing_guard"
        )));
        assert!(found.iter().any(|v| matches!(
            v,
            DefinitionViolation::UnknownAction { name, .. } if name == "missing_action"
        )));
    }

    #[test]
    fn superstate_without_initial_is_reported() {
        let definition: MachineDefinition<Media, &str> = MachineDefinition::new()
            .state(StateRow::new(Media::On))
            .state(StateRow::new(Media::Playing).superstate(Media::On));

        let found = violations(definition.validate(&Registry::new()));

        assert_eq!(
            found,
            vec![DefinitionViolation::MissingInitialState {
                superstate: "On".to_string()
            }]
        );
    }

    #[test]
    fn initial_outside_the_substates_is_reported() {
        let definition: MachineDefinition<Media, &str> = MachineDefinition::new()
            .state(StateRow::new(Media::On).initial(Media::Off))
            .state(StateRow::new(Media::Playing).superstate(Media::On))
            .state(StateRow::new(Media::Paused).initial(Media::Track1));

        let found = violations(definition.validate(&Registry::new()));

        assert_eq!(found.len(), 2);
        assert!(found
            .iter()
            .all(|v| matches!(v, DefinitionViolation::ForeignInitialState { .. })));
    }

    #[test]
    fn cycles_are_reported() {
        let definition: MachineDefinition<Media, &str> = MachineDefinition::new()
            .state(StateRow::new(Media::On).superstate(Media::Paused).initial(Media::Paused))
            .state(StateRow::new(Media::Paused).superstate(Media::On).initial(Media::On));

        let found = violations(definition.validate(&Registry::new()));

        assert_eq!(
            found
                .iter()
                .filter(|v| matches!(v, DefinitionViolation::HierarchyCycle { .. }))
                .count(),
            2
        );
    }

    #[test]
    fn applied_definition_drives_the_machine() {
        let mut machine = player().build(&registry()).unwrap();
        machine.initialize(Media::Off).unwrap();

        machine.dispatch("power", None).unwrap();
        assert_eq!(machine.current_state(), Some(Media::Track1));

        machine.dispatch("next", None).unwrap();
        machine.dispatch("power", None).unwrap();
        machine.dispatch("power", None).unwrap();
        assert_eq!(machine.current_state(), Some(Media::Track2));

        machine.dispatch("pause", None).unwrap();
        assert_eq!(machine.current_state(), Some(Media::Paused));
        assert_eq!(machine.graph().level_of(&Media::Track2), Some(3));
    }

    #[test]
    fn invalid_definition_is_not_applied() {
        let definition = player().transition(TransitionRow::new(Media::Off, "x").action("nope"));
        let mut machine = StateMachine::new();

        let err = definition.apply(&registry(), &mut machine).unwrap_err();

        assert!(matches!(err, BuildError::Invalid { ref violations } if violations.len() == 1));
        assert!(err.to_string().contains("nope"));
        assert!(machine.graph().is_empty());
    }

    #[test]
    fn conflicting_existing_hierarchy_surfaces_machine_error() {
        let mut machine: StateMachine<Media, &str, ()> = StateMachine::new();
        machine
            .setup_substates(Media::Off, HistoryType::None, Media::Playing, &[])
            .unwrap();

        let err = player().apply(&registry(), &mut machine).unwrap_err();

        assert!(matches!(
            err,
            BuildError::Machine(MachineError::OwnershipConflict { .. })
        ));
    }
}
