//! Errors reported while validating and applying definitions.

use crate::core::MachineError;
use thiserror::Error;

/// One problem found in a definition. Validation reports all of them.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum DefinitionViolation {
    #[error("State '{state}' is declared more than once")]
    DuplicateState { state: String },

    #[error("State '{state}' is its own superstate")]
    SelfParent { state: String },

    #[error("State '{state}' is part of a superstate cycle")]
    HierarchyCycle { state: String },

    #[error("Superstate '{superstate}' has substates but no initial state")]
    MissingInitialState { superstate: String },

    #[error("Initial state '{initial}' is not a substate of '{superstate}'")]
    ForeignInitialState { superstate: String, initial: String },

    #[error("Transition '{source_state}' on {event} uses unknown guard '{name}'")]
    UnknownGuard {
        source_state: String,
        event: String,
        name: String,
    },

    #[error("Transition '{source_state}' on {event} uses unknown action '{name}'")]
    UnknownAction {
        source_state: String,
        event: String,
        name: String,
    },
}

/// Errors that can occur when building a machine from a definition.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("Definition is invalid ({} violation(s)): {}", .violations.len(), summary(.violations))]
    Invalid { violations: Vec<DefinitionViolation> },

    #[error(transparent)]
    Machine(#[from] MachineError),
}

fn summary(violations: &[DefinitionViolation]) -> String {
    violations
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}
