//! Checkpoint and resume functionality for state machines.
//!
//! A checkpoint captures the *runtime* state of a machine: its current leaf
//! and the remembered substate of every superstate. The graph itself (states,
//! transitions, handlers) is code and is never serialized; restore a
//! checkpoint into a machine built from the same definition.

use crate::core::{Event, EventArgs, MachineError, State};
use crate::machine::StateMachine;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub mod error;

pub use error::CheckpointError;

/// Version identifier for checkpoint format
pub const CHECKPOINT_VERSION: u32 = 1;

/// Remembered substate of one superstate.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(bound = "")]
pub struct HistoryEntry<S: State> {
    pub superstate: S,
    pub substate: S,
}

/// Serializable checkpoint of a machine's runtime state.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(bound = "")]
pub struct Snapshot<S: State> {
    /// Checkpoint format version
    pub version: u32,

    /// Unique checkpoint identifier
    pub id: String,

    /// When checkpoint was created
    pub timestamp: DateTime<Utc>,

    /// Current leaf state of the machine
    pub current_state: S,

    /// History pointers, one per superstate that has been exited
    pub history: Vec<HistoryEntry<S>>,
}

impl<S: State> Snapshot<S> {
    pub fn new(current_state: S, history: Vec<HistoryEntry<S>>) -> Self {
        Self {
            version: CHECKPOINT_VERSION,
            id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            current_state,
            history,
        }
    }

    pub fn to_json(&self) -> Result<String, CheckpointError> {
        serde_json::to_string_pretty(self)
            .map_err(|e| CheckpointError::SerializationFailed(e.to_string()))
    }

    pub fn from_json(json: &str) -> Result<Self, CheckpointError> {
        let snapshot: Self = serde_json::from_str(json)
            .map_err(|e| CheckpointError::DeserializationFailed(e.to_string()))?;
        snapshot.check_version()?;
        Ok(snapshot)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, CheckpointError> {
        bincode::serialize(self).map_err(|e| CheckpointError::SerializationFailed(e.to_string()))
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CheckpointError> {
        let snapshot: Self = bincode::deserialize(bytes)
            .map_err(|e| CheckpointError::DeserializationFailed(e.to_string()))?;
        snapshot.check_version()?;
        Ok(snapshot)
    }

    fn check_version(&self) -> Result<(), CheckpointError> {
        if self.version != CHECKPOINT_VERSION {
            return Err(CheckpointError::UnsupportedVersion {
                found: self.version,
                supported: CHECKPOINT_VERSION,
            });
        }
        Ok(())
    }
}

impl<S: State, E: Event, A: EventArgs> StateMachine<S, E, A> {
    /// Capture the current state and every history pointer.
    pub fn snapshot(&self) -> Result<Snapshot<S>, CheckpointError> {
        let current = self.current_state().ok_or(MachineError::NotInitialized)?;
        let history = self
            .graph
            .history_entries()
            .into_iter()
            .map(|(superstate, substate)| HistoryEntry {
                superstate,
                substate,
            })
            .collect();
        Ok(Snapshot::new(current, history))
    }

    /// Put the machine back into a captured state.
    ///
    /// No entry or exit handlers run. The whole snapshot is checked against
    /// the graph before anything changes; history the snapshot does not hold
    /// is forgotten.
    pub fn restore(&mut self, snapshot: &Snapshot<S>) -> Result<(), CheckpointError> {
        snapshot.check_version()?;
        if !self.graph.contains(&snapshot.current_state) {
            return Err(CheckpointError::ValidationFailed(format!(
                "current state '{}' is not part of the machine",
                snapshot.current_state.name()
            )));
        }
        for entry in &snapshot.history {
            if self.graph.superstate_of(&entry.substate) != Some(&entry.superstate) {
                return Err(CheckpointError::ValidationFailed(format!(
                    "'{}' is not a substate of '{}'",
                    entry.substate.name(),
                    entry.superstate.name()
                )));
            }
        }

        self.graph.clear_history();
        for entry in &snapshot.history {
            self.graph.set_history(&entry.superstate, &entry.substate)?;
        }
        self.resume_at(snapshot.current_state.clone());
        tracing::debug!(
            id = %snapshot.id,
            state = snapshot.current_state.name(),
            "checkpoint restored"
        );
        Ok(())
    }
}
