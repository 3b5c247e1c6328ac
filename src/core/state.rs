//! State and event identity traits.
//!
//! States and events are plain values (usually enums). The runtime never
//! inspects them beyond equality, hashing and a display name.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use std::hash::Hash;

/// Trait for state identifiers.
///
/// A state value is an opaque key into the machine's state graph. Two equal
/// values always name the same node.
///
/// # Required Traits
///
/// - `Clone` + `Eq` + `Hash`: states are used as map keys
/// - `Debug`: states are debuggable for diagnostics
/// - `Serialize` + `Deserialize`: states are captured in checkpoints
/// - `Send` + `Sync`: active machines dispatch on a worker thread
///
/// # Example
///
/// ```rust
/// use hsm_runtime::core::State;
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Clone, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
/// enum Light {
///     Off,
///     On,
/// }
///
/// impl State for Light {
///     fn name(&self) -> &str {
///         match self {
///             Self::Off => "Off",
///             Self::On => "On",
///         }
///     }
/// }
///
/// assert_eq!(Light::On.name(), "On");
/// ```
pub trait State:
    Clone + Eq + Hash + Debug + Serialize + DeserializeOwned + Send + Sync + 'static
{
    /// Get the state's name for display/logging.
    fn name(&self) -> &str;
}

/// Trait for event identifiers.
///
/// Implemented automatically for every type with the required bounds.
pub trait Event: Clone + Eq + Hash + Debug + Send + Sync + 'static {}

impl<T> Event for T where T: Clone + Eq + Hash + Debug + Send + Sync + 'static {}

/// Trait for the payload carried alongside an event.
///
/// Implemented automatically; `()` is the usual choice when events carry
/// nothing.
pub trait EventArgs: Clone + Debug + Send + Sync + 'static {}

impl<T> EventArgs for T where T: Clone + Debug + Send + Sync + 'static {}

/// Policy for re-entering a superstate.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HistoryType {
    /// Always descend through the initial substate chain.
    #[default]
    None,

    /// Re-enter the last active direct substate, then its initial chain.
    Shallow,

    /// Re-enter the last active substate at every level.
    Deep,
}
