//! Where a machine keeps its current state.

use crate::core::State;
use parking_lot::RwLock;

/// Holds the current leaf state.
///
/// Read from any thread, written only by the thread that dispatches.
pub trait StateStorage<S: State>: Send + Sync {
    fn get(&self) -> Option<S>;
    fn set(&self, state: S);
}

/// Storage owned by the machine.
#[derive(Debug)]
pub struct InternalStorage<S: State> {
    cell: RwLock<Option<S>>,
}

impl<S: State> InternalStorage<S> {
    pub fn new() -> Self {
        Self {
            cell: RwLock::new(None),
        }
    }
}

impl<S: State> Default for InternalStorage<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: State> StateStorage<S> for InternalStorage<S> {
    fn get(&self) -> Option<S> {
        self.cell.read().clone()
    }

    fn set(&self, state: S) {
        *self.cell.write() = Some(state);
    }
}

/// Storage delegated to the host, e.g. a field on one of its own objects.
///
/// # Example
///
/// ```rust
/// use hsm_runtime::machine::{ExternalStorage, StateStorage};
/// use hsm_runtime::state_enum;
/// use parking_lot::Mutex;
/// use std::sync::Arc;
///
/// state_enum! {
///     pub enum Lamp { Off, On }
/// }
///
/// let field = Arc::new(Mutex::new(None));
/// let (read, write) = (Arc::clone(&field), Arc::clone(&field));
/// let storage = ExternalStorage::new(move || *read.lock(), move |s| *write.lock() = Some(s));
///
/// storage.set(Lamp::On);
/// assert_eq!(*field.lock(), Some(Lamp::On));
/// ```
pub struct ExternalStorage<S: State> {
    get: Box<dyn Fn() -> Option<S> + Send + Sync>,
    set: Box<dyn Fn(S) + Send + Sync>,
}

impl<S: State> ExternalStorage<S> {
    pub fn new<G, W>(get: G, set: W) -> Self
    where
        G: Fn() -> Option<S> + Send + Sync + 'static,
        W: Fn(S) + Send + Sync + 'static,
    {
        Self {
            get: Box::new(get),
            set: Box::new(set),
        }
    }
}

impl<S: State> StateStorage<S> for ExternalStorage<S> {
    fn get(&self) -> Option<S> {
        (self.get)()
    }

    fn set(&self, state: S) {
        (self.set)(state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};
    use std::sync::Arc;

    #[derive(Clone, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
    enum Gate {
        Open,
        Closed,
    }

    impl State for Gate {
        fn name(&self) -> &str {
            match self {
                Self::Open => "Open",
                Self::Closed => "Closed",
            }
        }
    }

    #[test]
    fn internal_storage_starts_empty() {
        let storage = InternalStorage::new();
        assert_eq!(storage.get(), None);

        storage.set(Gate::Open);
        storage.set(Gate::Closed);
        assert_eq!(storage.get(), Some(Gate::Closed));
    }

    #[test]
    fn external_storage_calls_the_host() {
        let cell = Arc::new(RwLock::new(Some(Gate::Open)));
        let (read, write) = (Arc::clone(&cell), Arc::clone(&cell));
        let storage = ExternalStorage::new(
            move || read.read().clone(),
            move |state| *write.write() = Some(state),
        );

        assert_eq!(storage.get(), Some(Gate::Open));
        storage.set(Gate::Closed);
        assert_eq!(*cell.read(), Some(Gate::Closed));
    }
}
