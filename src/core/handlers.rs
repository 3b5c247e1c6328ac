//! Ordered callback lists with add/remove by token.

use super::context::EventContext;
use super::error::{HandlerPanic, HandlerResult};
use super::state::{Event, EventArgs, State};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

static NEXT_HANDLER_ID: AtomicU64 = AtomicU64::new(1);

/// Token returned when a handler is registered; pass it back to remove it.
///
/// Ids are unique across every list in the process.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct HandlerId(u64);

impl HandlerId {
    fn next() -> Self {
        Self(NEXT_HANDLER_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// Entry or exit handler. The context is `None` while the machine is being
/// initialized.
pub type StateHandler<S, E, A> =
    Arc<dyn Fn(Option<&EventContext<S, E, A>>) -> HandlerResult + Send + Sync>;

/// Transition action.
pub type Action<S, E, A> = Arc<dyn Fn(&EventContext<S, E, A>) -> HandlerResult + Send + Sync>;

/// Handlers run in registration order.
pub struct HandlerList<F> {
    entries: Vec<(HandlerId, F)>,
}

impl<F> HandlerList<F> {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    pub fn add(&mut self, handler: F) -> HandlerId {
        let id = HandlerId::next();
        self.entries.push((id, handler));
        id
    }

    /// Returns `false` when the id is not registered here.
    pub fn remove(&mut self, id: HandlerId) -> bool {
        let before = self.entries.len();
        self.entries.retain(|(entry_id, _)| *entry_id != id);
        self.entries.len() != before
    }

    pub fn iter(&self) -> impl Iterator<Item = &F> {
        self.entries.iter().map(|(_, handler)| handler)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<F: Clone> HandlerList<F> {
    /// Copy of the current handlers, for invoking outside a lock or on
    /// another thread.
    pub fn snapshot(&self) -> Vec<F> {
        self.iter().cloned().collect()
    }
}

impl<F> Default for HandlerList<F> {
    fn default() -> Self {
        Self::new()
    }
}

/// Run a user callback, turning a panic into a `HandlerPanic` error.
pub(crate) fn invoke<T>(callback: impl FnOnce() -> HandlerResult<T>) -> HandlerResult<T> {
    match panic::catch_unwind(AssertUnwindSafe(callback)) {
        Ok(result) => result,
        Err(payload) => Err(Box::new(HandlerPanic(panic_message(payload.as_ref())))),
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// Wrap an infallible entry/exit closure.
pub fn state_handler<S, E, A, F>(handler: F) -> StateHandler<S, E, A>
where
    S: State,
    E: Event,
    A: EventArgs,
    F: Fn(Option<&EventContext<S, E, A>>) -> HandlerResult + Send + Sync + 'static,
{
    Arc::new(handler)
}

/// Wrap an action closure.
pub fn action<S, E, A, F>(handler: F) -> Action<S, E, A>
where
    S: State,
    E: Event,
    A: EventArgs,
    F: Fn(&EventContext<S, E, A>) -> HandlerResult + Send + Sync + 'static,
{
    Arc::new(handler)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handlers_keep_registration_order() {
        let mut list = HandlerList::new();
        list.add("first");
        list.add("second");
        list.add("third");

        let order: Vec<_> = list.iter().copied().collect();
        assert_eq!(order, vec!["first", "second", "third"]);
    }

    #[test]
    fn remove_by_id_only_removes_that_handler() {
        let mut list = HandlerList::new();
        let a = list.add(1);
        let _b = list.add(2);

        assert!(list.remove(a));
        assert!(!list.remove(a));
        assert_eq!(list.snapshot(), vec![2]);
    }

    #[test]
    fn ids_are_unique_across_lists() {
        let mut first = HandlerList::new();
        let mut second = HandlerList::new();
        let a = first.add(());
        let b = second.add(());

        assert_ne!(a, b);
        assert!(!second.remove(a));
    }

    #[test]
    fn invoke_converts_panics() {
        let result: HandlerResult<()> = invoke(|| panic!("exploded"));
        let err = result.unwrap_err();
        assert_eq!(err.to_string(), "Handler panicked: exploded");
    }

    #[test]
    fn invoke_passes_through_results() {
        assert_eq!(invoke(|| Ok(5)).unwrap(), 5);
        assert!(invoke::<()>(|| Err("nope".into())).is_err());
    }
}
