//! Guard predicates for controlling transitions.
//!
//! Guards decide whether a candidate transition fires for the event being
//! dispatched. A guard that fails (returns `Err` or panics) counts as a
//! guard that returned `false`; the failure is reported separately.

use super::context::EventContext;
use super::error::HandlerResult;
use super::handlers::invoke;
use super::state::{Event, EventArgs, State};
use std::sync::Arc;

/// Predicate evaluated against the dispatch context.
///
/// # Example
///
/// ```rust
/// use hsm_runtime::core::{EventContext, Guard, State};
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Clone, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
/// enum Pump {
///     Idle,
/// }
///
/// impl State for Pump {
///     fn name(&self) -> &str {
///         "Idle"
///     }
/// }
///
/// let above_threshold = Guard::when(|ctx: &EventContext<Pump, &str, u32>| {
///     ctx.args().is_some_and(|level| *level > 10)
/// });
///
/// let high = EventContext::new(Pump::Idle, "level", Some(12));
/// let low = EventContext::new(Pump::Idle, "level", Some(3));
///
/// assert!(above_threshold.check(&high).unwrap());
/// assert!(!above_threshold.check(&low).unwrap());
/// ```
pub struct Guard<S: State, E: Event, A: EventArgs> {
    predicate: Arc<dyn Fn(&EventContext<S, E, A>) -> HandlerResult<bool> + Send + Sync>,
}

impl<S: State, E: Event, A: EventArgs> Guard<S, E, A> {
    /// Create a guard from a fallible predicate.
    pub fn new<F>(predicate: F) -> Self
    where
        F: Fn(&EventContext<S, E, A>) -> HandlerResult<bool> + Send + Sync + 'static,
    {
        Guard {
            predicate: Arc::new(predicate),
        }
    }

    /// Create a guard from a predicate that cannot fail.
    pub fn when<F>(predicate: F) -> Self
    where
        F: Fn(&EventContext<S, E, A>) -> bool + Send + Sync + 'static,
    {
        Self::new(move |ctx| Ok(predicate(ctx)))
    }

    /// Evaluate the guard. Panics inside the predicate come back as `Err`.
    pub fn check(&self, context: &EventContext<S, E, A>) -> HandlerResult<bool> {
        invoke(|| (self.predicate)(context))
    }
}

impl<S: State, E: Event, A: EventArgs> Clone for Guard<S, E, A> {
    fn clone(&self) -> Self {
        Self {
            predicate: Arc::clone(&self.predicate),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};

    #[derive(Clone, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
    enum TestState {
        Initial,
        Processing,
    }

    impl State for TestState {
        fn name(&self) -> &str {
            match self {
                Self::Initial => "Initial",
                Self::Processing => "Processing",
            }
        }
    }

    type Ctx = EventContext<TestState, &'static str, i32>;

    #[test]
    fn guard_allows_matching_contexts() {
        let guard = Guard::when(|ctx: &Ctx| matches!(ctx.source_state(), TestState::Initial));

        let initial = EventContext::new(TestState::Initial, "go", None);
        let processing = EventContext::new(TestState::Processing, "go", None);

        assert!(guard.check(&initial).unwrap());
        assert!(!guard.check(&processing).unwrap());
    }

    #[test]
    fn guard_can_inspect_event_args() {
        let guard = Guard::when(|ctx: &Ctx| ctx.args().copied().unwrap_or_default() > 0);

        assert!(guard.check(&EventContext::new(TestState::Initial, "go", Some(1))).unwrap());
        assert!(!guard.check(&EventContext::new(TestState::Initial, "go", Some(-1))).unwrap());
        assert!(!guard.check(&EventContext::new(TestState::Initial, "go", None)).unwrap());
    }

    #[test]
    fn failing_guard_returns_error() {
        let guard: Guard<TestState, &str, i32> = Guard::new(|_| Err("sensor offline".into()));
        let ctx = EventContext::new(TestState::Initial, "go", None);

        assert_eq!(guard.check(&ctx).unwrap_err().to_string(), "sensor offline");
    }

    #[test]
    fn panicking_guard_returns_error() {
        let guard: Guard<TestState, &str, i32> = Guard::when(|_| panic!("bad guard"));
        let ctx = EventContext::new(TestState::Initial, "go", None);

        assert!(guard.check(&ctx).is_err());
    }

    #[test]
    fn guard_is_deterministic() {
        let guard = Guard::when(|ctx: &Ctx| ctx.event_id().len() > 1);
        let ctx = EventContext::new(TestState::Processing, "go", None);

        assert_eq!(guard.check(&ctx).unwrap(), guard.check(&ctx).unwrap());
    }
}
