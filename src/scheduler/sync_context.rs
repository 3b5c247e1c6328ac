//! Marshaling callbacks onto an owner thread.

/// A unit of work handed to a synchronization context.
pub type Callback = Box<dyn FnOnce() + Send + 'static>;

/// Runs callbacks on behalf of another component, typically on a thread the
/// host owns.
///
/// `send` must not return before the callback has run; `post` may return
/// immediately.
pub trait SynchronizationContext: Send + Sync {
    /// Run the callback and wait for it to finish.
    fn send(&self, callback: Callback);

    /// Schedule the callback without waiting.
    fn post(&self, callback: Callback);
}

/// Context that runs every callback in place on the calling thread.
#[derive(Clone, Copy, Debug, Default)]
pub struct InlineContext;

impl SynchronizationContext for InlineContext {
    fn send(&self, callback: Callback) {
        callback();
    }

    fn post(&self, callback: Callback) {
        callback();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn inline_context_runs_immediately() {
        let calls = Arc::new(AtomicUsize::new(0));
        let ctx = InlineContext;

        let c = Arc::clone(&calls);
        ctx.send(Box::new(move || {
            c.fetch_add(1, Ordering::SeqCst);
        }));
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let c = Arc::clone(&calls);
        ctx.post(Box::new(move || {
            c.fetch_add(1, Ordering::SeqCst);
        }));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
