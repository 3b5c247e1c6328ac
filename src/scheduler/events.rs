//! Completion notifications raised by queues and schedulers.

use crate::core::HandlerError;
use std::sync::Arc;

/// Raised after every callback invocation.
#[derive(Clone, Debug)]
pub struct InvokeCompletedEventArgs {
    /// Queue sequence number or scheduler task id.
    pub id: u64,

    /// Set when the callback failed or panicked.
    pub error: Option<Arc<HandlerError>>,
}

impl InvokeCompletedEventArgs {
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

pub(crate) type InvokeCompletedHandler = Arc<dyn Fn(&InvokeCompletedEventArgs) + Send + Sync>;
