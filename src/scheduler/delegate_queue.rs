//! Ordered callback queue served by a single worker thread.

use super::error::QueueError;
use super::events::{InvokeCompletedEventArgs, InvokeCompletedHandler};
use super::sync_context::{Callback, SynchronizationContext};
use crate::core::{panic_message, HandlerId, HandlerList};
use crossbeam::channel;
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, OnceLock, Weak};
use std::thread::{self, ThreadId};

type Work = Box<dyn FnOnce() -> Result<(), String> + Send + 'static>;

struct WorkItem {
    sequence: u64,
    work: Work,
}

#[derive(Default)]
struct QueueState {
    items: VecDeque<WorkItem>,
    next_sequence: u64,
    disposed: bool,
}

struct Shared {
    state: Mutex<QueueState>,
    available: Condvar,
    worker_id: OnceLock<ThreadId>,
    invoke_completed: Mutex<HandlerList<InvokeCompletedHandler>>,
}

#[derive(Clone, Copy)]
enum Position {
    Back,
    Front,
}

impl Shared {
    fn enqueue(&self, work: Work, position: Position) -> Result<u64, QueueError> {
        let mut state = self.state.lock();
        if state.disposed {
            return Err(QueueError::Disposed);
        }
        let sequence = state.next_sequence;
        state.next_sequence += 1;
        let item = WorkItem { sequence, work };
        match position {
            Position::Back => state.items.push_back(item),
            Position::Front => state.items.push_front(item),
        }
        self.available.notify_one();
        Ok(sequence)
    }

    fn is_worker_thread(&self) -> bool {
        self.worker_id.get() == Some(&thread::current().id())
    }

    fn next_item(&self) -> Option<WorkItem> {
        let mut state = self.state.lock();
        loop {
            if state.disposed {
                return None;
            }
            if let Some(item) = state.items.pop_front() {
                return Some(item);
            }
            self.available.wait(&mut state);
        }
    }

    fn raise_invoke_completed(&self, sequence: u64, outcome: Result<(), String>) {
        let handlers = self.invoke_completed.lock().snapshot();
        if handlers.is_empty() {
            return;
        }
        let args = InvokeCompletedEventArgs {
            id: sequence,
            error: outcome.err().map(|message| Arc::new(message.into())),
        };
        for handler in handlers {
            if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| handler(&args))) {
                tracing::warn!(
                    sequence,
                    panic = %panic_message(payload.as_ref()),
                    "InvokeCompleted handler panicked"
                );
            }
        }
    }
}

fn catch(callback: impl FnOnce()) -> Result<(), String> {
    panic::catch_unwind(AssertUnwindSafe(callback))
        .map_err(|payload| panic_message(payload.as_ref()))
}

fn run_worker(shared: Arc<Shared>) {
    tracing::trace!("delegate queue worker started");
    while let Some(item) = shared.next_item() {
        tracing::trace!(sequence = item.sequence, "invoking queued callback");
        let outcome = (item.work)();
        if let Err(message) = &outcome {
            tracing::error!(
                sequence = item.sequence,
                panic = %message,
                "queued callback panicked"
            );
        }
        shared.raise_invoke_completed(item.sequence, outcome);
    }
    tracing::trace!("delegate queue worker stopped");
}

/// FIFO queue of callbacks executed in order on one dedicated thread.
///
/// `post` never blocks; `send` blocks until its callback has run and hands
/// back the callback's return value. Priority posts jump to the front of the
/// queue but never interrupt the callback that is already running.
///
/// # Example
///
/// ```rust
/// use hsm_runtime::scheduler::DelegateQueue;
///
/// let queue = DelegateQueue::new("worker").unwrap();
/// queue.post(|| println!("runs on the worker thread")).unwrap();
///
/// let answer = queue.send(|| 6 * 7).unwrap();
/// assert_eq!(answer, 42);
///
/// queue.dispose();
/// ```
pub struct DelegateQueue {
    shared: Arc<Shared>,
}

impl DelegateQueue {
    /// Start a queue whose worker thread carries `name`.
    pub fn new(name: impl Into<String>) -> Result<Self, QueueError> {
        let shared = Arc::new(Shared {
            state: Mutex::new(QueueState::default()),
            available: Condvar::new(),
            worker_id: OnceLock::new(),
            invoke_completed: Mutex::new(HandlerList::new()),
        });

        // The worker is detached: it exits on its own once disposed.
        let worker_shared = Arc::clone(&shared);
        let handle = thread::Builder::new()
            .name(name.into())
            .spawn(move || run_worker(worker_shared))
            .map_err(|e| QueueError::Spawn(e.to_string()))?;
        let _ = shared.worker_id.set(handle.thread().id());

        Ok(Self { shared })
    }

    /// Queue a callback behind everything already queued.
    pub fn post<F>(&self, callback: F) -> Result<(), QueueError>
    where
        F: FnOnce() + Send + 'static,
    {
        self.shared
            .enqueue(Box::new(move || catch(callback)), Position::Back)
            .map(|_| ())
    }

    /// Queue a callback ahead of everything already queued.
    pub fn post_priority<F>(&self, callback: F) -> Result<(), QueueError>
    where
        F: FnOnce() + Send + 'static,
    {
        self.shared
            .enqueue(Box::new(move || catch(callback)), Position::Front)
            .map(|_| ())
    }

    /// Queue a callback and wait for its result.
    ///
    /// Called from the worker thread itself, the callback runs in place.
    pub fn send<R, F>(&self, callback: F) -> Result<R, QueueError>
    where
        R: Send + 'static,
        F: FnOnce() -> R + Send + 'static,
    {
        self.send_at(callback, Position::Back)
    }

    /// Like [`send`](Self::send) but queued ahead of everything else.
    pub fn send_priority<R, F>(&self, callback: F) -> Result<R, QueueError>
    where
        R: Send + 'static,
        F: FnOnce() -> R + Send + 'static,
    {
        self.send_at(callback, Position::Front)
    }

    fn send_at<R, F>(&self, callback: F, position: Position) -> Result<R, QueueError>
    where
        R: Send + 'static,
        F: FnOnce() -> R + Send + 'static,
    {
        if self.shared.is_worker_thread() {
            return panic::catch_unwind(AssertUnwindSafe(callback))
                .map_err(|payload| QueueError::CallbackPanicked(panic_message(payload.as_ref())));
        }

        let (tx, rx) = channel::bounded(1);
        let work: Work = Box::new(move || {
            match panic::catch_unwind(AssertUnwindSafe(callback)) {
                Ok(value) => {
                    let _ = tx.send(Ok(value));
                    Ok(())
                }
                Err(payload) => {
                    let message = panic_message(payload.as_ref());
                    let _ = tx.send(Err(QueueError::CallbackPanicked(message.clone())));
                    Err(message)
                }
            }
        });
        self.shared.enqueue(work, position)?;

        // A disposed queue drops the work item, which drops `tx`.
        rx.recv().map_err(|_| QueueError::Disposed)?
    }

    /// True when called from this queue's worker thread.
    pub fn is_worker_thread(&self) -> bool {
        self.shared.is_worker_thread()
    }

    /// Number of callbacks waiting to run.
    pub fn len(&self) -> usize {
        self.shared.state.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_disposed(&self) -> bool {
        self.shared.state.lock().disposed
    }

    /// Observe every callback completion, including panics.
    pub fn on_invoke_completed<F>(&self, handler: F) -> HandlerId
    where
        F: Fn(&InvokeCompletedEventArgs) + Send + Sync + 'static,
    {
        self.shared.invoke_completed.lock().add(Arc::new(handler))
    }

    pub fn remove_invoke_completed(&self, id: HandlerId) -> bool {
        self.shared.invoke_completed.lock().remove(id)
    }

    /// Weak handle that can post without keeping the queue alive.
    pub fn handle(&self) -> QueueHandle {
        QueueHandle {
            shared: Arc::downgrade(&self.shared),
        }
    }

    /// Stop the worker and drop every queued callback.
    ///
    /// Blocked `send` callers return `QueueError::Disposed`. The worker is
    /// signaled, not joined: a callback already running finishes on its own,
    /// so disposing never waits on it. Safe to call more than once and from
    /// any thread.
    pub fn dispose(&self) {
        let dropped = {
            let mut state = self.shared.state.lock();
            if state.disposed {
                return;
            }
            state.disposed = true;
            self.shared.available.notify_all();
            std::mem::take(&mut state.items)
        };
        tracing::trace!(dropped = dropped.len(), "delegate queue disposed");
        drop(dropped);
    }
}

impl Drop for DelegateQueue {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl SynchronizationContext for DelegateQueue {
    fn send(&self, callback: Callback) {
        if let Err(e) = DelegateQueue::send(self, callback) {
            tracing::warn!(error = %e, "synchronous marshal failed");
        }
    }

    fn post(&self, callback: Callback) {
        if let Err(e) = DelegateQueue::post(self, callback) {
            tracing::warn!(error = %e, "asynchronous marshal failed");
        }
    }
}

/// Non-owning posting handle to a [`DelegateQueue`].
#[derive(Clone)]
pub struct QueueHandle {
    shared: Weak<Shared>,
}

impl QueueHandle {
    /// True once the queue has been disposed or dropped.
    pub fn is_disposed(&self) -> bool {
        self.shared
            .upgrade()
            .map_or(true, |shared| shared.state.lock().disposed)
    }

    pub fn post<F>(&self, callback: F) -> Result<(), QueueError>
    where
        F: FnOnce() + Send + 'static,
    {
        let shared = self.shared.upgrade().ok_or(QueueError::Disposed)?;
        shared
            .enqueue(Box::new(move || catch(callback)), Position::Back)
            .map(|_| ())
    }

    pub fn post_priority<F>(&self, callback: F) -> Result<(), QueueError>
    where
        F: FnOnce() + Send + 'static,
    {
        let shared = self.shared.upgrade().ok_or(QueueError::Disposed)?;
        shared
            .enqueue(Box::new(move || catch(callback)), Position::Front)
            .map(|_| ())
    }
}
