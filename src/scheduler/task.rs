//! Scheduled tasks and their worker threads.

use super::error::SchedulerError;
use super::timed::SchedulerShared;
use crate::core::HandlerResult;
use crossbeam::channel::{self, Receiver, Sender};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Callback invoked by the scheduler.
pub type ScheduledCallback = Arc<dyn Fn() -> HandlerResult + Send + Sync>;

/// Identifier returned by [`Scheduler::add`](super::Scheduler::add).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TaskId(pub(crate) u64);

impl TaskId {
    pub fn value(&self) -> u64 {
        self.0
    }
}

/// How many times a task fires.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum RepeatCount {
    Times(u32),
    Infinite,
}

impl RepeatCount {
    /// Count left after one more firing, or `None` when exhausted.
    pub(crate) fn decrement(self) -> Option<Self> {
        match self {
            Self::Infinite => Some(Self::Infinite),
            Self::Times(n) if n > 1 => Some(Self::Times(n - 1)),
            Self::Times(_) => None,
        }
    }
}

pub(crate) struct Job {
    pub(crate) remaining: RepeatCount,
    pub(crate) period: Duration,
    pub(crate) callback: ScheduledCallback,
    pub(crate) epoch: u64,
}

pub(crate) enum TaskSignal {
    Fire { id: TaskId, job: Job },
    Shutdown,
}

/// A worker thread that runs one task at a time.
///
/// Workers survive their task: once a task has fired for the last time the
/// worker goes back to the scheduler's pool and is reused by the next `add`.
pub(crate) struct TaskWorker {
    signal: Sender<TaskSignal>,
    handle: JoinHandle<()>,
}

impl TaskWorker {
    pub(crate) fn spawn(
        name: String,
        shared: Arc<SchedulerShared>,
    ) -> Result<Self, SchedulerError> {
        let (signal, rx) = channel::unbounded();
        let handle = thread::Builder::new()
            .name(name)
            .spawn(move || run_worker(rx, shared))
            .map_err(|e| SchedulerError::Spawn(e.to_string()))?;
        Ok(Self { signal, handle })
    }

    /// Hand a due task to the worker. Returns `false` if the worker is gone.
    pub(crate) fn fire(&self, id: TaskId, job: Job) -> bool {
        self.signal.send(TaskSignal::Fire { id, job }).is_ok()
    }

    /// Ask the worker to exit and hand back its thread for joining.
    pub(crate) fn retire(self) -> JoinHandle<()> {
        let _ = self.signal.send(TaskSignal::Shutdown);
        self.handle
    }
}

fn run_worker(rx: Receiver<TaskSignal>, shared: Arc<SchedulerShared>) {
    while let Ok(signal) = rx.recv() {
        match signal {
            TaskSignal::Fire { id, job } => {
                let outcome = shared.invoke(&job);
                shared.raise_invoke_completed(id, outcome);
                if !shared.complete(id, job) {
                    break;
                }
            }
            TaskSignal::Shutdown => break,
        }
    }
    tracing::trace!("task worker stopped");
}
