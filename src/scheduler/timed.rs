//! Timed, repeating task scheduler.

use super::error::SchedulerError;
use super::events::{InvokeCompletedEventArgs, InvokeCompletedHandler};
use super::sync_context::SynchronizationContext;
use super::task::{Job, RepeatCount, ScheduledCallback, TaskId, TaskWorker};
use crate::config::SchedulerConfig;
use crate::core::{invoke, panic_message, HandlerId, HandlerList, HandlerResult};
use crossbeam::channel;
use parking_lot::{Condvar, Mutex};
use std::cmp::{Ordering, Reverse};
use std::collections::{BinaryHeap, HashMap, HashSet};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

struct Scheduled {
    due: Instant,
    order: u64,
    id: TaskId,
    job: Job,
    worker: TaskWorker,
}

impl PartialEq for Scheduled {
    fn eq(&self, other: &Self) -> bool {
        self.due == other.due && self.order == other.order
    }
}

impl Eq for Scheduled {}

impl PartialOrd for Scheduled {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Scheduled {
    fn cmp(&self, other: &Self) -> Ordering {
        self.due
            .cmp(&other.due)
            .then_with(|| self.order.cmp(&other.order))
    }
}

#[derive(Default)]
struct Inner {
    /// Live tasks ordered by due time (earliest first via `Reverse`).
    queue: BinaryHeap<Reverse<Scheduled>>,
    /// Idle workers whose task has run out.
    pool: Vec<TaskWorker>,
    /// Workers currently running a callback.
    in_flight: HashMap<TaskId, TaskWorker>,
    cancelled: HashSet<TaskId>,
    running: bool,
    disposed: bool,
    /// Bumped by `clear`; tasks from an older epoch are retired on return.
    epoch: u64,
    next_id: u64,
    next_order: u64,
    next_worker: u64,
}

impl Inner {
    fn push(&mut self, id: TaskId, job: Job, worker: TaskWorker, due: Instant) {
        let order = self.next_order;
        self.next_order += 1;
        self.queue.push(Reverse(Scheduled {
            due,
            order,
            id,
            job,
            worker,
        }));
    }

    /// Pop every task due at or before `now`.
    fn pop_due(&mut self, now: Instant) -> Vec<Scheduled> {
        let mut ready = Vec::new();
        while let Some(Reverse(head)) = self.queue.peek() {
            if head.due > now {
                break;
            }
            if let Some(Reverse(task)) = self.queue.pop() {
                ready.push(task);
            }
        }
        ready
    }

    /// Take every idle worker (pooled or queued) out of the scheduler.
    fn drain_idle(&mut self) -> Vec<TaskWorker> {
        let mut workers: Vec<TaskWorker> = self.pool.drain(..).collect();
        workers.extend(self.queue.drain().map(|Reverse(task)| task.worker));
        workers
    }
}

pub(crate) struct SchedulerShared {
    inner: Mutex<Inner>,
    wake: Condvar,
    config: SchedulerConfig,
    sync: Option<Arc<dyn SynchronizationContext>>,
    invoke_completed: Mutex<HandlerList<InvokeCompletedHandler>>,
}

impl SchedulerShared {
    /// Run the task's callback, marshaled when a context was supplied.
    pub(crate) fn invoke(&self, job: &Job) -> HandlerResult {
        let Some(sync) = &self.sync else {
            return invoke(|| (job.callback)());
        };

        let (tx, rx) = channel::bounded(1);
        let callback = Arc::clone(&job.callback);
        sync.send(Box::new(move || {
            let _ = tx.send(invoke(|| callback()));
        }));
        rx.recv()
            .unwrap_or_else(|_| Err("synchronization context dropped the callback".into()))
    }

    pub(crate) fn raise_invoke_completed(&self, id: TaskId, outcome: HandlerResult) {
        if let Err(e) = &outcome {
            tracing::warn!(task = id.value(), error = %e, "scheduled callback failed");
        }
        let handlers = self.invoke_completed.lock().snapshot();
        if handlers.is_empty() {
            return;
        }
        let args = InvokeCompletedEventArgs {
            id: id.value(),
            error: outcome.err().map(Arc::new),
        };
        for handler in handlers {
            if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| handler(&args))) {
                tracing::warn!(
                    task = id.value(),
                    panic = %panic_message(payload.as_ref()),
                    "InvokeCompleted handler panicked"
                );
            }
        }
    }

    /// Called by a worker after its callback ran. Returns `false` when the
    /// worker has been retired and should exit.
    pub(crate) fn complete(&self, id: TaskId, job: Job) -> bool {
        let mut inner = self.inner.lock();
        let Some(worker) = inner.in_flight.remove(&id) else {
            return false;
        };
        if inner.disposed || job.epoch != inner.epoch {
            inner.cancelled.remove(&id);
            return false;
        }

        let cancelled = inner.cancelled.remove(&id);
        match job.remaining.decrement() {
            Some(remaining) if !cancelled => {
                let due = Instant::now() + job.period;
                let job = Job { remaining, ..job };
                inner.push(id, job, worker, due);
                self.wake.notify_all();
            }
            _ => {
                tracing::trace!(task = id.value(), "task finished, worker returned to pool");
                inner.pool.push(worker);
            }
        }
        true
    }
}

fn run_timer(shared: Arc<SchedulerShared>) {
    let poll_interval = shared.config.poll_interval;
    let mut inner = shared.inner.lock();
    loop {
        if inner.disposed {
            break;
        }
        if !inner.running {
            shared.wake.wait(&mut inner);
            continue;
        }

        for task in inner.pop_due(Instant::now()) {
            let Scheduled { id, job, worker, .. } = task;
            tracing::trace!(task = id.value(), "task due");
            if worker.fire(id, job) {
                inner.in_flight.insert(id, worker);
            } else {
                tracing::error!(task = id.value(), "task worker is gone, dropping task");
            }
        }

        shared.wake.wait_for(&mut inner, poll_interval);
    }
    tracing::trace!("scheduler timer stopped");
}

fn join_all(handles: Vec<JoinHandle<()>>) {
    let current = thread::current().id();
    for handle in handles {
        if handle.thread().id() != current {
            let _ = handle.join();
        }
    }
}

/// Schedules callbacks to run after a delay, optionally repeating.
///
/// A polling timer thread watches a min-heap of due times. Each due task is
/// handed to its own worker thread, which runs the callback, raises
/// `InvokeCompleted`, and then either re-schedules the task one period
/// later or parks itself in a pool for reuse.
///
/// # Example
///
/// ```rust
/// use hsm_runtime::config::SchedulerConfig;
/// use hsm_runtime::scheduler::{RepeatCount, Scheduler};
/// use std::sync::atomic::{AtomicUsize, Ordering};
/// use std::sync::Arc;
/// use std::time::Duration;
///
/// let scheduler = Scheduler::new(SchedulerConfig::default()).unwrap();
/// let ticks = Arc::new(AtomicUsize::new(0));
///
/// let counter = Arc::clone(&ticks);
/// scheduler
///     .add(RepeatCount::Times(2), Duration::from_millis(5), move || {
///         counter.fetch_add(1, Ordering::SeqCst);
///         Ok(())
///     })
///     .unwrap();
///
/// std::thread::sleep(Duration::from_millis(200));
/// assert_eq!(ticks.load(Ordering::SeqCst), 2);
/// scheduler.dispose();
/// ```
pub struct Scheduler {
    shared: Arc<SchedulerShared>,
    timer: Mutex<Option<JoinHandle<()>>>,
}

impl Scheduler {
    pub fn new(config: SchedulerConfig) -> Result<Self, SchedulerError> {
        Self::build(config, None)
    }

    /// Callbacks are marshaled through `sync` instead of running on the
    /// task's worker thread.
    pub fn with_context(
        config: SchedulerConfig,
        sync: Arc<dyn SynchronizationContext>,
    ) -> Result<Self, SchedulerError> {
        Self::build(config, Some(sync))
    }

    fn build(
        config: SchedulerConfig,
        sync: Option<Arc<dyn SynchronizationContext>>,
    ) -> Result<Self, SchedulerError> {
        config
            .validate()
            .map_err(|e| SchedulerError::InvalidConfig(e.to_string()))?;
        let inner = Inner {
            running: config.start_immediately,
            ..Inner::default()
        };
        let thread_name = format!("{}-timer", config.thread_name);
        let shared = Arc::new(SchedulerShared {
            inner: Mutex::new(inner),
            wake: Condvar::new(),
            config,
            sync,
            invoke_completed: Mutex::new(HandlerList::new()),
        });

        let timer_shared = Arc::clone(&shared);
        let timer = thread::Builder::new()
            .name(thread_name)
            .spawn(move || run_timer(timer_shared))
            .map_err(|e| SchedulerError::Spawn(e.to_string()))?;

        Ok(Self {
            shared,
            timer: Mutex::new(Some(timer)),
        })
    }

    /// Schedule `callback` to fire `count` times, `interval` apart. The first
    /// firing happens one interval from now.
    pub fn add<F>(
        &self,
        count: RepeatCount,
        interval: Duration,
        callback: F,
    ) -> Result<TaskId, SchedulerError>
    where
        F: Fn() -> HandlerResult + Send + Sync + 'static,
    {
        self.add_callback(count, interval, Arc::new(callback))
    }

    pub fn add_callback(
        &self,
        count: RepeatCount,
        interval: Duration,
        callback: ScheduledCallback,
    ) -> Result<TaskId, SchedulerError> {
        if count == RepeatCount::Times(0) {
            return Err(SchedulerError::InvalidCount);
        }

        let mut inner = self.shared.inner.lock();
        if inner.disposed {
            return Err(SchedulerError::Disposed);
        }

        let worker = match inner.pool.pop() {
            Some(worker) => worker,
            None => {
                let name = format!("{}-task-{}", self.shared.config.thread_name, inner.next_worker);
                inner.next_worker += 1;
                TaskWorker::spawn(name, Arc::clone(&self.shared))?
            }
        };

        let id = TaskId(inner.next_id);
        inner.next_id += 1;
        let job = Job {
            remaining: count,
            period: interval,
            callback,
            epoch: inner.epoch,
        };
        inner.push(id, job, worker, Instant::now() + interval);
        self.shared.wake.notify_all();

        tracing::debug!(task = id.value(), ?count, ?interval, "task scheduled");
        Ok(id)
    }

    /// Stop a task. A task that is running right now finishes its current
    /// invocation and is not rescheduled.
    pub fn cancel(&self, id: TaskId) -> bool {
        let mut inner = self.shared.inner.lock();
        if inner.in_flight.contains_key(&id) {
            inner.cancelled.insert(id);
            return true;
        }

        let mut found = None;
        let remaining: Vec<_> = inner
            .queue
            .drain()
            .filter_map(|Reverse(task)| {
                if task.id == id {
                    found = Some(task.worker);
                    None
                } else {
                    Some(Reverse(task))
                }
            })
            .collect();
        inner.queue = remaining.into_iter().collect();

        match found {
            Some(worker) => {
                inner.pool.push(worker);
                true
            }
            None => false,
        }
    }

    /// Resume polling.
    pub fn start(&self) {
        let mut inner = self.shared.inner.lock();
        inner.running = true;
        self.shared.wake.notify_all();
    }

    /// Pause polling. Scheduled tasks are kept.
    pub fn stop(&self) {
        self.shared.inner.lock().running = false;
    }

    pub fn is_running(&self) -> bool {
        self.shared.inner.lock().running
    }

    /// Retire every queued and pooled task. Tasks that are running right now
    /// finish their invocation and are then retired as well.
    pub fn clear(&self) {
        let workers = {
            let mut inner = self.shared.inner.lock();
            inner.epoch += 1;
            inner.cancelled.clear();
            inner.drain_idle()
        };
        tracing::debug!(retired = workers.len(), "scheduler cleared");
        join_all(workers.into_iter().map(TaskWorker::retire).collect());
    }

    /// Number of tasks waiting for their due time.
    pub fn pending_count(&self) -> usize {
        self.shared.inner.lock().queue.len()
    }

    /// Number of idle workers kept for reuse.
    pub fn pooled_count(&self) -> usize {
        self.shared.inner.lock().pool.len()
    }

    /// Number of tasks whose callback is running right now.
    pub fn in_flight_count(&self) -> usize {
        self.shared.inner.lock().in_flight.len()
    }

    pub fn on_invoke_completed<F>(&self, handler: F) -> HandlerId
    where
        F: Fn(&InvokeCompletedEventArgs) + Send + Sync + 'static,
    {
        self.shared.invoke_completed.lock().add(Arc::new(handler))
    }

    pub fn remove_invoke_completed(&self, id: HandlerId) -> bool {
        self.shared.invoke_completed.lock().remove(id)
    }

    /// Stop the timer and every worker. Idempotent; also runs on drop.
    ///
    /// Idle workers and the timer are joined. Workers in the middle of a
    /// callback are signaled and left to exit on their own, since their
    /// callback may be waiting on the thread calling `dispose`.
    pub fn dispose(&self) {
        let (idle, busy) = {
            let mut inner = self.shared.inner.lock();
            if inner.disposed {
                return;
            }
            inner.disposed = true;
            inner.epoch += 1;
            self.shared.wake.notify_all();
            let idle = inner.drain_idle();
            let busy: Vec<TaskWorker> = inner.in_flight.drain().map(|(_, worker)| worker).collect();
            (idle, busy)
        };

        tracing::debug!(detached = busy.len(), "scheduler disposed");
        for worker in busy {
            drop(worker.retire());
        }
        let mut handles: Vec<JoinHandle<()>> = idle.into_iter().map(TaskWorker::retire).collect();
        if let Some(timer) = self.timer.lock().take() {
            handles.push(timer);
        }
        join_all(handles);
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.dispose();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::DelegateQueue;
    use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};

    fn scheduler() -> Scheduler {
        Scheduler::new(SchedulerConfig::default()).unwrap()
    }

    fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(2);
        while Instant::now() < deadline {
            if condition() {
                return true;
            }
            thread::sleep(Duration::from_millis(2));
        }
        condition()
    }

    #[test]
    fn fires_count_times_spaced_by_interval() {
        let scheduler = scheduler();
        let stamps = Arc::new(Mutex::new(Vec::new()));
        let s = Arc::clone(&stamps);

        scheduler
            .add(RepeatCount::Times(3), Duration::from_millis(10), move || {
                s.lock().push(Instant::now());
                Ok(())
            })
            .unwrap();

        assert!(wait_until(|| scheduler.pooled_count() == 1));
        let stamps = stamps.lock().clone();
        assert_eq!(stamps.len(), 3);
        for pair in stamps.windows(2) {
            assert!(pair[1] - pair[0] >= Duration::from_millis(10));
        }
        assert_eq!(scheduler.pending_count(), 0);
        assert_eq!(scheduler.in_flight_count(), 0);
    }

    #[test]
    fn pooled_workers_are_reused() {
        let scheduler = scheduler();
        let worker_threads = Arc::new(Mutex::new(Vec::new()));

        for _ in 0..2 {
            let threads = Arc::clone(&worker_threads);
            scheduler
                .add(RepeatCount::Times(1), Duration::from_millis(1), move || {
                    threads.lock().push(thread::current().id());
                    Ok(())
                })
                .unwrap();
            assert!(wait_until(|| scheduler.pooled_count() == 1));
        }

        let threads = worker_threads.lock();
        assert_eq!(threads.len(), 2);
        assert_eq!(threads[0], threads[1]);
    }

    #[test]
    fn zero_count_is_rejected() {
        let scheduler = scheduler();
        let result = scheduler.add(RepeatCount::Times(0), Duration::from_millis(1), || Ok(()));
        assert_eq!(result, Err(SchedulerError::InvalidCount));
    }

    #[test]
    fn clear_retires_queued_and_pooled_tasks() {
        let scheduler = scheduler();
        scheduler
            .add(RepeatCount::Times(1), Duration::from_millis(1), || Ok(()))
            .unwrap();
        assert!(wait_until(|| scheduler.pooled_count() == 1));
        scheduler
            .add(RepeatCount::Infinite, Duration::from_secs(60), || Ok(()))
            .unwrap();
        assert_eq!(scheduler.pending_count(), 1);

        scheduler.clear();

        assert_eq!(scheduler.pending_count(), 0);
        assert_eq!(scheduler.pooled_count(), 0);
    }

    #[test]
    fn stop_pauses_without_discarding_work() {
        let config = SchedulerConfig {
            start_immediately: false,
            ..SchedulerConfig::default()
        };
        let scheduler = Scheduler::new(config).unwrap();
        let fired = Arc::new(AtomicUsize::new(0));
        let f = Arc::clone(&fired);
        scheduler
            .add(RepeatCount::Times(1), Duration::from_millis(1), move || {
                f.fetch_add(1, AtomicOrdering::SeqCst);
                Ok(())
            })
            .unwrap();

        thread::sleep(Duration::from_millis(30));
        assert!(!scheduler.is_running());
        assert_eq!(fired.load(AtomicOrdering::SeqCst), 0);
        assert_eq!(scheduler.pending_count(), 1);

        scheduler.start();
        assert!(wait_until(|| fired.load(AtomicOrdering::SeqCst) == 1));
    }

    #[test]
    fn failures_are_reported_through_invoke_completed() {
        let scheduler = scheduler();
        let outcomes = Arc::new(Mutex::new(Vec::new()));
        let o = Arc::clone(&outcomes);
        scheduler.on_invoke_completed(move |args| o.lock().push(args.succeeded()));

        scheduler
            .add(RepeatCount::Times(1), Duration::from_millis(1), || {
                Err("disk full".into())
            })
            .unwrap();
        scheduler
            .add(RepeatCount::Times(1), Duration::from_millis(1), || {
                panic!("callback panicked")
            })
            .unwrap();

        assert!(wait_until(|| outcomes.lock().len() == 2));
        assert_eq!(*outcomes.lock(), vec![false, false]);
    }

    #[test]
    fn cancel_removes_a_queued_task() {
        let scheduler = scheduler();
        let id = scheduler
            .add(RepeatCount::Infinite, Duration::from_secs(60), || Ok(()))
            .unwrap();

        assert!(scheduler.cancel(id));
        assert_eq!(scheduler.pending_count(), 0);
        assert_eq!(scheduler.pooled_count(), 1);
        assert!(!scheduler.cancel(id));
    }

    #[test]
    fn callbacks_can_be_marshaled_through_a_context() {
        let owner = Arc::new(DelegateQueue::new("owner").unwrap());
        let owner_thread = owner.send(|| thread::current().id()).unwrap();
        let scheduler =
            Scheduler::with_context(SchedulerConfig::default(), owner.clone()).unwrap();

        let ran_on = Arc::new(Mutex::new(None));
        let r = Arc::clone(&ran_on);
        scheduler
            .add(RepeatCount::Times(1), Duration::from_millis(1), move || {
                *r.lock() = Some(thread::current().id());
                Ok(())
            })
            .unwrap();

        assert!(wait_until(|| ran_on.lock().is_some()));
        assert_eq!(*ran_on.lock(), Some(owner_thread));
    }

    #[test]
    fn zero_poll_interval_is_rejected() {
        let config = SchedulerConfig {
            poll_interval: Duration::ZERO,
            ..SchedulerConfig::default()
        };

        assert!(matches!(
            Scheduler::new(config),
            Err(SchedulerError::InvalidConfig(_))
        ));
    }

    #[test]
    fn dispose_from_the_context_thread_does_not_hang() {
        let owner = Arc::new(DelegateQueue::new("owner").unwrap());
        let scheduler =
            Arc::new(Scheduler::with_context(SchedulerConfig::default(), owner.clone()).unwrap());
        scheduler
            .add(RepeatCount::Infinite, Duration::from_millis(1), || Ok(()))
            .unwrap();

        let (done_tx, done_rx) = channel::bounded(1);
        let s = Arc::clone(&scheduler);
        owner
            .post(move || {
                // Wait until a worker is blocked marshaling onto this thread.
                wait_until(|| s.in_flight_count() == 1);
                s.dispose();
                let _ = done_tx.send(s.in_flight_count());
            })
            .unwrap();

        assert_eq!(done_rx.recv_timeout(Duration::from_secs(5)), Ok(0));
        owner.dispose();
    }

    #[test]
    fn dispose_is_idempotent_and_rejects_new_tasks() {
        let scheduler = scheduler();
        scheduler
            .add(RepeatCount::Infinite, Duration::from_millis(1), || Ok(()))
            .unwrap();

        scheduler.dispose();
        scheduler.dispose();

        let result = scheduler.add(RepeatCount::Times(1), Duration::from_millis(1), || Ok(()));
        assert_eq!(result, Err(SchedulerError::Disposed));
    }
}
