//! Worker thread that executes Tasks
//!
//! Workers pick up tasks from their pinned queue, their local deque, other
//! workers, or the global injector, and run one step at a time. Each worker
//! thread is a carrier: the task being stepped sees the worker's
//! [`CarrierId`](crate::scheduler::CarrierId) as the current carrier.

use crate::scheduler::{
    current_carrier, enter_task, SchedulerError, Task, TaskError, TaskState, TaskStep,
    WorkerDeque,
};
use crossbeam_deque::{Injector, Stealer, Worker as CWorker};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// State shared between the scheduler and its workers
pub(crate) struct SchedulerShared {
    /// Global queue for new and unpinned yielded tasks
    pub(crate) injector: Arc<Injector<Arc<Task>>>,

    /// Shutdown signal
    pub(crate) shutdown: AtomicBool,

    /// How long an idle worker sleeps before looking for work again
    pub(crate) idle_backoff: Duration,

    pub(crate) tasks_spawned: AtomicU64,
    pub(crate) tasks_completed: AtomicU64,
    pub(crate) tasks_failed: AtomicU64,
    pub(crate) active_tasks: AtomicUsize,
}

impl SchedulerShared {
    pub(crate) fn new(idle_backoff: Duration) -> Self {
        Self {
            injector: Arc::new(Injector::new()),
            shutdown: AtomicBool::new(false),
            idle_backoff,
            tasks_spawned: AtomicU64::new(0),
            tasks_completed: AtomicU64::new(0),
            tasks_failed: AtomicU64::new(0),
            active_tasks: AtomicUsize::new(0),
        }
    }

    /// Fail a task that will never run again because of shutdown
    pub(crate) fn abandon(&self, task: &Task) {
        let error: TaskError = Box::new(SchedulerError::ShutDown);
        task.fail(&error);
        self.tasks_failed.fetch_add(1, Ordering::Relaxed);
        self.active_tasks.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Worker thread that executes Tasks
pub struct Worker {
    /// Worker ID
    id: usize,

    /// Stealers from other workers
    stealers: Vec<Stealer<Arc<Task>>>,

    /// Shared scheduler state
    shared: Arc<SchedulerShared>,

    /// Worker thread handle
    handle: Option<thread::JoinHandle<()>>,
}

impl Worker {
    /// Create a new Worker
    pub(crate) fn new(
        id: usize,
        stealers: Vec<Stealer<Arc<Task>>>,
        shared: Arc<SchedulerShared>,
    ) -> Self {
        Self {
            id,
            stealers,
            shared,
            handle: None,
        }
    }

    /// Worker ID
    pub fn id(&self) -> usize {
        self.id
    }

    /// Start the worker thread
    pub(crate) fn start(&mut self, worker: CWorker<Arc<Task>>) -> std::io::Result<()> {
        let id = self.id;
        let stealers = self.stealers.clone();
        let shared = self.shared.clone();

        let handle = thread::Builder::new()
            .name(format!("primer-worker-{}", id))
            .spawn(move || {
                let deque = WorkerDeque::new(worker, stealers, shared.injector.clone());
                Worker::run_loop(id, deque, shared);
            })?;

        self.handle = Some(handle);
        Ok(())
    }

    /// Wait for the worker thread to exit (after shutdown was signalled)
    pub(crate) fn join(&mut self) {
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                tracing::error!(worker = self.id, "worker thread panicked");
            }
        }
    }

    /// Worker thread main loop
    fn run_loop(id: usize, mut deque: WorkerDeque, shared: Arc<SchedulerShared>) {
        let carrier = current_carrier();
        tracing::debug!(worker = id, carrier = carrier.as_u64(), "worker started");

        loop {
            if shared.shutdown.load(Ordering::Acquire) {
                break;
            }

            let task = match deque.find_work() {
                Some(task) => task,
                None => {
                    thread::sleep(shared.idle_backoff);
                    continue;
                }
            };

            task.set_state(TaskState::Running);

            // A panicking step fails its task; the worker keeps going
            let result = panic::catch_unwind(AssertUnwindSafe(|| {
                let _scope = enter_task(task.clone());
                task.run_step(carrier)
            }))
            .unwrap_or_else(|payload| Err(panic_message(payload).into()));

            match result {
                Ok(TaskStep::Complete) => {
                    task.complete();
                    shared.tasks_completed.fetch_add(1, Ordering::Relaxed);
                    shared.active_tasks.fetch_sub(1, Ordering::AcqRel);
                }
                Ok(TaskStep::Yield) => {
                    task.set_state(TaskState::Yielded);
                    deque.requeue(task);
                }
                Err(error) => {
                    tracing::warn!(worker = id, task = task.id().as_u64(), %error, "task failed");
                    task.fail(&error);
                    shared.tasks_failed.fetch_add(1, Ordering::Relaxed);
                    shared.active_tasks.fetch_sub(1, Ordering::AcqRel);
                }
            }
        }

        let abandoned = deque.drain();
        tracing::debug!(worker = id, abandoned = abandoned.len(), "worker shutting down");
        for task in abandoned {
            shared.abandon(&task);
        }
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        format!("task panicked: {}", message)
    } else if let Some(message) = payload.downcast_ref::<String>() {
        format!("task panicked: {}", message)
    } else {
        "task panicked".to_string()
    }
}
