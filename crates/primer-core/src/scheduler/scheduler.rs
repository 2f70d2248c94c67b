//! Main task scheduler coordinating worker threads

use crate::scheduler::worker::SchedulerShared;
use crate::scheduler::{Task, TaskError, TaskId, TaskState, TaskStep, Worker};
use crossbeam_deque::{Steal, Worker as CWorker};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Errors reported by the scheduler
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// The scheduler has been shut down
    #[error("Scheduler is shut down")]
    ShutDown,

    /// Too many live tasks
    #[error("Task limit reached: {0}")]
    TaskLimitReached(usize),

    /// A worker thread could not be spawned
    #[error("Failed to spawn worker thread: {0}")]
    SpawnFailed(#[from] std::io::Error),
}

/// Scheduler configuration
#[derive(Debug, Clone)]
pub struct SchedulerOptions {
    /// Number of worker (carrier) threads; 0 = number of CPU cores
    pub worker_count: usize,

    /// Maximum number of live tasks (None = unlimited)
    pub max_tasks: Option<usize>,

    /// Sleep between polls when a worker finds no work
    pub idle_backoff: Duration,
}

impl Default for SchedulerOptions {
    fn default() -> Self {
        Self {
            worker_count: 0,
            max_tasks: None,
            idle_backoff: Duration::from_micros(100),
        }
    }
}

impl SchedulerOptions {
    /// Options with a fixed number of workers
    pub fn with_workers(worker_count: usize) -> Self {
        Self {
            worker_count,
            ..Default::default()
        }
    }
}

/// Scheduler statistics
#[derive(Debug, Clone, Default)]
pub struct SchedulerStats {
    /// Total tasks spawned
    pub tasks_spawned: u64,

    /// Total tasks completed
    pub tasks_completed: u64,

    /// Total tasks failed
    pub tasks_failed: u64,

    /// Currently live tasks
    pub active_tasks: usize,
}

/// Handle to a spawned task
#[derive(Debug, Clone)]
pub struct TaskHandle {
    task: Arc<Task>,
}

impl TaskHandle {
    /// Task ID
    pub fn id(&self) -> TaskId {
        self.task.id()
    }

    /// The underlying task
    pub fn task(&self) -> &Arc<Task> {
        &self.task
    }

    /// Block until the task finishes.
    ///
    /// Returns the failure message if the task failed.
    pub fn join(&self) -> Result<(), String> {
        match self.task.wait_completion() {
            TaskState::Failed => Err(self.task.failure().unwrap_or_default()),
            _ => Ok(()),
        }
    }
}

/// Work-stealing scheduler for cooperative tasks
pub struct Scheduler {
    /// Worker threads
    workers: Vec<Worker>,

    /// State shared with workers
    shared: Arc<SchedulerShared>,

    /// Configuration
    options: SchedulerOptions,
}

impl Scheduler {
    /// Create and start a scheduler
    pub fn new(options: SchedulerOptions) -> Result<Self, SchedulerError> {
        let worker_count = if options.worker_count == 0 {
            num_cpus::get()
        } else {
            options.worker_count
        };

        let shared = Arc::new(SchedulerShared::new(options.idle_backoff));

        let deques: Vec<CWorker<Arc<Task>>> =
            (0..worker_count).map(|_| CWorker::new_lifo()).collect();
        let stealers: Vec<_> = deques.iter().map(|d| d.stealer()).collect();

        let mut scheduler = Self {
            workers: Vec::with_capacity(worker_count),
            shared: shared.clone(),
            options,
        };

        for (id, deque) in deques.into_iter().enumerate() {
            // Get stealers from other workers (exclude self)
            let other_stealers: Vec<_> = stealers
                .iter()
                .enumerate()
                .filter(|(i, _)| *i != id)
                .map(|(_, s)| s.clone())
                .collect();

            let mut worker = Worker::new(id, other_stealers, shared.clone());
            // Already started workers are stopped by Drop if this fails
            worker.start(deque)?;
            scheduler.workers.push(worker);
        }

        tracing::debug!(workers = worker_count, "scheduler started");
        Ok(scheduler)
    }

    /// Number of worker threads
    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    /// Configuration this scheduler was created with
    pub fn options(&self) -> &SchedulerOptions {
        &self.options
    }

    /// Spawn a task from its step function
    pub fn spawn<F>(&self, body: F) -> Result<TaskHandle, SchedulerError>
    where
        F: FnMut() -> Result<TaskStep, TaskError> + Send + 'static,
    {
        if self.shared.shutdown.load(Ordering::Acquire) {
            return Err(SchedulerError::ShutDown);
        }

        // Reserve the slot before the task exists so racing spawns cannot overshoot
        match self.options.max_tasks {
            Some(max) => {
                self.shared
                    .active_tasks
                    .fetch_update(Ordering::AcqRel, Ordering::Acquire, |active| {
                        (active < max).then(|| active + 1)
                    })
                    .map_err(|_| SchedulerError::TaskLimitReached(max))?;
            }
            None => {
                self.shared.active_tasks.fetch_add(1, Ordering::AcqRel);
            }
        }

        let task = Arc::new(Task::new(body));
        self.shared.tasks_spawned.fetch_add(1, Ordering::Relaxed);
        self.shared.injector.push(task.clone());

        Ok(TaskHandle { task })
    }

    /// Spawn a task that runs `f` once and completes
    pub fn spawn_once<F>(&self, f: F) -> Result<TaskHandle, SchedulerError>
    where
        F: FnOnce() -> Result<(), TaskError> + Send + 'static,
    {
        let mut f = Some(f);
        self.spawn(move || {
            if let Some(f) = f.take() {
                f()?;
            }
            Ok(TaskStep::Complete)
        })
    }

    /// Get scheduler statistics
    pub fn stats(&self) -> SchedulerStats {
        SchedulerStats {
            tasks_spawned: self.shared.tasks_spawned.load(Ordering::Relaxed),
            tasks_completed: self.shared.tasks_completed.load(Ordering::Relaxed),
            tasks_failed: self.shared.tasks_failed.load(Ordering::Relaxed),
            active_tasks: self.shared.active_tasks.load(Ordering::Acquire),
        }
    }

    /// Stop all workers.
    ///
    /// Tasks that have not finished are failed with
    /// [`SchedulerError::ShutDown`], so their handles stop waiting.
    pub fn shutdown(&mut self) {
        self.shared.shutdown.store(true, Ordering::Release);
        for worker in &mut self.workers {
            worker.join();
        }
        self.workers.clear();

        // Workers fail their own queues on exit; the injector is drained here
        loop {
            match self.shared.injector.steal() {
                Steal::Success(task) => self.shared.abandon(&task),
                Steal::Empty => break,
                Steal::Retry => continue,
            }
        }
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}
