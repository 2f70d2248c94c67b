//! Task structure and execution state

use crate::scheduler::CarrierId;
use crossbeam::atomic::AtomicCell;
use parking_lot::Condvar as ParkingCondvar;
use parking_lot::Mutex as ParkingMutex;
use std::error::Error;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

/// Error type a task body may fail with
pub type TaskError = Box<dyn Error + Send + Sync>;

/// Outcome of running one step of a task
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum TaskStep {
    /// The task has more work; requeue it
    Yield,
    /// The task is done
    Complete,
}

/// Body of a task, called once per step
pub type TaskBody = Box<dyn FnMut() -> Result<TaskStep, TaskError> + Send>;

/// Unique identifier for a Task
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct TaskId(u64);

static NEXT_TASK_ID: AtomicU64 = AtomicU64::new(1);

impl TaskId {
    /// Generate a new unique TaskId
    pub fn new() -> Self {
        TaskId(NEXT_TASK_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the numeric ID value
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

/// State of a Task
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum TaskState {
    /// Just created, not yet scheduled
    Created,
    /// Currently executing on a worker
    Running,
    /// Yielded, waiting to be picked up again
    Yielded,
    /// Completed successfully
    Completed,
    /// Failed with an error
    Failed,
}

/// A cooperative task (green thread)
///
/// A task runs as a sequence of steps. Between steps it may be picked up by
/// any worker, so consecutive steps can run on different carrier threads.
/// While pinned, the task only ever resumes on the carrier that pinned it.
pub struct Task {
    /// Unique identifier
    id: TaskId,

    /// Current state
    state: ParkingMutex<TaskState>,

    /// Step function, dropped once the task finishes
    body: ParkingMutex<Option<TaskBody>>,

    /// Number of live pin guards
    pin_count: AtomicU32,

    /// Carrier that ran the most recent step
    carrier: AtomicCell<Option<CarrierId>>,

    /// Number of steps that ran on a different carrier than the step before
    migrations: AtomicU32,

    /// Failure message (when state is Failed)
    failure: ParkingMutex<Option<String>>,

    /// Completion tracking for blocking wait
    completion_lock: ParkingMutex<bool>,

    /// Condvar for blocking until task completes
    completion_condvar: ParkingCondvar,
}

impl Task {
    /// Create a new Task from its step function
    pub fn new<F>(body: F) -> Self
    where
        F: FnMut() -> Result<TaskStep, TaskError> + Send + 'static,
    {
        Self {
            id: TaskId::new(),
            state: ParkingMutex::new(TaskState::Created),
            body: ParkingMutex::new(Some(Box::new(body))),
            pin_count: AtomicU32::new(0),
            carrier: AtomicCell::new(None),
            migrations: AtomicU32::new(0),
            failure: ParkingMutex::new(None),
            completion_lock: ParkingMutex::new(false),
            completion_condvar: ParkingCondvar::new(),
        }
    }

    /// Get the Task's unique ID
    pub fn id(&self) -> TaskId {
        self.id
    }

    /// Get the current state
    pub fn state(&self) -> TaskState {
        *self.state.lock()
    }

    pub(crate) fn set_state(&self, state: TaskState) {
        *self.state.lock() = state;
    }

    /// Carrier that ran the most recent step
    pub fn carrier(&self) -> Option<CarrierId> {
        self.carrier.load()
    }

    /// How many times the task resumed on a different carrier
    pub fn migrations(&self) -> u32 {
        self.migrations.load(Ordering::Relaxed)
    }

    /// Whether the task is pinned to its carrier
    pub fn is_pinned(&self) -> bool {
        self.pin_count.load(Ordering::Acquire) > 0
    }

    /// Number of live pin guards
    pub fn pin_count(&self) -> u32 {
        self.pin_count.load(Ordering::Acquire)
    }

    pub(crate) fn pin(&self) {
        self.pin_count.fetch_add(1, Ordering::AcqRel);
    }

    pub(crate) fn unpin(&self) {
        let previous = self.pin_count.fetch_sub(1, Ordering::AcqRel);
        debug_assert!(previous > 0, "unbalanced unpin of task {:?}", self.id);
    }

    /// Run one step on `carrier`.
    ///
    /// Only the worker that dequeued the task calls this, so steps never
    /// overlap.
    pub(crate) fn run_step(&self, carrier: CarrierId) -> Result<TaskStep, TaskError> {
        if let Some(previous) = self.carrier.swap(Some(carrier)) {
            if previous != carrier {
                debug_assert!(!self.is_pinned(), "pinned task {:?} migrated", self.id);
                self.migrations.fetch_add(1, Ordering::Relaxed);
            }
        }

        let mut body = self.body.lock();
        match body.as_mut() {
            Some(step) => step(),
            None => Ok(TaskStep::Complete),
        }
    }

    /// Mark the task as completed
    pub(crate) fn complete(&self) {
        self.body.lock().take();
        self.set_state(TaskState::Completed);
        self.signal_completion();
    }

    /// Mark the task as failed
    pub(crate) fn fail(&self, error: &TaskError) {
        self.body.lock().take();
        *self.failure.lock() = Some(error.to_string());
        self.set_state(TaskState::Failed);
        self.signal_completion();
    }

    /// Failure message, if the task failed
    pub fn failure(&self) -> Option<String> {
        self.failure.lock().clone()
    }

    fn signal_completion(&self) {
        let mut done = self.completion_lock.lock();
        *done = true;
        self.completion_condvar.notify_all();
    }

    /// Whether the task has finished (completed or failed)
    pub fn is_done(&self) -> bool {
        *self.completion_lock.lock()
    }

    /// Block until this task completes (either successfully or with failure)
    /// Returns the task state after completion
    pub fn wait_completion(&self) -> TaskState {
        let mut done = self.completion_lock.lock();
        while !*done {
            self.completion_condvar.wait(&mut done);
        }
        drop(done);
        self.state()
    }
}

impl std::fmt::Debug for Task {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Task")
            .field("id", &self.id)
            .field("state", &self.state())
            .field("pin_count", &self.pin_count())
            .field("carrier", &self.carrier())
            .finish()
    }
}
