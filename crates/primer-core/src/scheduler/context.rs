//! Carrier threads, the current task, and pinning
//!
//! Every OS thread that touches the runtime gets a [`ThreadContext`] on first
//! use. Its [`CarrierId`] is the identity the init protocol records for the
//! initializing thread. A task running on a scheduler worker can move to a
//! different carrier whenever it yields, unless it is pinned.

use crate::scheduler::Task;
use std::cell::RefCell;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

/// Opaque identity of an OS (carrier) thread
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct CarrierId(u64);

static NEXT_CARRIER_ID: AtomicU64 = AtomicU64::new(1);

impl CarrierId {
    fn next() -> Self {
        CarrierId(NEXT_CARRIER_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the numeric ID value
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

/// Per-thread runtime state
#[derive(Debug)]
pub struct ThreadContext {
    carrier: CarrierId,

    /// Pending interrupt request
    interrupted: AtomicBool,
}

impl ThreadContext {
    fn new() -> Self {
        Self {
            carrier: CarrierId::next(),
            interrupted: AtomicBool::new(false),
        }
    }

    /// Identity of this thread
    pub fn carrier(&self) -> CarrierId {
        self.carrier
    }

    /// Post an interrupt request to this thread.
    ///
    /// The request stays pending until the thread consumes it with
    /// [`ThreadContext::take_interrupt`]. Waiting for another thread's type
    /// initialization neither observes nor clears it.
    pub fn interrupt(&self) {
        self.interrupted.store(true, Ordering::Release);
    }

    /// Check for a pending interrupt without clearing it
    pub fn is_interrupted(&self) -> bool {
        self.interrupted.load(Ordering::Acquire)
    }

    /// Consume a pending interrupt, returning whether one was set
    pub fn take_interrupt(&self) -> bool {
        self.interrupted.swap(false, Ordering::AcqRel)
    }
}

thread_local! {
    static THREAD: Arc<ThreadContext> = Arc::new(ThreadContext::new());
    static CURRENT_TASK: RefCell<Option<Arc<Task>>> = const { RefCell::new(None) };
}

/// The calling thread's context
pub fn current_thread() -> Arc<ThreadContext> {
    THREAD.with(Arc::clone)
}

/// Identity of the calling carrier thread
pub fn current_carrier() -> CarrierId {
    THREAD.with(|ctx| ctx.carrier)
}

/// The task currently executing on this thread, if any
pub fn current_task() -> Option<Arc<Task>> {
    CURRENT_TASK.with(|slot| slot.borrow().clone())
}

/// Restores the previously current task when dropped
pub(crate) struct TaskScope {
    previous: Option<Arc<Task>>,
}

/// Make `task` the current task of this thread for the lifetime of the scope
pub(crate) fn enter_task(task: Arc<Task>) -> TaskScope {
    let previous = CURRENT_TASK.with(|slot| slot.borrow_mut().replace(task));
    TaskScope { previous }
}

impl Drop for TaskScope {
    fn drop(&mut self) {
        let previous = self.previous.take();
        CURRENT_TASK.with(|slot| *slot.borrow_mut() = previous);
    }
}

/// Keeps the current task on its carrier thread until dropped
///
/// Guards nest: a task stays pinned until every guard taken on it is gone.
/// Outside a task the guard is inert.
#[must_use = "the task is unpinned as soon as the guard is dropped"]
pub struct PinGuard {
    task: Option<Arc<Task>>,
}

impl PinGuard {
    /// Whether this guard actually pinned a task
    pub fn is_active(&self) -> bool {
        self.task.is_some()
    }
}

/// Pin the current task (if any) to the carrier it is running on
pub fn pin() -> PinGuard {
    let task = current_task();
    if let Some(task) = &task {
        task.pin();
        tracing::trace!(
            task = task.id().as_u64(),
            carrier = current_carrier().as_u64(),
            "pinned task"
        );
    }
    PinGuard { task }
}

/// Whether the current task is pinned. Always false outside a task.
pub fn is_pinned() -> bool {
    current_task().map_or(false, |task| task.is_pinned())
}

impl Drop for PinGuard {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.unpin();
            tracing::trace!(task = task.id().as_u64(), "unpinned task");
        }
    }
}
