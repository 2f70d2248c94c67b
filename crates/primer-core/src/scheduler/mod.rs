//! Task Scheduler - Work-Stealing Concurrency
//!
//! Goroutine-style cooperative tasks multiplexed over a pool of carrier
//! threads, plus the per-thread context the init protocol relies on:
//! carrier identity, pending interrupts and task pinning.

mod context;
mod deque;
#[allow(clippy::module_inception)]
mod scheduler;
mod task;
mod worker;

pub use context::{
    current_carrier, current_task, current_thread, is_pinned, pin, CarrierId, PinGuard,
    ThreadContext,
};
pub(crate) use context::enter_task;
pub use deque::WorkerDeque;
pub use scheduler::{Scheduler, SchedulerError, SchedulerOptions, SchedulerStats, TaskHandle};
pub use task::{Task, TaskBody, TaskError, TaskId, TaskState, TaskStep};
pub use worker::Worker;
