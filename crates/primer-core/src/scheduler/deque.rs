//! Work-stealing deque for task scheduling

use crate::scheduler::Task;
use crossbeam_deque::{Injector, Steal, Stealer, Worker};
use std::collections::VecDeque;
use std::sync::Arc;

/// Work sources for a single worker
///
/// Besides the usual local/steal/global sources, every worker owns a private
/// queue for pinned tasks. Nothing else can reach that queue, so a pinned
/// task is only ever resumed by the worker (carrier) that parked it there.
pub struct WorkerDeque {
    /// Local worker deque (LIFO for own tasks)
    worker: Worker<Arc<Task>>,

    /// Stealer handles for other workers
    stealers: Vec<Stealer<Arc<Task>>>,

    /// Global injector for tasks without affinity
    injector: Arc<Injector<Arc<Task>>>,

    /// Tasks pinned to this worker's carrier
    pinned: VecDeque<Arc<Task>>,
}

impl WorkerDeque {
    /// Create a new WorkerDeque
    pub fn new(
        worker: Worker<Arc<Task>>,
        stealers: Vec<Stealer<Arc<Task>>>,
        injector: Arc<Injector<Arc<Task>>>,
    ) -> Self {
        Self {
            worker,
            stealers,
            injector,
            pinned: VecDeque::new(),
        }
    }

    /// Push a task to the local deque (LIFO)
    pub fn push(&self, task: Arc<Task>) {
        self.worker.push(task);
    }

    /// Park a pinned task on this worker
    pub fn push_pinned(&mut self, task: Arc<Task>) {
        self.pinned.push_back(task);
    }

    /// Hand a yielded task back: pinned tasks stay here, others go global
    pub fn requeue(&mut self, task: Arc<Task>) {
        if task.is_pinned() {
            self.push_pinned(task);
        } else {
            self.injector.push(task);
        }
    }

    /// Try to get work: pinned, local pop, then steal, then inject
    pub fn find_work(&mut self) -> Option<Arc<Task>> {
        // 1. Pinned tasks can only run here
        if let Some(task) = self.pinned.pop_front() {
            return Some(task);
        }

        // 2. Local deque (LIFO - cache locality)
        if let Some(task) = self.worker.pop() {
            return Some(task);
        }

        // 3. Steal from other workers, then the global injector
        loop {
            if let Some(task) = self.steal_from_others() {
                return Some(task);
            }

            match self.injector.steal_batch_and_pop(&self.worker) {
                Steal::Success(task) => return Some(task),
                Steal::Empty => break,
                Steal::Retry => continue,
            }
        }

        None
    }

    /// Steal from other workers (FIFO from their deque bottom)
    fn steal_from_others(&self) -> Option<Arc<Task>> {
        use rand::Rng;

        if self.stealers.is_empty() {
            return None;
        }

        // Randomly select a victim to reduce contention
        let start = rand::thread_rng().gen_range(0..self.stealers.len());

        for i in 0..self.stealers.len() {
            let stealer = &self.stealers[(start + i) % self.stealers.len()];
            loop {
                match stealer.steal() {
                    Steal::Success(task) => return Some(task),
                    Steal::Empty => break,
                    Steal::Retry => continue,
                }
            }
        }

        None
    }

    /// Number of tasks parked as pinned
    pub fn pinned_len(&self) -> usize {
        self.pinned.len()
    }

    /// Take every pinned and local task, leaving the injector alone
    pub fn drain(&mut self) -> Vec<Arc<Task>> {
        let mut tasks: Vec<_> = self.pinned.drain(..).collect();
        while let Some(task) = self.worker.pop() {
            tasks.push(task);
        }
        tasks
    }

    /// Check if this worker has no local or pinned work
    pub fn is_empty(&self) -> bool {
        self.worker.is_empty() && self.pinned.is_empty()
    }
}
