use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::{Condvar, Mutex};

use crate::task::Task;

/// Counter that can block a caller until it reaches zero, used by
/// [`crate::TaskSystem::finish`] to detect quiescence: no task is queued and
/// no worker is currently executing one.
///
/// All mutation goes through the lock that guards the condition variable;
/// there is no lock-free fast path, matching the source design's own
/// shared/exclusive-locked counter.
pub struct WaitableZeroCounter {
    count: AtomicUsize,
    done: AtomicBool,
    gate: Mutex<()>,
    cv: Condvar,
}

impl WaitableZeroCounter {
    pub fn new(init: usize) -> Self {
        Self {
            count: AtomicUsize::new(init),
            done: AtomicBool::new(false),
            gate: Mutex::new(()),
            cv: Condvar::new(),
        }
    }

    fn is_zero(&self) -> bool {
        self.count.load(Ordering::SeqCst) == 0 || self.done.load(Ordering::SeqCst)
    }

    pub fn increment(&self) {
        self.count.fetch_add(1, Ordering::SeqCst);
    }

    pub fn decrement(&self) {
        let prev = self.count.fetch_sub(1, Ordering::SeqCst);
        if prev == 1 {
            let _guard = self.gate.lock();
            self.cv.notify_all();
        }
    }

    /// Blocks the caller until the counter reaches zero (or [`Self::abort`]
    /// is called). Loops to protect against spurious wakeups.
    pub fn wait_for_zero(&self) {
        let mut guard = self.gate.lock();
        while !self.is_zero() {
            self.cv.wait(&mut guard);
        }
    }

    /// Forces every waiter to wake up regardless of the current count, used
    /// by [`crate::TaskSystem::shutdown`] to unblock a concurrent `finish()`.
    pub fn abort(&self) {
        self.done.store(true, Ordering::SeqCst);
        let _guard = self.gate.lock();
        self.cv.notify_all();
    }
}

/// A FIFO queue of pending [`Task`]s owned by one worker of a [`crate::TaskSystem`],
/// but pushable and (non-blockingly) poppable by any thread.
pub struct NotificationQueue {
    queue: Mutex<VecDeque<Task>>,
    ready: Condvar,
    done: AtomicBool,
    total_workload: Arc<WaitableZeroCounter>,
}

impl NotificationQueue {
    pub fn new(total_workload: Arc<WaitableZeroCounter>) -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            ready: Condvar::new(),
            done: AtomicBool::new(false),
            total_workload,
        }
    }

    /// Blocks until a task is available or the queue is marked done.
    pub fn pop(&self) -> Option<Task> {
        let mut guard = self.queue.lock();
        if guard.is_empty() && !self.done.load(Ordering::SeqCst) {
            self.total_workload.decrement();
            while guard.is_empty() && !self.done.load(Ordering::SeqCst) {
                self.ready.wait(&mut guard);
            }
            self.total_workload.increment();
        }
        let t = guard.pop_front();
        if t.is_some() {
            self.total_workload.decrement();
        }
        t
    }

    /// Non-blocking: returns `None` if the queue's lock is contended or it
    /// is empty, rather than waiting for either.
    pub fn try_pop(&self) -> Option<Task> {
        let mut guard = self.queue.try_lock()?;
        let t = guard.pop_front();
        if t.is_some() {
            self.total_workload.decrement();
        }
        t
    }

    /// Pushes `task`, blocking until the internal lock is available.
    pub fn push(&self, task: Task) {
        self.total_workload.increment();
        {
            let mut guard = self.queue.lock();
            guard.push_back(task);
        }
        self.ready.notify_one();
    }

    /// Attempts to push without blocking; returns `false` (without queuing
    /// `task`) if the lock is currently held by someone else.
    pub fn try_push(&self, task: Task) -> Result<(), Task> {
        match self.queue.try_lock() {
            Some(mut guard) => {
                self.total_workload.increment();
                guard.push_back(task);
                drop(guard);
                self.ready.notify_one();
                Ok(())
            }
            None => Err(task),
        }
    }

    /// Marks the queue done: further `pop()` calls drain what remains and
    /// then return `None` instead of blocking.
    pub fn mark_done(&self) {
        {
            let _guard = self.queue.lock();
            self.done.store(true, Ordering::SeqCst);
        }
        self.ready.notify_all();
    }
}
