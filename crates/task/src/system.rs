use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use tracing::{debug, trace};

use crate::notification_queue::{NotificationQueue, WaitableZeroCounter};
use crate::task::Task;

/// Non-blocking passes attempted across sibling queues before a submitter
/// falls back to a blocking push, matching the upstream task scheduler.
const NUMBER_OF_ATTEMPTS: usize = 5;

/// A fixed pool of worker threads, each draining its own [`NotificationQueue`]
/// but able to steal from its siblings via a round-robin scan (§4.1).
///
/// There are no implicit blocking waits in the pool's public API besides
/// `pop`/`push` internals and [`TaskSystem::finish`]'s `WaitForZero` — see
/// the crate-level concurrency notes.
pub struct TaskSystem {
    thread_count: usize,
    queues: Arc<Vec<NotificationQueue>>,
    index: AtomicUsize,
    shutdown: Arc<AtomicBool>,
    total_workload: Arc<WaitableZeroCounter>,
    threads: Vec<JoinHandle<()>>,
}

impl TaskSystem {
    /// Spawns `hardware_concurrency()` workers (minimum 1).
    pub fn new() -> Self {
        Self::with_threads(num_cpus::get())
    }

    pub fn with_threads(number_of_threads: usize) -> Self {
        let thread_count = number_of_threads.max(1);
        let total_workload = Arc::new(WaitableZeroCounter::new(thread_count));
        let mut queues = Vec::with_capacity(thread_count);
        for _ in 0..thread_count {
            queues.push(NotificationQueue::new(Arc::clone(&total_workload)));
        }
        let queues = Arc::new(queues);
        let shutdown = Arc::new(AtomicBool::new(false));

        let mut threads = Vec::with_capacity(thread_count);
        for idx in 0..thread_count {
            let queues = Arc::clone(&queues);
            let shutdown = Arc::clone(&shutdown);
            let handle = std::thread::Builder::new()
                .name(format!("bb-task-{idx}"))
                .spawn(move || run_worker(idx, &queues, &shutdown))
                .expect("failed to spawn task system worker");
            threads.push(handle);
        }

        Self {
            thread_count,
            queues,
            index: AtomicUsize::new(0),
            shutdown,
            total_workload,
            threads,
        }
    }

    pub fn number_of_threads(&self) -> usize {
        self.thread_count
    }

    /// Queues `f`. Tries `NUMBER_OF_ATTEMPTS` non-blocking passes over
    /// successive queues starting at a rotating index, then blocks pushing
    /// into the final queue of that scan.
    pub fn queue_task<F>(&self, f: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let idx = self.index.fetch_add(1, Ordering::Relaxed);
        let mut task = Task::new(f);
        for i in 0..self.thread_count * NUMBER_OF_ATTEMPTS {
            match self.queues[(idx + i) % self.thread_count].try_push(task) {
                Ok(()) => return,
                Err(returned) => task = returned,
            }
        }
        self.queues[idx % self.thread_count].push(task);
    }

    /// Initiates shutdown: workers finish their current task, drain their
    /// queue, then exit. Does not wait for in-flight tasks to complete —
    /// call [`Self::finish`] first if that is required.
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
        self.total_workload.abort();
        for q in self.queues.iter() {
            q.mark_done();
        }
    }

    /// Blocks until every queue is empty and no worker is executing a task.
    pub fn finish(&self) {
        self.total_workload.wait_for_zero();
    }
}

impl Drop for TaskSystem {
    fn drop(&mut self) {
        self.finish();
        self.shutdown();
        for handle in self.threads.drain(..) {
            let _ = handle.join();
        }
    }
}

impl Default for TaskSystem {
    fn default() -> Self {
        Self::new()
    }
}

fn run_worker(idx: usize, queues: &[NotificationQueue], shutdown: &AtomicBool) {
    debug!(worker = idx, "task worker starting");
    let n = queues.len();
    'outer: while !shutdown.load(Ordering::SeqCst) {
        let mut found = None;
        for i in 0..n {
            if let Some(t) = queues[(idx + i) % n].try_pop() {
                found = Some(t);
                break;
            }
        }
        let task = match found {
            Some(t) => t,
            None => match queues[idx % n].pop() {
                Some(t) => t,
                None => break 'outer,
            },
        };
        if shutdown.load(Ordering::SeqCst) {
            break;
        }
        trace!(worker = idx, "running task");
        task.run();
    }
    debug!(worker = idx, "task worker exiting");
}
