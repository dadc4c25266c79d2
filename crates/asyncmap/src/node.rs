use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use bb_task::{Task, TaskSystem};

const PENDING: u8 = 0;
const READY: u8 = 1;
const FAILED: u8 = 2;

struct Inner<V> {
    value: Option<Arc<V>>,
    awaiting: Vec<Task>,
    failure: Vec<Task>,
}

/// A memoised slot for one key's value (§3 "Async map node").
///
/// Lifecycle is one-way: `Created -> QueuedForProcessing -> (ValueSet |
/// Failed)`. Once `ValueSet` or `Failed`, the node's state never changes
/// again; awaiting/failure continuations queued afterwards are dispatched
/// (or dropped) immediately rather than stored.
pub struct AsyncMapNode<K, V> {
    key: K,
    status: AtomicU8,
    inner: Mutex<Inner<V>>,
    queued_to_be_processed: AtomicBool,
}

impl<K, V> AsyncMapNode<K, V> {
    pub(crate) fn new(key: K) -> Self {
        Self {
            key,
            status: AtomicU8::new(PENDING),
            inner: Mutex::new(Inner {
                value: None,
                awaiting: Vec::new(),
                failure: Vec::new(),
            }),
            queued_to_be_processed: AtomicBool::new(false),
        }
    }

    pub fn key(&self) -> &K {
        &self.key
    }

    pub fn is_ready(&self) -> bool {
        self.status.load(Ordering::Acquire) == READY
    }

    pub fn is_failed(&self) -> bool {
        self.status.load(Ordering::Acquire) == FAILED
    }

    /// Not ready until a value has been set; panics if called before that
    /// (mirrors the source's "not thread safe unless value has been set").
    pub fn get_value(&self) -> Arc<V> {
        self.inner
            .lock()
            .value
            .clone()
            .expect("AsyncMapNode::get_value called before value was set")
    }

    /// Sets the node's value and drains awaiting continuations onto `ts`. A
    /// node that already failed silently absorbs this call.
    pub fn set_and_queue_awaiting_tasks(&self, ts: &TaskSystem, value: V) {
        let mut to_queue = Vec::new();
        {
            let mut inner = self.inner.lock();
            if self.status.load(Ordering::Acquire) == FAILED {
                return;
            }
            inner.value = Some(Arc::new(value));
            self.status.store(READY, Ordering::Release);
            to_queue.append(&mut inner.awaiting);
            inner.failure.clear();
        }
        for task in to_queue {
            ts.queue_task(move || task.run());
        }
    }

    /// Queues `task` as the node's (sole) processing task, exactly once per
    /// node — lock-free via a swap on the `queued_to_be_processed` flag.
    pub fn queue_once_processing_task<F>(&self, ts: &TaskSystem, task: F)
    where
        F: FnOnce() + Send + 'static,
    {
        if self.queued_to_be_processed.swap(true, Ordering::AcqRel) {
            return;
        }
        ts.queue_task(task);
    }

    /// Queues `task` immediately if the node is ready; otherwise stores it to
    /// run once the value is set. Returns whether it was queued immediately.
    /// A failed node drops the task and returns `false`.
    pub fn add_or_queue_awaiting_task<F>(&self, ts: &TaskSystem, task: F) -> bool
    where
        F: FnOnce() + Send + 'static,
    {
        if self.is_ready() {
            ts.queue_task(task);
            return true;
        }
        let mut inner = self.inner.lock();
        match self.status.load(Ordering::Acquire) {
            FAILED => false,
            READY => {
                drop(inner);
                ts.queue_task(task);
                true
            }
            _ => {
                inner.awaiting.push(Task::new(task));
                false
            }
        }
    }

    /// Queues `task` to run if (and only if) the node ends up `Failed`. A
    /// node that is already ready will never fail, so the task is dropped.
    pub fn queue_on_failure<F>(&self, ts: &TaskSystem, task: F)
    where
        F: FnOnce() + Send + 'static,
    {
        if self.is_ready() {
            return;
        }
        let mut inner = self.inner.lock();
        if self.status.load(Ordering::Acquire) == FAILED {
            ts.queue_task(task);
        } else {
            inner.failure.push(Task::new(task));
        }
    }

    /// Marks the node Failed and drains failure continuations. A no-op if
    /// the node already has a value or already failed.
    pub fn fail(&self, ts: &TaskSystem) {
        let mut to_queue = Vec::new();
        {
            let mut inner = self.inner.lock();
            if self.status.load(Ordering::Acquire) != PENDING {
                return;
            }
            self.status.store(FAILED, Ordering::Release);
            to_queue.append(&mut inner.failure);
            inner.awaiting.clear();
        }
        for task in to_queue {
            ts.queue_task(move || task.run());
        }
    }
}
