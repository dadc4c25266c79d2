use std::collections::{HashMap, HashSet};
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::thread::ThreadId;

use parking_lot::Mutex;

use bb_task::TaskSystem;

use crate::map::AsyncMap;
use crate::node::AsyncMapNode;
use crate::{MapKey, MapValue};

/// `logger(message, fatal)`: non-fatal messages are just reported; a fatal
/// one also fails the node it originates from (§4.3, §7).
pub type Logger = Arc<dyn Fn(&str, bool) + Send + Sync>;

/// Runs once, if the node it is attached to ends up `Failed`.
pub type FailureFn = Arc<dyn Fn() + Send + Sync>;

/// Runs once all requested values are ready, in the order the keys were
/// given.
pub type Consumer<V> = Box<dyn FnOnce(Vec<Arc<V>>) + Send>;

/// `setter(value)`: transitions a node to `ValueSet`, called at most once by
/// a well-behaved `ValueCreator`.
pub type Setter<V> = Arc<dyn Fn(V) + Send + Sync>;

/// Equivalent of [`AsyncMapConsumer::consume_after_keys_ready`] handed to a
/// `ValueCreator` so it can express data dependencies on the same map,
/// propagating this key's failure function and recording the dependency edge
/// for cycle detection.
pub type SubCaller<K, V> = Arc<dyn Fn(Vec<K>, Consumer<V>, Logger) + Send + Sync>;

/// `(ts, setter, logger, sub_caller, key) -> ()`. Produces the value for
/// `key` by calling `setter` exactly once, or fails the node via `logger`
/// with `fatal = true`.
pub type ValueCreator<K, V> =
    Arc<dyn Fn(Arc<TaskSystem>, Setter<V>, Logger, SubCaller<K, V>, K) + Send + Sync>;

struct NodeRef<K: MapKey, V>(Arc<AsyncMapNode<K, V>>);

impl<K: MapKey, V> Clone for NodeRef<K, V> {
    fn clone(&self) -> Self {
        Self(Arc::clone(&self.0))
    }
}
impl<K: MapKey, V> PartialEq for NodeRef<K, V> {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}
impl<K: MapKey, V> Eq for NodeRef<K, V> {}
impl<K: MapKey, V> Hash for NodeRef<K, V> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        (Arc::as_ptr(&self.0) as usize).hash(state)
    }
}

type NodeRequests<K, V> = HashMap<K, HashSet<NodeRef<K, V>>>;

/// Memoised, continuation-driven key -> value computation (§4.3). Wraps an
/// [`AsyncMap`] with `ConsumeAfterKeysReady` semantics: a `ValueCreator` is
/// queued at most once per key, and consumers are queued once every
/// dependency value is ready.
///
/// Callers that need `sub_caller` (i.e. whose `ValueCreator` recurses into
/// this same map) must hold the consumer behind an `Arc` — every method that
/// can construct a continuation closure therefore takes `self: &Arc<Self>`.
pub struct AsyncMapConsumer<K: MapKey, V: MapValue> {
    value_creator: ValueCreator<K, V>,
    map: AsyncMap<K, V>,
    requests: Mutex<HashMap<ThreadId, NodeRequests<K, V>>>,
}

impl<K: MapKey, V: MapValue> AsyncMapConsumer<K, V> {
    pub fn new(value_creator: ValueCreator<K, V>, jobs: usize) -> Arc<Self> {
        Arc::new(Self {
            value_creator,
            map: AsyncMap::new(jobs),
            requests: Mutex::new(HashMap::new()),
        })
    }

    pub fn consume_after_keys_ready(
        self: &Arc<Self>,
        ts: &Arc<TaskSystem>,
        keys: Vec<K>,
        consumer: Consumer<V>,
        logger: Logger,
        fail: Option<FailureFn>,
    ) {
        self.consume_inner(ts, None, keys, consumer, logger, fail);
    }

    pub fn pending_keys(&self) -> Vec<K> {
        self.map.pending_keys()
    }

    /// Schedules per-shard clear tasks onto `ts` (§4.2 `Clear`).
    pub fn clear(self: &Arc<Self>, ts: &Arc<TaskSystem>) {
        for idx in 0..self.map.num_shards() {
            let this = Arc::clone(self);
            ts.queue_task(move || this.map.clear_shard(idx));
        }
    }

    /// DFS over the per-thread "consumer key -> requested dependency node"
    /// graph recorded while the map was in flight; returns the first cycle
    /// found as an ordered key list whose last element repeats the first.
    pub fn detect_cycle(&self) -> Option<Vec<K>> {
        let requests = self.pending_requests();
        let mut calls: Vec<K> = Vec::new();
        let mut known: HashSet<K> = HashSet::new();
        let callers: Vec<K> = requests.keys().cloned().collect();
        for caller in &callers {
            if Self::detect_cycle_for_caller(&mut calls, &mut known, &requests, caller) {
                return Some(calls);
            }
        }
        None
    }

    fn detect_cycle_for_caller(
        calls: &mut Vec<K>,
        known: &mut HashSet<K>,
        requests: &NodeRequests<K, V>,
        caller: &K,
    ) -> bool {
        if known.contains(caller) {
            return false;
        }
        if let Some(deps) = requests.get(caller) {
            calls.push(caller.clone());
            for dep in deps {
                let dep_key = dep.0.key().clone();
                if calls.contains(&dep_key) {
                    calls.push(dep_key);
                    return true;
                }
                if Self::detect_cycle_for_caller(calls, known, requests, &dep_key) {
                    return true;
                }
            }
            calls.pop();
        }
        known.insert(caller.clone());
        false
    }

    fn consume_inner(
        self: &Arc<Self>,
        ts: &Arc<TaskSystem>,
        consumer_id: Option<K>,
        keys: Vec<K>,
        consumer: Consumer<V>,
        logger: Logger,
        fail: Option<FailureFn>,
    ) {
        if keys.is_empty() {
            ts.queue_task(move || consumer(Vec::new()));
            return;
        }

        let nodes: Vec<Arc<AsyncMapNode<K, V>>> = keys
            .iter()
            .map(|key| self.ensure_value_present(ts, key, &logger))
            .collect();
        let first = Arc::clone(&nodes[0]);
        if let Some(f) = &fail {
            let f = Arc::clone(f);
            first.queue_on_failure(ts, move || f());
        }

        let nodes = Arc::new(nodes);
        let this = Arc::clone(self);
        let ts2 = Arc::clone(ts);
        let cid_for_closure = consumer_id.clone();
        let nodes_for_closure = Arc::clone(&nodes);
        let fail_for_closure = fail.clone();
        let queued = first.add_or_queue_awaiting_task(ts, move || {
            this.queue_when_all_ready(&ts2, cid_for_closure, consumer, fail_for_closure, nodes_for_closure, 1);
        });
        if let Some(cid) = consumer_id {
            if !queued {
                self.record_node_request(cid, first);
            }
        }
    }

    fn queue_when_all_ready(
        self: &Arc<Self>,
        ts: &Arc<TaskSystem>,
        consumer_id: Option<K>,
        consumer: Consumer<V>,
        fail: Option<FailureFn>,
        nodes: Arc<Vec<Arc<AsyncMapNode<K, V>>>>,
        pos: usize,
    ) {
        if pos == nodes.len() {
            ts.queue_task(move || {
                let values = nodes.iter().map(|n| n.get_value()).collect::<Vec<_>>();
                consumer(values);
            });
            return;
        }
        let current = Arc::clone(&nodes[pos]);
        if let Some(f) = &fail {
            let f = Arc::clone(f);
            current.queue_on_failure(ts, move || f());
        }
        let this = Arc::clone(self);
        let ts2 = Arc::clone(ts);
        let cid_for_closure = consumer_id.clone();
        let nodes2 = Arc::clone(&nodes);
        let fail2 = fail.clone();
        let queued = current.add_or_queue_awaiting_task(ts, move || {
            this.queue_when_all_ready(&ts2, cid_for_closure, consumer, fail2, nodes2, pos + 1);
        });
        if let Some(cid) = consumer_id {
            if !queued {
                self.record_node_request(cid, current);
            }
        }
    }

    fn ensure_value_present(
        self: &Arc<Self>,
        ts: &Arc<TaskSystem>,
        key: &K,
        logger: &Logger,
    ) -> Arc<AsyncMapNode<K, V>> {
        let node = self.map.get_or_create_node(key);

        let node_for_setter = Arc::clone(&node);
        let ts_for_setter = Arc::clone(ts);
        let setter: Setter<V> = Arc::new(move |value: V| {
            node_for_setter.set_and_queue_awaiting_tasks(&ts_for_setter, value);
        });

        let node_for_fail = Arc::clone(&node);
        let ts_for_fail = Arc::clone(ts);
        let fail_fn: FailureFn = Arc::new(move || {
            node_for_fail.fail(&ts_for_fail);
        });

        let this = Arc::clone(self);
        let ts_for_sub = Arc::clone(ts);
        let key_for_sub = key.clone();
        let fail_fn_for_sub = Arc::clone(&fail_fn);
        let sub_caller: SubCaller<K, V> = Arc::new(move |keys: Vec<K>, consumer: Consumer<V>, logger: Logger| {
            this.consume_inner(
                &ts_for_sub,
                Some(key_for_sub.clone()),
                keys,
                consumer,
                logger,
                Some(Arc::clone(&fail_fn_for_sub)),
            );
        });

        let node_for_logger = Arc::clone(&node);
        let ts_for_logger = Arc::clone(ts);
        let logger_inner = Arc::clone(logger);
        let wrapped_logger: Logger = Arc::new(move |msg: &str, fatal: bool| {
            if fatal {
                node_for_logger.fail(&ts_for_logger);
            }
            logger_inner(msg, fatal);
        });

        let value_creator = Arc::clone(&self.value_creator);
        let ts_for_task = Arc::clone(ts);
        let key_owned = key.clone();
        node.queue_once_processing_task(ts, move || {
            value_creator(ts_for_task, setter, wrapped_logger, sub_caller, key_owned);
        });
        node
    }

    fn record_node_request(&self, consumer_id: K, node: Arc<AsyncMapNode<K, V>>) {
        let tid = std::thread::current().id();
        let mut guard = self.requests.lock();
        let per_thread = guard.entry(tid).or_default();
        per_thread
            .entry(consumer_id)
            .or_default()
            .insert(NodeRef(node));
    }

    fn pending_requests(&self) -> NodeRequests<K, V> {
        let mut result: NodeRequests<K, V> = HashMap::new();
        let guard = self.requests.lock();
        for per_thread in guard.values() {
            for (consumer, deps) in per_thread {
                let entry = result.entry(consumer.clone()).or_default();
                for dep in deps {
                    if !dep.0.is_ready() {
                        entry.insert(dep.clone());
                    }
                }
            }
        }
        result
    }
}
