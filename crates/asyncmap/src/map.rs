use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use parking_lot::RwLock;

use bb_task::TaskSystem;

use crate::node::AsyncMapNode;
use crate::MapKey;

const SCALING_FACTOR: usize = 2;

fn compute_width(jobs: usize) -> usize {
    let jobs = if jobs == 0 { num_cpus::get().max(1) } else { jobs };
    jobs * SCALING_FACTOR + 1
}

/// Sharded `Key -> AsyncMapNode<Value>` table (§4.2). Reads take a shared
/// lock on the key's shard; only inserting a never-seen key takes the
/// exclusive lock. Node pointers (`Arc`s) are stable for the map's lifetime.
pub struct AsyncMap<K: MapKey, V> {
    width: usize,
    shards: Vec<RwLock<HashMap<K, Arc<AsyncMapNode<K, V>>>>>,
}

impl<K: MapKey, V> AsyncMap<K, V> {
    pub fn new(jobs: usize) -> Self {
        let width = compute_width(jobs);
        let mut shards = Vec::with_capacity(width);
        for _ in 0..width {
            shards.push(RwLock::new(HashMap::new()));
        }
        Self { width, shards }
    }

    fn shard_index(&self, key: &K) -> usize {
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        key.hash(&mut hasher);
        (hasher.finish() as usize) % self.width
    }

    pub fn get_or_create_node(&self, key: &K) -> Arc<AsyncMapNode<K, V>> {
        let idx = self.shard_index(key);
        {
            let shard = self.shards[idx].read();
            if let Some(node) = shard.get(key) {
                return Arc::clone(node);
            }
        }
        let mut shard = self.shards[idx].write();
        if let Some(node) = shard.get(key) {
            return Arc::clone(node);
        }
        let node = Arc::new(AsyncMapNode::new(key.clone()));
        shard.insert(key.clone(), Arc::clone(&node));
        node
    }

    pub fn pending_keys(&self) -> Vec<K> {
        let mut keys = Vec::new();
        for shard in &self.shards {
            let shard = shard.read();
            keys.extend(
                shard
                    .iter()
                    .filter(|(_, node)| !node.is_ready())
                    .map(|(k, _)| k.clone()),
            );
        }
        keys
    }

    pub fn num_shards(&self) -> usize {
        self.width
    }

    pub fn clear_shard(&self, idx: usize) {
        self.shards[idx].write().clear();
    }
}
