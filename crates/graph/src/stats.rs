use std::sync::atomic::{AtomicUsize, Ordering};

/// Running totals over one executor's lifetime (§4.7 step 6: "reports how
/// many actions were queued, served from cache, and actually executed").
#[derive(Debug, Default)]
pub struct ExecutionStats {
    queued: AtomicUsize,
    cached: AtomicUsize,
    executed: AtomicUsize,
    flaky: AtomicUsize,
}

impl ExecutionStats {
    pub fn queued(&self) -> usize {
        self.queued.load(Ordering::SeqCst)
    }

    pub fn cached(&self) -> usize {
        self.cached.load(Ordering::SeqCst)
    }

    pub fn executed(&self) -> usize {
        self.executed.load(Ordering::SeqCst)
    }

    pub fn flaky(&self) -> usize {
        self.flaky.load(Ordering::SeqCst)
    }

    pub(crate) fn record_queued(&self) {
        self.queued.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn record_outcome(&self, from_cache: bool) {
        if from_cache {
            self.cached.fetch_add(1, Ordering::SeqCst);
        } else {
            self.executed.fetch_add(1, Ordering::SeqCst);
        }
    }

    pub(crate) fn record_flaky(&self) {
        self.flaky.fetch_add(1, Ordering::SeqCst);
    }
}
