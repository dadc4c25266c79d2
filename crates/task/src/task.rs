/// A type-erased, zero-argument unit of work.
///
/// Tasks are run at most once, by exactly one worker. A task that panics
/// takes down the worker thread that ran it; the pool does not catch panics
/// (see the crate-level docs).
pub struct Task(Box<dyn FnOnce() + Send + 'static>);

impl Task {
    pub fn new<F>(f: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self(Box::new(f))
    }

    pub fn run(self) {
        (self.0)()
    }
}

impl std::fmt::Debug for Task {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Task(..)")
    }
}
