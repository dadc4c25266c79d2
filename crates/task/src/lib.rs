//! Fixed-size worker pool and notification queues (C1).
//!
//! Every piece of work in the engine — map node evaluation, executor
//! dispatch, CAS I/O — eventually runs as a [`Task`] queued onto a
//! [`TaskSystem`]. There is exactly one task system per process; it is
//! constructed once during setup and threaded explicitly through the maps
//! and executor that use it (see the design notes in `SPEC_FULL.md` §9 on
//! avoiding hidden singletons).

mod notification_queue;
mod system;
mod task;

pub use notification_queue::{NotificationQueue, WaitableZeroCounter};
pub use system::TaskSystem;
pub use task::Task;
