//! Locks and cooperative cancellation.
//!
//! [`CancellationToken`] is checked between batches and raced against every
//! network call of a sync run.

pub use tokio::sync::{Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};
pub use tokio_util::sync::CancellationToken;
