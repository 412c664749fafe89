//! Background tasks.

pub use tokio::task::{JoinError, JoinHandle};

/// Spawns `future` onto the current runtime.
///
/// Sync runs, scheduler timers and log forwarding all go through here.
pub fn spawn<F>(future: F) -> JoinHandle<F::Output>
where
    F: std::future::Future + Send + 'static,
    F::Output: Send + 'static,
{
    tokio::task::spawn(future)
}
