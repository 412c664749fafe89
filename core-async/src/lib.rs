//! Executor surface used by the sync engine.
//!
//! Engine crates go through this crate rather than naming Tokio directly;
//! only the primitives a sync run needs are exposed: spawning the background
//! run, the cancellation token that stops it between batches, the locks that
//! guard shared state and the timer that drives scheduled syncs.
//!
//! ```rust
//! use core_async::sync::CancellationToken;
//! use core_async::time::{sleep, Duration};
//!
//! async fn fetch_or_stop(token: CancellationToken) -> Option<u32> {
//!     core_async::select! {
//!         biased;
//!         _ = token.cancelled() => None,
//!         _ = sleep(Duration::from_millis(10)) => Some(1),
//!     }
//! }
//! ```

pub mod runtime;
pub mod sync;
pub mod task;
pub mod time;

pub use task::spawn;

pub use tokio::select;
