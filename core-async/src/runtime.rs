//! Blocking entry point for callers outside any runtime.

use std::future::Future;
use std::io;

pub use tokio::runtime::Handle;

/// Drives `future` on a throwaway current-thread runtime.
///
/// Must not be called from inside a runtime; check [`Handle::try_current`]
/// first.
pub fn block_on<F: Future>(future: F) -> io::Result<F::Output> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    Ok(runtime.block_on(future))
}
