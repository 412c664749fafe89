//! Timers.

pub use std::time::{Duration, Instant};
pub use tokio::time::{interval, sleep, timeout, Interval, MissedTickBehavior};
