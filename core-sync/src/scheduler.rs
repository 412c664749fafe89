//! Timer-driven sync invocation.
//!
//! Each tick calls [`SyncCoordinator::start`]; a tick that lands while a run
//! is in flight is skipped, never queued.

use core_async::sync::{CancellationToken, Mutex};
use core_async::time::{interval, Duration, MissedTickBehavior};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::coordinator::SyncCoordinator;
use crate::SyncError;

pub struct SyncScheduler {
    coordinator: Arc<SyncCoordinator>,
    current: Mutex<Option<CancellationToken>>,
}

impl SyncScheduler {
    pub fn new(coordinator: Arc<SyncCoordinator>) -> Self {
        Self {
            coordinator,
            current: Mutex::new(None),
        }
    }

    /// Replaces the running timer. `0` minutes disables scheduling.
    pub async fn configure(&self, frequency_minutes: u32) {
        if frequency_minutes == 0 {
            self.stop().await;
            info!("Scheduled sync disabled");
            return;
        }
        self.schedule_every(Duration::from_secs(u64::from(frequency_minutes) * 60))
            .await;
    }

    /// Replaces the running timer with one firing every `period`.
    pub async fn schedule_every(&self, period: Duration) {
        let mut current = self.current.lock().await;
        if let Some(previous) = current.take() {
            previous.cancel();
        }

        let token = CancellationToken::new();
        let coordinator = Arc::clone(&self.coordinator);
        let stop = token.clone();

        core_async::task::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            // The first tick completes immediately.
            ticker.tick().await;

            loop {
                core_async::select! {
                    _ = stop.cancelled() => break,
                    _ = ticker.tick() => {}
                }
                match coordinator.start().await {
                    Ok(run_id) => debug!("Scheduled sync started run {}", run_id),
                    Err(SyncError::AlreadyInProgress) => {
                        info!("Sync already in progress, skipping scheduled run")
                    }
                    Err(e) => warn!("Scheduled sync could not start: {}", e),
                }
            }
            debug!("Sync schedule stopped");
        });

        info!(period_secs = period.as_secs(), "Scheduled sync configured");
        *current = Some(token);
    }

    pub async fn stop(&self) {
        if let Some(token) = self.current.lock().await.take() {
            token.cancel();
        }
    }

    pub async fn is_scheduled(&self) -> bool {
        self.current.lock().await.is_some()
    }
}

impl Drop for SyncScheduler {
    fn drop(&mut self) {
        if let Ok(mut current) = self.current.try_lock() {
            if let Some(token) = current.take() {
                token.cancel();
            }
        }
    }
}
