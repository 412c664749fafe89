//! # Engine events
//!
//! Progress and outcomes of sync runs, test syncs and base-asset merges,
//! broadcast over a `tokio::sync::broadcast` channel. Host adapters such as a
//! status bar item or a notice popup subscribe and render; they never read
//! engine state directly.
//!
//! ```rust
//! use core_runtime::events::{CoreEvent, EventBus, SyncEvent};
//!
//! # #[tokio::main]
//! # async fn main() {
//! let bus = EventBus::new(16);
//! let mut rx = bus.subscribe();
//!
//! bus.emit(CoreEvent::Sync(SyncEvent::BatchStarted {
//!     run_id: "run-1".to_string(),
//!     batch_index: 0,
//!     total_batches: 3,
//!     episode_count: 20,
//!     snip_count: 57,
//! }))
//! .ok();
//!
//! assert_eq!(rx.recv().await.unwrap().description(), "Processing batch");
//! # }
//! ```
//!
//! Events are advisory. `emit` fails when nobody listens and the engine
//! ignores that; a slow subscriber sees `RecvError::Lagged` and keeps going.

use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::broadcast;

pub use tokio::sync::broadcast::error::{RecvError, SendError};
pub use tokio::sync::broadcast::Receiver;

/// Default buffer size for the event bus channel.
pub const DEFAULT_EVENT_BUFFER_SIZE: usize = 100;

// ============================================================================
// Core Event Types
// ============================================================================

/// Top-level event published on the bus.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "payload")]
pub enum CoreEvent {
    /// Incremental sync lifecycle
    Sync(SyncEvent),
    /// Disposable test sync lifecycle
    TestSync(TestSyncEvent),
    /// Base-asset merge results
    BaseAssets(BaseAssetEvent),
}

impl CoreEvent {
    /// Returns a human-readable description of the event.
    pub fn description(&self) -> &str {
        match self {
            CoreEvent::Sync(e) => e.description(),
            CoreEvent::TestSync(e) => e.description(),
            CoreEvent::BaseAssets(e) => e.description(),
        }
    }

    /// Returns the severity level of the event.
    pub fn severity(&self) -> EventSeverity {
        match self {
            CoreEvent::Sync(SyncEvent::Failed { .. })
            | CoreEvent::TestSync(TestSyncEvent::Failed { .. }) => EventSeverity::Error,
            CoreEvent::Sync(SyncEvent::Reset { .. })
            | CoreEvent::BaseAssets(BaseAssetEvent::FetchFailed { .. })
            | CoreEvent::BaseAssets(BaseAssetEvent::OverrideDetected { .. }) => {
                EventSeverity::Warning
            }
            CoreEvent::Sync(SyncEvent::Completed { .. })
            | CoreEvent::Sync(SyncEvent::Cancelled { .. })
            | CoreEvent::TestSync(TestSyncEvent::Completed { .. }) => EventSeverity::Info,
            _ => EventSeverity::Debug,
        }
    }
}

/// Event severity levels for filtering and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventSeverity {
    Debug,
    Info,
    Warning,
    Error,
}

// ============================================================================
// Sync Events
// ============================================================================

/// Lifecycle of one incremental sync run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum SyncEvent {
    /// A run acquired the guard and began validating.
    Started {
        run_id: String,
        /// True when the run continues a previously interrupted export.
        resuming: bool,
    },
    /// The export plan is known (freshly fetched or read from the snapshot).
    MetadataReady {
        run_id: String,
        total_batches: u32,
        /// Batch the run starts from.
        start_batch: u32,
        from_snapshot: bool,
    },
    /// A batch is about to be fetched.
    BatchStarted {
        run_id: String,
        batch_index: u32,
        total_batches: u32,
        episode_count: u32,
        snip_count: u64,
    },
    /// A batch's writes are on disk and progress was persisted.
    BatchCommitted {
        run_id: String,
        batch_index: u32,
        total_batches: u32,
        files_written: u32,
    },
    /// Persisted state was wiped and the run restarted from scratch.
    Reset { run_id: String, reason: String },
    /// Run finished and the high-water mark moved forward.
    Completed {
        run_id: String,
        episode_count: u64,
        snip_count: u64,
        duration_ms: u64,
    },
    /// Run aborted; progress stays at the last committed batch.
    Failed {
        run_id: String,
        message: String,
        committed_batches: u32,
    },
    /// Run stopped on request; progress stays at the last committed batch.
    Cancelled {
        run_id: String,
        committed_batches: u32,
    },
}

impl SyncEvent {
    fn description(&self) -> &str {
        match self {
            SyncEvent::Started { .. } => "Sync started",
            SyncEvent::MetadataReady { .. } => "Export metadata ready",
            SyncEvent::BatchStarted { .. } => "Processing batch",
            SyncEvent::BatchCommitted { .. } => "Batch committed",
            SyncEvent::Reset { .. } => "Sync state reset",
            SyncEvent::Completed { .. } => "Sync completed successfully",
            SyncEvent::Failed { .. } => "Sync failed",
            SyncEvent::Cancelled { .. } => "Sync cancelled",
        }
    }
}

// ============================================================================
// Test Sync Events
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum TestSyncEvent {
    Started {
        target_dir: String,
    },
    Completed {
        target_dir: String,
        requested_episodes: u32,
        received_episodes: u32,
    },
    Failed {
        message: String,
    },
}

impl TestSyncEvent {
    fn description(&self) -> &str {
        match self {
            TestSyncEvent::Started { .. } => "Test sync started",
            TestSyncEvent::Completed { .. } => "Test sync completed",
            TestSyncEvent::Failed { .. } => "Test sync failed",
        }
    }
}

// ============================================================================
// Base Asset Events
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum BaseAssetEvent {
    Synced {
        written: u32,
        skipped: u32,
        purged: u32,
    },
    /// A locally modified asset will no longer be overwritten.
    OverrideDetected {
        path: String,
    },
    FetchFailed {
        message: String,
    },
}

impl BaseAssetEvent {
    fn description(&self) -> &str {
        match self {
            BaseAssetEvent::Synced { .. } => "Base assets synced",
            BaseAssetEvent::OverrideDetected { .. } => "Base asset modified locally",
            BaseAssetEvent::FetchFailed { .. } => "Base asset fetch failed",
        }
    }
}

// ============================================================================
// Bus
// ============================================================================

/// Fan-out channel for [`CoreEvent`]s. Clones share the channel.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<CoreEvent>,
}

impl EventBus {
    /// A subscriber more than `capacity` events behind gets `Lagged`.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Number of subscribers reached, or an error when there are none.
    pub fn emit(&self, event: CoreEvent) -> Result<usize, SendError<CoreEvent>> {
        self.sender.send(event)
    }

    /// Receives events emitted from now on.
    pub fn subscribe(&self) -> Receiver<CoreEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_BUFFER_SIZE)
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EventBus({} subscribers)", self.subscriber_count())
    }
}

type EventFilter = Box<dyn Fn(&CoreEvent) -> bool + Send + Sync>;

/// Subscription with an optional predicate, as handed to host adapters.
///
/// ```rust
/// use core_runtime::events::{CoreEvent, EventBus, EventSeverity, EventStream};
///
/// let bus = EventBus::default();
/// let notices = EventStream::new(bus.subscribe())
///     .filter(|event| event.severity() >= EventSeverity::Warning);
/// ```
pub struct EventStream {
    receiver: Receiver<CoreEvent>,
    filter: Option<EventFilter>,
}

impl EventStream {
    pub fn new(receiver: Receiver<CoreEvent>) -> Self {
        Self {
            receiver,
            filter: None,
        }
    }

    pub fn filter<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&CoreEvent) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Box::new(predicate));
        self
    }

    fn wanted(&self, event: &CoreEvent) -> bool {
        self.filter.as_ref().map_or(true, |keep| keep(event))
    }

    /// Next event passing the filter. `Lagged(n)` reports `n` skipped
    /// events; `Closed` means the engine is gone.
    pub async fn recv(&mut self) -> Result<CoreEvent, RecvError> {
        loop {
            let event = self.receiver.recv().await?;
            if self.wanted(&event) {
                return Ok(event);
            }
        }
    }

    /// Next buffered event passing the filter, or `None` when drained.
    pub fn try_recv(&mut self) -> Option<Result<CoreEvent, RecvError>> {
        use broadcast::error::TryRecvError;

        loop {
            match self.receiver.try_recv() {
                Ok(event) if self.wanted(&event) => return Some(Ok(event)),
                Ok(_) => continue,
                Err(TryRecvError::Empty) => return None,
                Err(TryRecvError::Lagged(n)) => return Some(Err(RecvError::Lagged(n))),
                Err(TryRecvError::Closed) => return Some(Err(RecvError::Closed)),
            }
        }
    }
}

impl fmt::Debug for EventStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventStream")
            .field("filtered", &self.filter.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn committed(batch_index: u32) -> CoreEvent {
        CoreEvent::Sync(SyncEvent::BatchCommitted {
            run_id: "run-1".to_string(),
            batch_index,
            total_batches: 3,
            files_written: 4,
        })
    }

    #[test]
    fn test_emit_without_listeners_is_error() {
        let bus = EventBus::new(10);
        assert_eq!(bus.subscriber_count(), 0);
        assert!(bus.emit(committed(0)).is_err());
    }

    #[tokio::test]
    async fn test_multiple_subscribers_receive_same_event() {
        let bus = EventBus::new(10);
        let mut sub1 = bus.subscribe();
        let mut sub2 = bus.subscribe();

        let event = CoreEvent::Sync(SyncEvent::Started {
            run_id: "run-1".to_string(),
            resuming: true,
        });

        assert_eq!(bus.emit(event.clone()).unwrap(), 2);
        assert_eq!(sub1.recv().await.unwrap(), event);
        assert_eq!(sub2.recv().await.unwrap(), event);
    }

    #[tokio::test]
    async fn test_event_stream_with_filter() {
        let bus = EventBus::new(10);
        let mut stream = EventStream::new(bus.subscribe())
            .filter(|event| matches!(event, CoreEvent::BaseAssets(_)));

        bus.emit(committed(1)).ok();
        let asset_event = CoreEvent::BaseAssets(BaseAssetEvent::OverrideDetected {
            path: "Snipd/Snipd Home.md".to_string(),
        });
        bus.emit(asset_event.clone()).ok();

        assert_eq!(stream.recv().await.unwrap(), asset_event);
        assert!(stream.try_recv().is_none());
    }

    #[tokio::test]
    async fn test_lagged_subscriber() {
        let bus = EventBus::new(2);
        let mut sub = bus.subscribe();

        for i in 0..5 {
            bus.emit(committed(i)).ok();
        }

        assert!(matches!(sub.recv().await, Err(RecvError::Lagged(_))));
    }

    #[test]
    fn test_event_severity() {
        let failed = CoreEvent::Sync(SyncEvent::Failed {
            run_id: "run-1".to_string(),
            message: "HTTP 500".to_string(),
            committed_batches: 2,
        });
        assert_eq!(failed.severity(), EventSeverity::Error);

        let reset = CoreEvent::Sync(SyncEvent::Reset {
            run_id: "run-1".to_string(),
            reason: "target directory missing".to_string(),
        });
        assert_eq!(reset.severity(), EventSeverity::Warning);

        assert_eq!(committed(0).severity(), EventSeverity::Debug);
    }

    #[test]
    fn test_event_serialization() {
        let event = CoreEvent::TestSync(TestSyncEvent::Completed {
            target_dir: "Snipd-TEST".to_string(),
            requested_episodes: 5,
            received_episodes: 4,
        });

        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"type\":\"TestSync\""));
        assert!(json.contains("Snipd-TEST"));

        let back: CoreEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back, event);
    }

    #[test]
    fn test_severity_filter_keeps_notices_only() {
        let bus = EventBus::default();
        let mut notices = EventStream::new(bus.subscribe())
            .filter(|event| event.severity() >= EventSeverity::Warning);

        bus.emit(committed(0)).ok();
        bus.emit(CoreEvent::BaseAssets(BaseAssetEvent::FetchFailed {
            message: "HTTP 503".to_string(),
        }))
        .ok();
        bus.emit(committed(1)).ok();

        let first = notices.try_recv().unwrap().unwrap();
        assert_eq!(first.description(), "Base asset fetch failed");
        assert!(notices.try_recv().is_none());
    }
}
