//! # Sync Run State Machine
//!
//! Tracks the phase of the run in flight with validated transitions.
//!
//! ```text
//! Idle → Validating → FetchingMetadata → ProcessingBatches(i) → Finalizing → Idle
//!                           ↑    (reset)        │
//!                           └───────────────────┘
//! any in-flight phase → Cancelled | Failed → Idle
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

use crate::{Result, SyncError};

// ============================================================================
// ID Types
// ============================================================================

/// Identifier of one sync run, used to correlate events and log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SyncRunId(Uuid);

impl SyncRunId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_str(&self) -> String {
        self.0.to_string()
    }
}

impl Default for SyncRunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SyncRunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for SyncRunId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

impl From<Uuid> for SyncRunId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

// ============================================================================
// Phase
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum SyncPhase {
    Idle,
    Validating,
    FetchingMetadata,
    ProcessingBatches { index: u32 },
    Finalizing,
    Cancelled,
    Failed,
}

impl SyncPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncPhase::Idle => "idle",
            SyncPhase::Validating => "validating",
            SyncPhase::FetchingMetadata => "fetching_metadata",
            SyncPhase::ProcessingBatches { .. } => "processing_batches",
            SyncPhase::Finalizing => "finalizing",
            SyncPhase::Cancelled => "cancelled",
            SyncPhase::Failed => "failed",
        }
    }

    /// True while a run holds the phase.
    pub fn is_active(&self) -> bool {
        !matches!(
            self,
            SyncPhase::Idle | SyncPhase::Cancelled | SyncPhase::Failed
        )
    }

    fn can_transition(&self, to: SyncPhase) -> bool {
        use SyncPhase::*;
        match (*self, to) {
            (Idle, Validating) => true,
            (Validating, FetchingMetadata) => true,

            // Resumed runs enter at the persisted batch index.
            (FetchingMetadata, ProcessingBatches { .. }) => true,
            (FetchingMetadata, Finalizing) => true,
            (FetchingMetadata, FetchingMetadata) => true,

            (ProcessingBatches { index: from }, ProcessingBatches { index: to }) => to == from + 1,
            (ProcessingBatches { .. }, Finalizing) => true,
            (ProcessingBatches { .. }, FetchingMetadata) => true,

            (Finalizing, Idle) => true,

            (from, Cancelled | Failed) => from.is_active(),
            (Cancelled | Failed, Idle) => true,

            _ => false,
        }
    }

    /// Validated transition.
    pub fn transition(self, to: SyncPhase) -> Result<SyncPhase> {
        if !self.can_transition(to) {
            return Err(SyncError::InvalidStateTransition {
                from: self.to_string(),
                to: to.to_string(),
            });
        }
        Ok(to)
    }
}

impl std::fmt::Display for SyncPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyncPhase::ProcessingBatches { index } => write!(f, "processing_batches({})", index),
            other => f.write_str(other.as_str()),
        }
    }
}

// ============================================================================
// Snapshot
// ============================================================================

/// Read-only view of the engine for status displays.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    pub phase: SyncPhase,
    pub run_id: Option<String>,
    pub is_syncing: bool,
    pub is_test_syncing: bool,
    pub batch_index: u32,
    pub total_batches: u32,
    pub batch_episode_count: u32,
    pub batch_snip_count: u64,
    pub last_sync_timestamp: Option<DateTime<Utc>>,
    pub last_sync_episode_count: u64,
    pub last_sync_snip_count: u64,
    pub has_completed_first_sync: bool,
}

impl ProgressSnapshot {
    /// `batch i/n` label for the batch currently being processed.
    pub fn batch_label(&self) -> Option<String> {
        match self.phase {
            SyncPhase::ProcessingBatches { index } => {
                Some(format!("batch {}/{}", index + 1, self.total_batches))
            }
            _ => None,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_ids_are_unique_and_parse() {
        let a = SyncRunId::new();
        let b = SyncRunId::new();
        assert_ne!(a, b);
        assert_eq!(a.as_str().parse::<SyncRunId>().unwrap(), a);
        assert!("nope".parse::<SyncRunId>().is_err());
    }

    #[test]
    fn test_happy_path_transitions() {
        let phase = SyncPhase::Idle
            .transition(SyncPhase::Validating)
            .and_then(|p| p.transition(SyncPhase::FetchingMetadata))
            .and_then(|p| p.transition(SyncPhase::ProcessingBatches { index: 2 }))
            .and_then(|p| p.transition(SyncPhase::ProcessingBatches { index: 3 }))
            .and_then(|p| p.transition(SyncPhase::Finalizing))
            .and_then(|p| p.transition(SyncPhase::Idle))
            .unwrap();
        assert_eq!(phase, SyncPhase::Idle);
    }

    #[test]
    fn test_batches_cannot_skip() {
        let err = SyncPhase::ProcessingBatches { index: 0 }
            .transition(SyncPhase::ProcessingBatches { index: 2 })
            .unwrap_err();
        assert!(matches!(err, SyncError::InvalidStateTransition { .. }));
    }

    #[test]
    fn test_reset_returns_to_metadata() {
        assert!(SyncPhase::ProcessingBatches { index: 4 }
            .transition(SyncPhase::FetchingMetadata)
            .is_ok());
    }

    #[test]
    fn test_absorbing_states() {
        assert!(SyncPhase::FetchingMetadata.transition(SyncPhase::Cancelled).is_ok());
        assert!(SyncPhase::Finalizing.transition(SyncPhase::Failed).is_ok());
        assert!(SyncPhase::Idle.transition(SyncPhase::Failed).is_err());
        assert!(SyncPhase::Cancelled.transition(SyncPhase::Validating).is_err());
        assert!(SyncPhase::Failed.transition(SyncPhase::Idle).is_ok());
    }

    #[test]
    fn test_batch_label() {
        let snapshot = ProgressSnapshot {
            phase: SyncPhase::ProcessingBatches { index: 1 },
            run_id: None,
            is_syncing: true,
            is_test_syncing: false,
            batch_index: 1,
            total_batches: 3,
            batch_episode_count: 10,
            batch_snip_count: 20,
            last_sync_timestamp: None,
            last_sync_episode_count: 0,
            last_sync_snip_count: 0,
            has_completed_first_sync: false,
        };
        assert_eq!(snapshot.batch_label().as_deref(), Some("batch 2/3"));
    }
}
