//! # Export Sync Module
//!
//! Incremental, resumable export of podcast episodes and their snips into a
//! notes vault.
//!
//! ## Overview
//!
//! This module manages the lifecycle of export runs, including:
//! - Fetching the export plan and each batch archive from the export API
//! - Unpacking archives into per-episode renditions
//! - Deciding between regeneration and append-merge for every document
//! - Remembering what was written so local edits are never discarded
//! - Resuming an interrupted run exactly where it stopped
//!
//! ## Components
//!
//! - **Fingerprint Store** (`fingerprint`): Hashes of written files and the sticky append-only flags
//! - **Remote Export Client** (`client`): Metadata, batch and base-asset requests
//! - **Bundle Unpacker** (`bundle`): Archive entries to structured episode content
//! - **Reconciler** (`reconciler`): Per-document write decision
//! - **Base Assets** (`base_assets`): Support files with manual-override detection
//! - **Sync Coordinator** (`coordinator`): The batch state machine
//! - **Test Sync** (`test_sync`): Disposable sample export into `<target>-TEST`
//! - **Scheduler** (`scheduler`): Periodic invocation respecting the single-flight guard

pub mod base_assets;
pub mod bundle;
pub mod client;
pub mod coordinator;
pub mod debug;
pub mod error;
pub mod fingerprint;
pub mod frontmatter;
pub mod job;
pub mod naming;
pub mod reconciler;
pub mod scheduler;
pub mod snapshot;
pub mod state;
pub mod test_sync;
pub mod types;

pub use base_assets::{merge_base_assets, BaseAssetOutcome};
pub use bundle::{unpack, unpack_assets, EpisodeContent, UnpackedAssets, UnpackedBatch};
pub use client::{BatchRequest, HttpExportClient, RemoteExportClient};
pub use coordinator::{SyncCoordinator, SyncOutcome};
pub use error::{Result, SyncError};
pub use fingerprint::{content_hash, FingerprintStore};
pub use job::{ProgressSnapshot, SyncPhase, SyncRunId};
pub use reconciler::{ReconcileRequest, Reconciler, WriteMode, WriteOutcome};
pub use scheduler::SyncScheduler;
pub use snapshot::MetadataSnapshot;
pub use state::{
    ExportCursor, SettingsSyncStateRepository, SyncPreferences, SyncProgress, SyncState,
    SyncStateRepository,
};
pub use test_sync::TestSyncOutcome;
pub use types::{
    Batch, BinaryBundle, BundleMetadata, EpisodeData, EpisodeSummary, ExportMetadata,
    ExportTemplates, ShowData, SyncStats,
};
