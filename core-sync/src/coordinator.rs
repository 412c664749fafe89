//! # Sync Coordinator
//!
//! Drives one incremental export run from metadata to finalization.
//!
//! ## Overview
//!
//! The `SyncCoordinator` owns the authoritative [`SyncState`] and coordinates:
//! - Fetching the export plan through a [`RemoteExportClient`]
//! - Saving that plan to the metadata snapshot side file
//! - Merging the base assets once per fresh plan
//! - Fetching, unpacking and reconciling every batch in order
//! - Persisting progress after each committed batch
//! - Emitting lifecycle events via `EventBus`
//!
//! ## Workflow
//!
//! 1. Reject the request if a run is in flight or no API key is configured
//! 2. Wipe fingerprints if the target directory vanished since the last run
//! 3. Load the plan from the snapshot (resuming) or fetch it (fresh)
//! 4. For each batch from the persisted index: fetch, unpack, reconcile, commit
//! 5. Move the high-water mark forward, delete the snapshot, record statistics
//!
//! A run that stops early (error, cancellation, crash) leaves `batch_index`
//! at the last committed batch; the next run resumes there from the snapshot.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use core_sync::SyncCoordinator;
//! use std::sync::Arc;
//!
//! let coordinator = Arc::new(SyncCoordinator::from_config(config, event_bus));
//! coordinator.load_state().await?;
//!
//! // Background run
//! let run_id = coordinator.start().await?;
//!
//! // Or inline
//! let outcome = coordinator.sync_now().await?;
//! ```

use crate::{
    base_assets::merge_base_assets,
    bundle::{unpack, unpack_assets},
    client::{BatchRequest, HttpExportClient, RemoteExportClient},
    debug::DebugArchives,
    job::{ProgressSnapshot, SyncPhase, SyncRunId},
    naming::{episode_target_path, normalize_vault_path},
    reconciler::{ReconcileRequest, Reconciler, WriteMode},
    snapshot::MetadataSnapshot,
    state::{
        ExportCursor, SettingsSyncStateRepository, SyncPreferences, SyncState,
        SyncStateRepository, DEFAULT_TARGET_DIR,
    },
    types::{Batch, BinaryBundle, BundleMetadata, ExportMetadata, SyncStats},
    Result, SyncError,
};
use core_async::sync::{CancellationToken, Mutex, RwLock};
use core_async::time::Instant;
use core_runtime::config::CoreConfig;
use core_runtime::events::{BaseAssetEvent, CoreEvent, EventBus, SyncEvent};
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};

/// How a sync run ended when it did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    Completed(SyncStats),
    /// Stopped on request; `committed_batches` were fully written.
    Cancelled { committed_batches: u32 },
}

/// Active run tracking
#[derive(Debug, Clone)]
pub(crate) struct ActiveSync {
    pub(crate) run_id: SyncRunId,
    pub(crate) cancellation_token: CancellationToken,
}

/// Result of applying one bundle to the vault.
#[derive(Debug, Clone, Default)]
pub(crate) struct AppliedBatch {
    pub(crate) stats: SyncStats,
    pub(crate) files_written: u32,
    pub(crate) received_episodes: u32,
    pub(crate) latest_update_ts: Option<String>,
}

/// Sync coordinator
///
/// Manages the lifecycle of sync runs. At most one incremental run and one
/// test run may be in flight at a time.
pub struct SyncCoordinator {
    pub(crate) config: Arc<CoreConfig>,
    pub(crate) client: Arc<dyn RemoteExportClient>,
    pub(crate) repository: Arc<dyn SyncStateRepository>,
    pub(crate) event_bus: Arc<EventBus>,
    pub(crate) state: Arc<RwLock<SyncState>>,
    pub(crate) phase: Arc<RwLock<SyncPhase>>,
    pub(crate) active_sync: Arc<Mutex<Option<ActiveSync>>>,
    pub(crate) active_test_sync: Arc<Mutex<Option<ActiveSync>>>,
    /// Override clears requested while a run holds its own copy of the
    /// fingerprints; folded into that copy on the next persist.
    pub(crate) pending_override_clears: Arc<Mutex<Vec<String>>>,
}

impl SyncCoordinator {
    /// Create a new sync coordinator
    ///
    /// # Arguments
    ///
    /// * `config` - Engine configuration and host bridges
    /// * `client` - Export API client
    /// * `repository` - Where [`SyncState`] is persisted
    /// * `event_bus` - Event bus for emitting sync progress events
    pub fn new(
        config: Arc<CoreConfig>,
        client: Arc<dyn RemoteExportClient>,
        repository: Arc<dyn SyncStateRepository>,
        event_bus: Arc<EventBus>,
    ) -> Self {
        Self {
            config,
            client,
            repository,
            event_bus,
            state: Arc::new(RwLock::new(SyncState::default())),
            phase: Arc::new(RwLock::new(SyncPhase::Idle)),
            active_sync: Arc::new(Mutex::new(None)),
            active_test_sync: Arc::new(Mutex::new(None)),
            pending_override_clears: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Wires the HTTP export client and the settings-backed state repository
    /// from the bridges in `config`.
    pub fn from_config(config: Arc<CoreConfig>, event_bus: Arc<EventBus>) -> Self {
        let client = Arc::new(HttpExportClient::new(
            config.http_client.clone(),
            config.api_base_url.clone(),
            config.request_timeout,
        ));
        let repository = Arc::new(SettingsSyncStateRepository::new(
            config.settings_store.clone(),
            config.secret_cipher.clone(),
            config.vault_id.clone(),
        ));
        Self::new(config, client, repository, event_bus)
    }

    /// Clone for background task (avoids Arc<Arc<...>>)
    pub(crate) fn clone_for_task(&self) -> Self {
        Self {
            config: Arc::clone(&self.config),
            client: Arc::clone(&self.client),
            repository: Arc::clone(&self.repository),
            event_bus: Arc::clone(&self.event_bus),
            state: Arc::clone(&self.state),
            phase: Arc::clone(&self.phase),
            active_sync: Arc::clone(&self.active_sync),
            active_test_sync: Arc::clone(&self.active_test_sync),
            pending_override_clears: Arc::clone(&self.pending_override_clears),
        }
    }

    // ========================================================================
    // State access
    // ========================================================================

    /// Replaces the in-memory state with the persisted one.
    pub async fn load_state(&self) -> Result<SyncState> {
        let loaded = self.repository.load().await?;
        *self.state.write().await = loaded.clone();
        Ok(loaded)
    }

    /// Copy of the current state.
    pub async fn state(&self) -> SyncState {
        self.state.read().await.clone()
    }

    pub async fn update_preferences<F>(&self, update: F) -> Result<SyncPreferences>
    where
        F: FnOnce(&mut SyncPreferences),
    {
        let mut state = self.state.write().await;
        update(&mut state.preferences);
        self.repository.save(&state).await?;
        Ok(state.preferences.clone())
    }

    /// Stores a new API key; `None` disconnects.
    pub async fn set_api_key(&self, api_key: Option<String>) -> Result<()> {
        let mut state = self.state.write().await;
        self.repository.set_api_key(&mut state, api_key).await
    }

    /// Lets the next base-asset sync overwrite `path` again.
    ///
    /// A clear made while a run is in flight is also applied to that run's
    /// fingerprints, so its later persists do not restore the override.
    pub async fn clear_base_override(&self, path: &str) -> Result<bool> {
        if self.is_syncing().await {
            self.pending_override_clears
                .lock()
                .await
                .push(path.to_string());
        }

        let mut state = self.state.write().await;
        let cleared = state.fingerprints.clear_base_override(path);
        if cleared {
            info!(path, "Cleared base asset override");
            self.repository.save(&state).await?;
        }
        Ok(cleared)
    }

    pub async fn is_syncing(&self) -> bool {
        self.active_sync.lock().await.is_some()
    }

    pub async fn is_test_syncing(&self) -> bool {
        self.active_test_sync.lock().await.is_some()
    }

    /// Read-only view for status displays.
    pub async fn progress(&self) -> ProgressSnapshot {
        let run_id = self
            .active_sync
            .lock()
            .await
            .as_ref()
            .map(|active| active.run_id.to_string());
        let is_test_syncing = self.is_test_syncing().await;
        let phase = *self.phase.read().await;
        let state = self.state.read().await;

        ProgressSnapshot {
            phase,
            is_syncing: run_id.is_some(),
            run_id,
            is_test_syncing,
            batch_index: state.progress.batch_index,
            total_batches: state.progress.total_batches,
            batch_episode_count: state.progress.batch_episode_count,
            batch_snip_count: state.progress.batch_snip_count,
            last_sync_timestamp: state.last_sync_timestamp,
            last_sync_episode_count: state.last_sync_episode_count,
            last_sync_snip_count: state.last_sync_snip_count,
            has_completed_first_sync: state.has_completed_first_sync,
        }
    }

    // ========================================================================
    // Run control
    // ========================================================================

    /// Runs a sync to completion on the caller's task.
    #[instrument(skip(self))]
    pub async fn sync_now(&self) -> Result<SyncOutcome> {
        let (run_id, token) = self.begin_run().await?;
        self.run_guarded(run_id, token).await
    }

    /// Starts a sync in the background and returns its run id.
    #[instrument(skip(self))]
    pub async fn start(&self) -> Result<SyncRunId> {
        let (run_id, token) = self.begin_run().await?;

        let coordinator = self.clone_for_task();
        core_async::task::spawn(async move {
            if let Err(e) = coordinator.run_guarded(run_id, token).await {
                error!("Sync run {} failed: {}", run_id, e);
            }
        });

        info!("Started sync run {}", run_id);
        Ok(run_id)
    }

    /// Raises the cancellation signal of the run in flight. Returns false
    /// when nothing was running.
    #[instrument(skip(self))]
    pub async fn cancel(&self) -> bool {
        let active = self.active_sync.lock().await.clone();
        match active {
            Some(sync) => {
                sync.cancellation_token.cancel();
                info!("Cancellation requested for sync run {}", sync.run_id);
                true
            }
            None => false,
        }
    }

    /// Validating: acquires the single-flight guard without touching state.
    async fn begin_run(&self) -> Result<(SyncRunId, CancellationToken)> {
        let mut active = self.active_sync.lock().await;
        if active.is_some() {
            return Err(SyncError::AlreadyInProgress);
        }
        if self.state.read().await.api_key().is_none() {
            return Err(SyncError::NotConfigured);
        }

        let run_id = SyncRunId::new();
        let cancellation_token = CancellationToken::new();
        *active = Some(ActiveSync {
            run_id,
            cancellation_token: cancellation_token.clone(),
        });
        *self.phase.write().await = SyncPhase::Validating;
        Ok((run_id, cancellation_token))
    }

    #[instrument(skip(self, cancellation_token), fields(run_id = %run_id))]
    async fn run_guarded(
        &self,
        run_id: SyncRunId,
        cancellation_token: CancellationToken,
    ) -> Result<SyncOutcome> {
        let started = Instant::now();
        let resuming = self.state.read().await.progress.is_resumable();
        self.emit(SyncEvent::Started {
            run_id: run_id.to_string(),
            resuming,
        });

        let result = self.execute_sync(run_id, &cancellation_token).await;
        let committed_batches = self.state.read().await.progress.batch_index;

        let outcome = match result {
            Ok(stats) => {
                self.set_phase(SyncPhase::Idle).await;
                info!(
                    episodes = stats.episode_count,
                    snips = stats.snip_count,
                    "Sync run {} completed",
                    run_id
                );
                self.emit(SyncEvent::Completed {
                    run_id: run_id.to_string(),
                    episode_count: stats.episode_count,
                    snip_count: stats.snip_count,
                    duration_ms: started.elapsed().as_millis() as u64,
                });
                Ok(SyncOutcome::Completed(stats))
            }
            Err(e) if e.is_cancelled() => {
                self.set_phase(SyncPhase::Cancelled).await;
                self.set_phase(SyncPhase::Idle).await;
                info!(committed_batches, "Sync run {} cancelled", run_id);
                self.emit(SyncEvent::Cancelled {
                    run_id: run_id.to_string(),
                    committed_batches,
                });
                Ok(SyncOutcome::Cancelled { committed_batches })
            }
            Err(e) => {
                self.set_phase(SyncPhase::Failed).await;
                self.set_phase(SyncPhase::Idle).await;
                error!(committed_batches, "Sync run {} failed: {}", run_id, e);
                self.emit(SyncEvent::Failed {
                    run_id: run_id.to_string(),
                    message: e.to_string(),
                    committed_batches,
                });
                Err(e)
            }
        };

        *self.active_sync.lock().await = None;
        outcome
    }

    /// Runs passes until one finishes, repairing self-healing conditions up
    /// to `max_auto_restarts` times.
    async fn execute_sync(&self, run_id: SyncRunId, token: &CancellationToken) -> Result<SyncStats> {
        let mut run = self.state.read().await.clone();
        let debug = self.debug_archives(&run);
        let mut restarts = 0;

        loop {
            match self.execute_pass(run_id, token, &mut run, &debug).await {
                Err(e) if e.is_self_healing() && restarts < self.config.max_auto_restarts => {
                    restarts += 1;
                    warn!(restarts, "Resetting sync state: {}", e);
                    self.reset_run(run_id, &mut run, &e).await?;
                }
                other => return other,
            }
        }
    }

    async fn reset_run(&self, run_id: SyncRunId, run: &mut SyncState, cause: &SyncError) -> Result<()> {
        match cause {
            SyncError::MissingTargetDirectory => run.reset_for_fresh_start(),
            _ => run.progress.clear(),
        }
        self.snapshot().delete().await?;
        self.persist(run).await?;
        self.emit(SyncEvent::Reset {
            run_id: run_id.to_string(),
            reason: cause.to_string(),
        });
        Ok(())
    }

    async fn execute_pass(
        &self,
        run_id: SyncRunId,
        token: &CancellationToken,
        run: &mut SyncState,
        debug: &DebugArchives,
    ) -> Result<SyncStats> {
        let target_dir = target_dir_of(&run.preferences);
        self.ensure_target_present(run, &target_dir).await?;
        self.set_phase(SyncPhase::FetchingMetadata).await;

        let snapshot = self.snapshot();
        let from_snapshot = run.progress.is_resumable();
        let metadata = if from_snapshot {
            let metadata = snapshot.load().await?.ok_or(SyncError::StaleResumeState)?;
            if metadata.batch_count != run.progress.total_batches {
                warn!(
                    snapshot = metadata.batch_count,
                    progress = run.progress.total_batches,
                    "Snapshot batch count disagrees with persisted progress"
                );
                return Err(SyncError::StaleResumeState);
            }
            info!(
                batch_index = run.progress.batch_index,
                total_batches = metadata.batch_count,
                "Resuming export from snapshot"
            );
            metadata
        } else {
            self.fetch_plan(token, run, &target_dir, debug).await?
        };

        let total_batches = metadata.batch_count;
        let start_batch = run.progress.batch_index;
        self.emit(SyncEvent::MetadataReady {
            run_id: run_id.to_string(),
            total_batches,
            start_batch,
            from_snapshot,
        });

        let updated_after = run
            .progress
            .export_cursor_token
            .as_ref()
            .and_then(|cursor| cursor.updated_after.clone());

        for index in start_batch..total_batches {
            if token.is_cancelled() {
                return Err(SyncError::Cancelled);
            }
            self.ensure_target_present(run, &target_dir).await?;

            let batch = metadata
                .batch(index)
                .ok_or_else(|| SyncError::Serialization(format!("Batch {} missing from plan", index)))?;
            self.set_phase(SyncPhase::ProcessingBatches { index }).await;

            run.progress.batch_episode_count = batch.episodes.len() as u32;
            run.progress.batch_snip_count = batch.snip_count();
            self.persist(run).await?;
            info!(
                episodes = batch.episodes.len(),
                snips = batch.snip_count(),
                "Processing batch {}/{}",
                index + 1,
                total_batches
            );
            self.emit(SyncEvent::BatchStarted {
                run_id: run_id.to_string(),
                batch_index: index,
                total_batches,
                episode_count: batch.episodes.len() as u32,
                snip_count: batch.snip_count(),
            });

            let request = BatchRequest::new(
                batch.episode_ids(),
                &run.preferences.templates(),
                updated_after.clone(),
                run.preferences.only_edited_snips,
            );
            let bundle = self.fetch_batch(token, run, &request).await?;
            debug
                .save_bundle(
                    &format!("batch_{}_{}.zip", index, self.config.clock.unix_timestamp_millis()),
                    &bundle,
                )
                .await;

            let applied = self
                .apply_bundle(run, &bundle, Some(batch), &target_dir, WriteMode::Merge, true)
                .await?;

            if let Some(ts) = applied.latest_update_ts.as_deref() {
                run.progress.raise_high_water(ts);
            }
            if let Some(ts) = batch.latest_update_ts() {
                run.progress.raise_high_water(ts);
            }
            run.progress.commit_batch(index, applied.stats);
            self.persist(run).await?;

            info!(files = applied.files_written, "Committed batch {}/{}", index + 1, total_batches);
            self.emit(SyncEvent::BatchCommitted {
                run_id: run_id.to_string(),
                batch_index: index,
                total_batches,
                files_written: applied.files_written,
            });
        }

        self.set_phase(SyncPhase::Finalizing).await;
        let stats = run.finalize(self.config.clock.now());
        snapshot.delete().await?;
        self.persist(run).await?;
        debug!(updated_after = ?run.updated_after, "Export cursor moved forward");
        Ok(stats)
    }

    /// Fresh plan: fetch, save the snapshot, reset progress, merge base assets.
    async fn fetch_plan(
        &self,
        token: &CancellationToken,
        run: &mut SyncState,
        target_dir: &str,
        debug: &DebugArchives,
    ) -> Result<ExportMetadata> {
        let api_key = run.api_key().ok_or(SyncError::NotConfigured)?.to_string();
        let updated_after = run.updated_after.clone();
        info!(updated_after = ?updated_after, "Fetching export metadata");

        let metadata = cancellable(
            token,
            self.client.fetch_metadata(
                &api_key,
                updated_after.as_deref(),
                run.preferences.only_edited_snips,
            ),
        )
        .await?;

        self.snapshot().save(&metadata).await?;
        debug.save_metadata("metadata.json", &metadata).await;

        run.progress.begin(ExportCursor { updated_after }, metadata.batch_count);
        self.persist(run).await?;

        if metadata.batch_count > 0 {
            match self.sync_base_assets(token, run, target_dir).await {
                Ok(()) => self.persist(run).await?,
                Err(e) if e.is_cancelled() => return Err(e),
                Err(e) => {
                    warn!("Base asset sync failed: {}", e);
                    self.emit_base(BaseAssetEvent::FetchFailed {
                        message: e.to_string(),
                    });
                }
            }
        } else {
            info!("Nothing to export");
        }

        Ok(metadata)
    }

    async fn fetch_batch(
        &self,
        token: &CancellationToken,
        run: &SyncState,
        request: &BatchRequest,
    ) -> Result<BinaryBundle> {
        let api_key = run.api_key().ok_or(SyncError::NotConfigured)?;
        cancellable(token, self.client.fetch_batch(api_key, request)).await
    }

    async fn sync_base_assets(
        &self,
        token: &CancellationToken,
        run: &mut SyncState,
        target_dir: &str,
    ) -> Result<()> {
        let api_key = run.api_key().ok_or(SyncError::NotConfigured)?.to_string();
        let bundle = cancellable(token, self.client.fetch_base_assets(&api_key)).await?;
        let assets = unpack_assets(&bundle)?;

        let outcome = merge_base_assets(
            self.config.file_system.as_ref(),
            &self.config.vault_root,
            &mut run.fingerprints,
            target_dir,
            &assets,
            WriteMode::Merge,
        )
        .await?;

        for path in &outcome.new_overrides {
            self.emit_base(BaseAssetEvent::OverrideDetected { path: path.clone() });
        }
        info!(
            written = outcome.written,
            skipped = outcome.skipped,
            purged = outcome.purged,
            "Base assets synced"
        );
        self.emit_base(BaseAssetEvent::Synced {
            written: outcome.written,
            skipped: outcome.skipped,
            purged: outcome.purged,
        });

        run.last_base_asset_sync_token = run
            .progress
            .export_cursor_token
            .as_ref()
            .and_then(|cursor| cursor.updated_after.clone());
        Ok(())
    }

    /// Unpacks `bundle` and reconciles every episode in it under `target_dir`.
    pub(crate) async fn apply_bundle(
        &self,
        run: &mut SyncState,
        bundle: &BinaryBundle,
        batch: Option<&Batch>,
        target_dir: &str,
        mode: WriteMode,
        persist_each: bool,
    ) -> Result<AppliedBatch> {
        let unpacked = unpack(bundle)?;
        let metadata = unpacked.metadata.unwrap_or_else(|| {
            warn!("Bundle has no metadata.json, falling back to episode ids for naming");
            BundleMetadata::default()
        });
        let file_name_template = run.preferences.episode_file_name_template.clone();
        let reconciler = Reconciler::new(self.config.file_system.as_ref(), &self.config.vault_root);

        let mut applied = AppliedBatch {
            latest_update_ts: metadata
                .latest_snip_update_ts
                .clone()
                .filter(|ts| !ts.is_empty()),
            ..Default::default()
        };

        for (episode_id, content) in &unpacked.episodes {
            let target_path = episode_target_path(
                target_dir,
                &metadata,
                episode_id,
                file_name_template.as_deref(),
            );
            let summary = batch.and_then(|b| b.episodes.iter().find(|e| &e.episode_id == episode_id));
            let episode = metadata.episodes_data.get(episode_id);

            let request = ReconcileRequest {
                episode_id: episode_id.clone(),
                target_path,
                full_content: content.full.clone(),
                append_content: content.append.clone(),
                total_snip_count: episode
                    .and_then(|e| e.total_snip_count)
                    .or(summary.map(|s| s.total_snip_count)),
            };
            let outcome = reconciler.reconcile(&mut run.fingerprints, &request, mode).await?;
            debug!(episode_id = %episode_id, path = %request.target_path, ?outcome, "Reconciled episode");

            applied.files_written += 1;
            applied.received_episodes += 1;
            let updated = episode
                .and_then(|e| e.updated_snip_count)
                .or(summary.map(|s| s.updated_snip_count))
                .unwrap_or(0);
            if updated > 0 {
                applied.stats += SyncStats {
                    episode_count: 1,
                    snip_count: updated,
                };
            }

            if persist_each {
                self.persist(run).await?;
            }
        }

        Ok(applied)
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    /// Target root missing while fingerprints exist means the folder was
    /// moved or deleted; stale hashes must not be trusted.
    async fn ensure_target_present(&self, run: &SyncState, target_dir: &str) -> Result<()> {
        if run.fingerprints.is_empty() {
            return Ok(());
        }
        let root = self.config.vault_root.join(target_dir);
        if self.config.file_system.exists(&root).await? {
            Ok(())
        } else {
            warn!(target_dir, "Target directory missing with fingerprints on record");
            Err(SyncError::MissingTargetDirectory)
        }
    }

    /// Saves the run's engine-owned fields, keeping preferences and the
    /// credential from the shared state.
    pub(crate) async fn persist(&self, run: &mut SyncState) -> Result<()> {
        let pending = std::mem::take(&mut *self.pending_override_clears.lock().await);
        for path in &pending {
            run.fingerprints.clear_base_override(path);
        }

        let mut shared = self.state.write().await;
        shared.absorb_engine_fields(run);
        self.repository.save(&shared).await
    }

    pub(crate) fn snapshot(&self) -> MetadataSnapshot {
        MetadataSnapshot::new(
            self.config.file_system.clone(),
            self.config.resolve(&self.config.snapshot_file),
        )
    }

    pub(crate) fn debug_archives(&self, state: &SyncState) -> DebugArchives {
        if state.preferences.save_debug_archives {
            DebugArchives::for_run(
                self.config.file_system.clone(),
                self.config.resolve(&self.config.debug_dir),
                self.config.clock.unix_timestamp_millis(),
            )
        } else {
            DebugArchives::disabled(self.config.file_system.clone())
        }
    }

    async fn set_phase(&self, to: SyncPhase) {
        let mut phase = self.phase.write().await;
        match phase.transition(to) {
            Ok(next) => *phase = next,
            Err(e) => {
                warn!("{}", e);
                *phase = to;
            }
        }
    }

    fn emit(&self, event: SyncEvent) {
        self.event_bus.emit(CoreEvent::Sync(event)).ok();
    }

    pub(crate) fn emit_base(&self, event: BaseAssetEvent) {
        self.event_bus.emit(CoreEvent::BaseAssets(event)).ok();
    }
}

/// Vault-relative target directory, never empty.
pub(crate) fn target_dir_of(preferences: &SyncPreferences) -> String {
    let dir = normalize_vault_path(&preferences.target_dir);
    if dir.is_empty() {
        DEFAULT_TARGET_DIR.to_string()
    } else {
        dir
    }
}

/// Races `future` against the cancellation signal.
pub(crate) async fn cancellable<T, F>(token: &CancellationToken, future: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    core_async::select! {
        biased;
        _ = token.cancelled() => Err(SyncError::Cancelled),
        result = future => result,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_target_dir_falls_back_to_default() {
        let mut preferences = SyncPreferences::default();
        preferences.target_dir = "/".into();
        assert_eq!(target_dir_of(&preferences), "Snipd");

        preferences.target_dir = "Notes\\Podcasts/".into();
        assert_eq!(target_dir_of(&preferences), "Notes/Podcasts");
    }

    #[tokio::test]
    async fn test_cancellable_prefers_cancellation() {
        let token = CancellationToken::new();
        token.cancel();
        let result: Result<u32> = cancellable(&token, async { Ok(1) }).await;
        assert!(matches!(result, Err(SyncError::Cancelled)));
    }

    #[tokio::test]
    async fn test_cancellable_passes_result_through() {
        let token = CancellationToken::new();
        let result: Result<u32> = cancellable(&token, async { Ok(7) }).await;
        assert_eq!(result.unwrap(), 7);
    }
}
