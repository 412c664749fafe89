//! Disposable dry run against `<target_dir>-TEST`.
//!
//! Samples a few episodes that have snips, exports them and the base assets
//! with [`WriteMode::Overwrite`]. Nothing learned here reaches the persisted
//! state: no fingerprints, no progress, no cursor.

use core_async::sync::CancellationToken;
use core_runtime::events::{CoreEvent, TestSyncEvent};
use rand::seq::IndexedRandom;
use tracing::{info, instrument, warn};

use crate::base_assets::merge_base_assets;
use crate::bundle::unpack_assets;
use crate::client::BatchRequest;
use crate::coordinator::{cancellable, target_dir_of, ActiveSync, SyncCoordinator};
use crate::job::SyncRunId;
use crate::reconciler::WriteMode;
use crate::state::SyncState;
use crate::types::{Batch, EpisodeSummary};
use crate::{Result, SyncError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestSyncOutcome {
    /// Vault-relative directory the sample was written to.
    pub target_dir: String,
    pub requested_episodes: u32,
    /// Episodes present in the returned bundle; the backend may skip some.
    pub received_episodes: u32,
    pub snip_count: u64,
}

impl SyncCoordinator {
    /// Runs a test sync on the caller's task.
    #[instrument(skip(self))]
    pub async fn run_test_sync(&self) -> Result<TestSyncOutcome> {
        let token = {
            let mut active = self.active_test_sync.lock().await;
            if active.is_some() {
                return Err(SyncError::AlreadyInProgress);
            }
            if self.state.read().await.api_key().is_none() {
                return Err(SyncError::NotConfigured);
            }
            let token = CancellationToken::new();
            *active = Some(ActiveSync {
                run_id: SyncRunId::new(),
                cancellation_token: token.clone(),
            });
            token
        };

        let scratch = self.state.read().await.clone();
        let result = self.execute_test_sync(scratch, &token).await;
        *self.active_test_sync.lock().await = None;

        match &result {
            Ok(outcome) => {
                info!(
                    requested = outcome.requested_episodes,
                    received = outcome.received_episodes,
                    "Test sync completed into {}",
                    outcome.target_dir
                );
                self.emit_test(TestSyncEvent::Completed {
                    target_dir: outcome.target_dir.clone(),
                    requested_episodes: outcome.requested_episodes,
                    received_episodes: outcome.received_episodes,
                });
            }
            Err(e) => {
                warn!("Test sync failed: {}", e);
                self.emit_test(TestSyncEvent::Failed {
                    message: e.to_string(),
                });
            }
        }
        result
    }

    /// Stops the test sync in flight, if any.
    pub async fn cancel_test_sync(&self) -> bool {
        match self.active_test_sync.lock().await.as_ref() {
            Some(active) => {
                active.cancellation_token.cancel();
                true
            }
            None => false,
        }
    }

    async fn execute_test_sync(
        &self,
        mut scratch: SyncState,
        token: &CancellationToken,
    ) -> Result<TestSyncOutcome> {
        let api_key = scratch.api_key().ok_or(SyncError::NotConfigured)?.to_string();
        let test_dir = format!("{}-TEST", target_dir_of(&scratch.preferences));
        let fs = self.config.file_system.as_ref();
        let debug = self.debug_archives(&scratch);

        self.emit_test(TestSyncEvent::Started {
            target_dir: test_dir.clone(),
        });

        let root = self.config.vault_root.join(&test_dir);
        if fs.exists(&root).await? {
            info!(target_dir = %test_dir, "Removing previous test output");
            fs.delete_dir_all(&root).await?;
        }

        let only_edited = scratch.preferences.only_edited_snips;
        let metadata = cancellable(token, self.client.fetch_metadata(&api_key, None, only_edited)).await?;
        debug.save_metadata("test_metadata.json", &metadata).await;

        let candidates: Vec<&EpisodeSummary> = metadata
            .episodes()
            .filter(|episode| episode.total_snip_count > 0)
            .collect();
        let sample: Vec<EpisodeSummary> = {
            let mut rng = rand::rng();
            candidates
                .choose_multiple(&mut rng, self.config.test_sample_size)
                .map(|episode| (*episode).clone())
                .collect()
        };

        if sample.is_empty() {
            info!("No episodes with snips to test");
            return Ok(TestSyncOutcome {
                target_dir: test_dir,
                requested_episodes: 0,
                received_episodes: 0,
                snip_count: 0,
            });
        }

        let batch = Batch {
            index: Some(0),
            episodes: sample,
        };
        info!(episodes = ?batch.episode_ids(), "Test syncing sampled episodes");

        let request = BatchRequest::new(
            batch.episode_ids(),
            &scratch.preferences.templates(),
            None,
            only_edited,
        );
        let bundle = cancellable(token, self.client.fetch_batch(&api_key, &request)).await?;
        debug
            .save_bundle(
                &format!("test_export_{}.zip", self.config.clock.unix_timestamp_millis()),
                &bundle,
            )
            .await;

        match cancellable(token, self.client.fetch_base_assets(&api_key)).await {
            Ok(assets) => {
                let assets = unpack_assets(&assets)?;
                merge_base_assets(
                    fs,
                    &self.config.vault_root,
                    &mut scratch.fingerprints,
                    &test_dir,
                    &assets,
                    WriteMode::Overwrite,
                )
                .await?;
            }
            Err(e) if e.is_cancelled() => return Err(e),
            Err(e) => warn!("Base asset fetch failed during test sync: {}", e),
        }

        let applied = self
            .apply_bundle(&mut scratch, &bundle, Some(&batch), &test_dir, WriteMode::Overwrite, false)
            .await?;

        let requested = batch.episodes.len() as u32;
        if applied.received_episodes < requested {
            info!(
                skipped = requested - applied.received_episodes,
                "Backend skipped some sampled episodes"
            );
        }

        Ok(TestSyncOutcome {
            target_dir: test_dir,
            requested_episodes: requested,
            received_episodes: applied.received_episodes,
            snip_count: applied.stats.snip_count,
        })
    }

    fn emit_test(&self, event: TestSyncEvent) {
        self.event_bus.emit(CoreEvent::TestSync(event)).ok();
    }
}
