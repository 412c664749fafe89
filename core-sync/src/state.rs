//! Persisted sync state and its repository.
//!
//! Everything the engine remembers between runs lives in one [`SyncState`]
//! that is stored as a single flat JSON document. The credential never
//! appears in that document in clear text.

use async_trait::async_trait;
use bridge_traits::storage::{SecretCipher, SettingsStore};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::fingerprint::FingerprintStore;
use crate::types::{ExportTemplates, SyncStats};

pub const DEFAULT_TARGET_DIR: &str = "Snipd";
pub const STATE_KEY: &str = "snip_sync.state";

/// User-facing preferences.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncPreferences {
    /// Vault-relative directory episode documents are written under.
    pub target_dir: String,
    /// Minutes between scheduled syncs; 0 disables the schedule.
    pub frequency_minutes: u32,
    pub trigger_on_load: bool,
    pub only_edited_snips: bool,
    pub save_debug_archives: bool,
    pub episode_template: Option<String>,
    pub snip_template: Option<String>,
    pub episode_file_name_template: Option<String>,
}

impl Default for SyncPreferences {
    fn default() -> Self {
        Self {
            target_dir: DEFAULT_TARGET_DIR.to_string(),
            frequency_minutes: 0,
            trigger_on_load: true,
            only_edited_snips: false,
            save_debug_archives: false,
            episode_template: None,
            snip_template: None,
            episode_file_name_template: None,
        }
    }
}

impl SyncPreferences {
    pub fn templates(&self) -> ExportTemplates {
        ExportTemplates {
            episode_template: self.episode_template.clone(),
            snip_template: self.snip_template.clone(),
        }
    }
}

/// Cursor a run was started with. Its presence marks a run in flight.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportCursor {
    pub updated_after: Option<String>,
}

/// Progress of the run in flight. `batch_index` only advances after a
/// batch's writes are on disk.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncProgress {
    pub export_cursor_token: Option<ExportCursor>,
    pub batch_index: u32,
    pub total_batches: u32,
    pub last_committed_update_ts: Option<String>,
    pub batch_episode_count: u32,
    pub batch_snip_count: u64,
    pub run_episode_count: u64,
    pub run_snip_count: u64,
}

impl SyncProgress {
    pub fn is_resumable(&self) -> bool {
        self.export_cursor_token.is_some()
    }

    pub fn begin(&mut self, cursor: ExportCursor, total_batches: u32) {
        *self = SyncProgress {
            export_cursor_token: Some(cursor),
            total_batches,
            ..Default::default()
        };
    }

    /// Raises the high-water mark; ISO-8601 strings order lexicographically.
    pub fn raise_high_water(&mut self, ts: &str) {
        if ts.is_empty() {
            return;
        }
        match &self.last_committed_update_ts {
            Some(current) if current.as_str() >= ts => {}
            _ => self.last_committed_update_ts = Some(ts.to_string()),
        }
    }

    pub fn commit_batch(&mut self, index: u32, stats: SyncStats) {
        self.batch_index = index + 1;
        self.run_episode_count += stats.episode_count;
        self.run_snip_count += stats.snip_count;
    }

    pub fn run_stats(&self) -> SyncStats {
        SyncStats {
            episode_count: self.run_episode_count,
            snip_count: self.run_snip_count,
        }
    }

    pub fn clear(&mut self) {
        *self = SyncProgress::default();
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncState {
    #[serde(flatten)]
    pub preferences: SyncPreferences,
    /// Decrypted credential; only ever held in memory.
    #[serde(skip)]
    pub api_key: Option<String>,
    pub encrypted_api_key: Option<String>,
    #[serde(flatten)]
    pub fingerprints: FingerprintStore,
    #[serde(flatten)]
    pub progress: SyncProgress,
    /// Cursor for the next fresh metadata fetch.
    pub updated_after: Option<String>,
    pub last_base_asset_sync_token: Option<String>,
    pub last_sync_timestamp: Option<DateTime<Utc>>,
    pub last_sync_episode_count: u64,
    pub last_sync_snip_count: u64,
    pub has_completed_first_sync: bool,
}

impl SyncState {
    pub fn api_key(&self) -> Option<&str> {
        self.api_key.as_deref().filter(|k| !k.is_empty())
    }

    /// Forgets everything learned from previous runs so the next run starts
    /// from an empty export cursor.
    pub fn reset_for_fresh_start(&mut self) {
        self.fingerprints.reset();
        self.progress.clear();
        self.updated_after = None;
    }

    /// Copies the fields a sync run owns from `run`. Preferences and the
    /// credential keep the values held by `self`.
    pub fn absorb_engine_fields(&mut self, run: &SyncState) {
        self.fingerprints = run.fingerprints.clone();
        self.progress = run.progress.clone();
        self.updated_after = run.updated_after.clone();
        self.last_base_asset_sync_token = run.last_base_asset_sync_token.clone();
        self.last_sync_timestamp = run.last_sync_timestamp;
        self.last_sync_episode_count = run.last_sync_episode_count;
        self.last_sync_snip_count = run.last_sync_snip_count;
        self.has_completed_first_sync = run.has_completed_first_sync;
    }

    /// Moves the high-water mark forward and records run statistics.
    pub fn finalize(&mut self, now: DateTime<Utc>) -> SyncStats {
        let stats = self.progress.run_stats();
        if let Some(ts) = self.progress.last_committed_update_ts.take() {
            self.updated_after = Some(ts);
        }
        self.progress.clear();
        self.last_sync_timestamp = Some(now);
        self.last_sync_episode_count = stats.episode_count;
        self.last_sync_snip_count = stats.snip_count;
        self.has_completed_first_sync = true;
        stats
    }
}

#[async_trait]
pub trait SyncStateRepository: Send + Sync {
    async fn load(&self) -> Result<SyncState>;

    async fn save(&self, state: &SyncState) -> Result<()>;

    /// Stores a new credential (encrypted) in `state`. `None` disconnects.
    async fn set_api_key(&self, state: &mut SyncState, api_key: Option<String>) -> Result<()>;
}

/// [`SyncStateRepository`] storing one JSON document under one settings key.
pub struct SettingsSyncStateRepository {
    store: Arc<dyn SettingsStore>,
    cipher: Arc<dyn SecretCipher>,
    vault_id: String,
    key: String,
}

impl SettingsSyncStateRepository {
    pub fn new(
        store: Arc<dyn SettingsStore>,
        cipher: Arc<dyn SecretCipher>,
        vault_id: impl Into<String>,
    ) -> Self {
        Self {
            store,
            cipher,
            vault_id: vault_id.into(),
            key: STATE_KEY.to_string(),
        }
    }

    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = key.into();
        self
    }
}

#[async_trait]
impl SyncStateRepository for SettingsSyncStateRepository {
    async fn load(&self) -> Result<SyncState> {
        let Some(raw) = self.store.get_string(&self.key).await? else {
            debug!(key = %self.key, "No persisted sync state, using defaults");
            return Ok(SyncState::default());
        };

        let mut document: serde_json::Value = serde_json::from_str(&raw)?;
        let legacy_key = document
            .as_object_mut()
            .and_then(|obj| obj.remove("api_key"))
            .and_then(|v| v.as_str().map(str::to_string))
            .filter(|k| !k.is_empty());

        let mut state: SyncState = serde_json::from_value(document)?;

        if let Some(blob) = state.encrypted_api_key.as_deref().filter(|b| !b.is_empty()) {
            match self.cipher.decrypt(blob, &self.vault_id).await {
                Ok(key) => state.api_key = Some(key),
                Err(e) => {
                    warn!(error = %e, "Failed to decrypt stored API key, treating as disconnected");
                    state.api_key = None;
                }
            }
        } else if let Some(plain) = legacy_key {
            info!("Migrating plaintext API key to encrypted storage");
            match self.cipher.encrypt(&plain, &self.vault_id).await {
                Ok(blob) => {
                    state.encrypted_api_key = Some(blob);
                    state.api_key = Some(plain);
                    self.save(&state).await?;
                }
                Err(e) => {
                    warn!(error = %e, "Failed to encrypt legacy API key");
                    state.api_key = Some(plain);
                }
            }
        }

        Ok(state)
    }

    async fn save(&self, state: &SyncState) -> Result<()> {
        let json = serde_json::to_string(state)?;
        self.store.set_string(&self.key, &json).await?;
        Ok(())
    }

    async fn set_api_key(&self, state: &mut SyncState, api_key: Option<String>) -> Result<()> {
        match api_key.filter(|k| !k.is_empty()) {
            Some(key) => {
                state.encrypted_api_key = Some(self.cipher.encrypt(&key, &self.vault_id).await?);
                state.api_key = Some(key);
            }
            None => {
                state.encrypted_api_key = None;
                state.api_key = None;
            }
        }
        self.save(state).await
    }
}
