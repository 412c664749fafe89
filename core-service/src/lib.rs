//! Core service façade and bootstrap helpers.
//!
//! This crate wires host-provided bridge implementations (HTTP, filesystem,
//! settings, secret encryption) into the sync engine and exposes the handful
//! of operations a host UI needs: start, cancel, test sync, progress and the
//! load-time hook. Desktop apps typically enable the `desktop-shims` feature
//! (which depends on `bridge-desktop`); other hosts inject their own bridges
//! through [`CoreConfig::builder`].

pub mod error;

pub use error::{Result, ServiceError};

use std::sync::Arc;

use core_runtime::config::CoreConfig;
use core_runtime::events::{
    CoreEvent, EventBus, EventStream, Receiver, RecvError, SyncEvent, DEFAULT_EVENT_BUFFER_SIZE,
};
use core_runtime::logging::redact_if_sensitive;
use core_sync::{
    ProgressSnapshot, RemoteExportClient, SyncCoordinator, SyncError, SyncOutcome,
    SyncPreferences, SyncRunId, SyncScheduler, SyncStateRepository, TestSyncOutcome,
};
use tracing::{debug, info, warn};

/// Primary façade exposed to host applications.
pub struct SyncService {
    config: Arc<CoreConfig>,
    event_bus: Arc<EventBus>,
    coordinator: Arc<SyncCoordinator>,
    scheduler: Arc<SyncScheduler>,
}

impl SyncService {
    /// Create a service talking to the export API through the configured
    /// HTTP bridge.
    pub fn new(config: CoreConfig) -> Self {
        let config = Arc::new(config);
        let event_bus = Arc::new(EventBus::new(DEFAULT_EVENT_BUFFER_SIZE));
        let coordinator = Arc::new(SyncCoordinator::from_config(
            Arc::clone(&config),
            Arc::clone(&event_bus),
        ));
        Self::assemble(config, event_bus, coordinator)
    }

    /// Create a service with an explicit export client and state repository.
    pub fn with_parts(
        config: CoreConfig,
        client: Arc<dyn RemoteExportClient>,
        repository: Arc<dyn SyncStateRepository>,
    ) -> Self {
        let config = Arc::new(config);
        let event_bus = Arc::new(EventBus::new(DEFAULT_EVENT_BUFFER_SIZE));
        let coordinator = Arc::new(SyncCoordinator::new(
            Arc::clone(&config),
            client,
            repository,
            Arc::clone(&event_bus),
        ));
        Self::assemble(config, event_bus, coordinator)
    }

    fn assemble(
        config: Arc<CoreConfig>,
        event_bus: Arc<EventBus>,
        coordinator: Arc<SyncCoordinator>,
    ) -> Self {
        let scheduler = Arc::new(SyncScheduler::new(Arc::clone(&coordinator)));
        Self {
            config,
            event_bus,
            coordinator,
            scheduler,
        }
    }

    pub fn config(&self) -> &CoreConfig {
        &self.config
    }

    pub fn coordinator(&self) -> Arc<SyncCoordinator> {
        Arc::clone(&self.coordinator)
    }

    /// Subscribe to engine events.
    pub fn subscribe(&self) -> EventStream {
        EventStream::new(self.event_bus.subscribe())
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Host load hook: restores state, kicks off a sync when the user opted
    /// in, and arms the schedule once a first sync has completed.
    pub async fn on_load(&self) -> Result<()> {
        let state = self.coordinator.load_state().await?;
        debug!(
            first_sync_done = state.has_completed_first_sync,
            resumable = state.progress.is_resumable(),
            "Sync state loaded"
        );

        if state.has_completed_first_sync && state.preferences.trigger_on_load {
            match self.coordinator.start().await {
                Ok(run_id) => info!("Sync on load started run {}", run_id),
                Err(SyncError::AlreadyInProgress) => debug!("Sync already running on load"),
                Err(SyncError::NotConfigured) => info!("No API key configured, skipping sync on load"),
                Err(e) => return Err(e.into()),
            }
        }

        self.refresh_schedule().await;
        Ok(())
    }

    /// Stops the schedule and any run in flight.
    pub async fn shutdown(&self) {
        self.scheduler.stop().await;
        self.coordinator.cancel().await;
        self.coordinator.cancel_test_sync().await;
    }

    async fn refresh_schedule(&self) {
        arm_schedule(&self.coordinator, &self.scheduler).await;
    }

    // ========================================================================
    // Operations
    // ========================================================================

    /// Starts a background sync. When no schedule is armed yet, it is armed
    /// once this run completes.
    pub async fn start(&self) -> Result<SyncRunId> {
        let unscheduled = !self.scheduler.is_scheduled().await;
        let events = self.event_bus.subscribe();
        let run_id = self.coordinator.start().await?;

        if unscheduled {
            let coordinator = Arc::clone(&self.coordinator);
            let scheduler = Arc::clone(&self.scheduler);
            core_async::task::spawn(async move {
                if run_completed(events, &coordinator, run_id).await {
                    arm_schedule(&coordinator, &scheduler).await;
                }
            });
        }
        Ok(run_id)
    }

    /// Runs a sync to completion, then arms the schedule if this was the
    /// first one.
    pub async fn sync_now(&self) -> Result<SyncOutcome> {
        let outcome = self.coordinator.sync_now().await?;
        if !self.scheduler.is_scheduled().await {
            self.refresh_schedule().await;
        }
        Ok(outcome)
    }

    pub async fn cancel(&self) -> bool {
        self.coordinator.cancel().await
    }

    pub async fn run_test_sync(&self) -> Result<TestSyncOutcome> {
        Ok(self.coordinator.run_test_sync().await?)
    }

    pub async fn progress(&self) -> ProgressSnapshot {
        self.coordinator.progress().await
    }

    pub async fn preferences(&self) -> SyncPreferences {
        self.coordinator.state().await.preferences
    }

    /// Applies `update` to the preferences, persists them and re-arms the
    /// schedule.
    pub async fn update_preferences<F>(&self, update: F) -> Result<SyncPreferences>
    where
        F: FnOnce(&mut SyncPreferences),
    {
        let preferences = self.coordinator.update_preferences(update).await?;
        self.refresh_schedule().await;
        Ok(preferences)
    }

    /// Stores (encrypted) or removes the API key.
    pub async fn set_api_key(&self, api_key: Option<String>) -> Result<()> {
        match api_key.as_deref() {
            Some(key) => info!(api_key = %redact_if_sensitive("api_key", key), "API key updated"),
            None => info!("API key removed"),
        }
        Ok(self.coordinator.set_api_key(api_key).await?)
    }

    pub async fn clear_base_override(&self, path: &str) -> Result<bool> {
        Ok(self.coordinator.clear_base_override(path).await?)
    }

    pub async fn is_scheduled(&self) -> bool {
        self.scheduler.is_scheduled().await
    }
}

/// Schedules syncs once a first sync has completed.
async fn arm_schedule(coordinator: &SyncCoordinator, scheduler: &SyncScheduler) {
    let state = coordinator.state().await;
    if state.has_completed_first_sync {
        scheduler.configure(state.preferences.frequency_minutes).await;
    } else {
        scheduler.stop().await;
    }
}

/// Waits for the end of `run_id`. True when it completed.
async fn run_completed(
    mut events: Receiver<CoreEvent>,
    coordinator: &SyncCoordinator,
    run_id: SyncRunId,
) -> bool {
    let run_id = run_id.to_string();
    loop {
        match events.recv().await {
            Ok(CoreEvent::Sync(SyncEvent::Completed { run_id: id, .. })) if id == run_id => {
                return true
            }
            Ok(CoreEvent::Sync(
                SyncEvent::Failed { run_id: id, .. } | SyncEvent::Cancelled { run_id: id, .. },
            )) if id == run_id => return false,
            Ok(_) => {}
            Err(RecvError::Lagged(skipped)) => {
                warn!(skipped, "Missed sync events while waiting for run {}", run_id);
                if !coordinator.is_syncing().await {
                    return coordinator.state().await.has_completed_first_sync;
                }
            }
            Err(RecvError::Closed) => return false,
        }
    }
}

/// Builds a service over the desktop bridges for the vault at `vault_root`.
#[cfg(feature = "desktop-shims")]
pub fn bootstrap_desktop(vault_root: impl Into<std::path::PathBuf>) -> Result<SyncService> {
    let config = CoreConfig::builder().vault_root(vault_root).build()?;
    Ok(SyncService::new(config))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bridge_desktop::{AesGcmSecretCipher, ReqwestHttpClient, SqliteSettingsStore, TokioFileSystem};
    use bridge_traits::storage::{SecretCipher, SettingsStore};
    use core_sync::{BatchRequest, BinaryBundle, ExportMetadata, SettingsSyncStateRepository};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    /// Export API with nothing to export.
    #[derive(Default)]
    struct IdleClient {
        metadata_calls: AtomicUsize,
    }

    #[async_trait]
    impl RemoteExportClient for IdleClient {
        async fn fetch_metadata(
            &self,
            _api_key: &str,
            _updated_after: Option<&str>,
            _only_edited: bool,
        ) -> core_sync::Result<ExportMetadata> {
            self.metadata_calls.fetch_add(1, Ordering::SeqCst);
            Ok(ExportMetadata::empty())
        }

        async fn fetch_batch(&self, _api_key: &str, _request: &BatchRequest) -> core_sync::Result<BinaryBundle> {
            Err(SyncError::Network("unexpected batch request".into()))
        }

        async fn fetch_base_assets(&self, _api_key: &str) -> core_sync::Result<BinaryBundle> {
            Err(SyncError::Network("unexpected base asset request".into()))
        }
    }

    async fn service(
        dir: &TempDir,
        client: Arc<IdleClient>,
        first_sync_done: bool,
        frequency_minutes: u32,
    ) -> SyncService {
        let store: Arc<dyn SettingsStore> = Arc::new(SqliteSettingsStore::in_memory().await.unwrap());
        let cipher: Arc<dyn SecretCipher> = Arc::new(AesGcmSecretCipher::with_iterations(10));
        let repository = Arc::new(SettingsSyncStateRepository::new(
            store.clone(),
            cipher.clone(),
            "vault",
        ));

        let mut state = repository.load().await.unwrap();
        state.has_completed_first_sync = first_sync_done;
        state.preferences.frequency_minutes = frequency_minutes;
        repository
            .set_api_key(&mut state, Some("key".into()))
            .await
            .unwrap();

        let config = CoreConfig::builder()
            .vault_root(dir.path())
            .vault_id("vault")
            .http_client(Arc::new(ReqwestHttpClient::new().unwrap()))
            .file_system(Arc::new(TokioFileSystem))
            .settings_store(store)
            .secret_cipher(cipher)
            .build()
            .unwrap();
        SyncService::with_parts(config, client, repository)
    }

    #[tokio::test]
    async fn test_on_load_before_first_sync_does_nothing() {
        let dir = TempDir::new().unwrap();
        let client = Arc::new(IdleClient::default());

        let service = service(&dir, client.clone(), false, 30).await;
        service.on_load().await.unwrap();

        assert!(!service.progress().await.is_syncing);
        assert!(!service.is_scheduled().await);
        assert_eq!(client.metadata_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_on_load_after_first_sync_syncs_and_schedules() {
        let dir = TempDir::new().unwrap();
        let client = Arc::new(IdleClient::default());

        let service = service(&dir, client.clone(), true, 30).await;
        service.on_load().await.unwrap();
        assert!(service.is_scheduled().await);

        for _ in 0..500 {
            if !service.progress().await.is_syncing {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        let progress = service.progress().await;
        assert!(!progress.is_syncing);
        assert!(progress.last_sync_timestamp.is_some());
        assert_eq!(client.metadata_calls.load(Ordering::SeqCst), 1);
        service.shutdown().await;
    }

    #[tokio::test]
    async fn test_background_first_sync_arms_schedule() {
        let dir = TempDir::new().unwrap();
        let client = Arc::new(IdleClient::default());
        let service = service(&dir, client.clone(), false, 30).await;
        service.coordinator().load_state().await.unwrap();
        assert!(!service.is_scheduled().await);

        service.start().await.unwrap();

        for _ in 0..500 {
            if service.is_scheduled().await {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        assert!(service.is_scheduled().await);
        assert!(service.progress().await.has_completed_first_sync);
        assert_eq!(client.metadata_calls.load(Ordering::SeqCst), 1);
        service.shutdown().await;
    }

    #[tokio::test]
    async fn test_zero_frequency_disables_schedule() {
        let dir = TempDir::new().unwrap();
        let service = service(&dir, Arc::new(IdleClient::default()), true, 15).await;
        service.coordinator().load_state().await.unwrap();
        service
            .update_preferences(|p| p.trigger_on_load = false)
            .await
            .unwrap();
        service.on_load().await.unwrap();
        assert!(service.is_scheduled().await);

        let preferences = service
            .update_preferences(|p| p.frequency_minutes = 0)
            .await
            .unwrap();
        assert_eq!(preferences.frequency_minutes, 0);
        assert!(!service.is_scheduled().await);
    }
}
