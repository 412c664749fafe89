//! Durable copy of the export plan a run is working through.
//!
//! Written before the first batch is fetched and deleted when the run
//! finishes or is reset. A resumed run reads its plan from here so the batch
//! cursor keeps pointing into the same plan.

use bridge_traits::storage::FileSystemAccess;
use bytes::Bytes;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::error::{Result, SyncError};
use crate::types::ExportMetadata;

pub struct MetadataSnapshot {
    fs: Arc<dyn FileSystemAccess>,
    path: PathBuf,
}

impl MetadataSnapshot {
    pub fn new(fs: Arc<dyn FileSystemAccess>, path: PathBuf) -> Self {
        Self { fs, path }
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    pub async fn save(&self, metadata: &ExportMetadata) -> Result<()> {
        let json = serde_json::to_vec_pretty(metadata)?;
        self.fs.write_file(&self.path, Bytes::from(json)).await?;
        debug!(path = %self.path.display(), batches = metadata.batch_count, "Saved export plan snapshot");
        Ok(())
    }

    /// Returns `None` when no snapshot exists. A snapshot that cannot be
    /// parsed is [`SyncError::StaleResumeState`].
    pub async fn load(&self) -> Result<Option<ExportMetadata>> {
        let data = match self.fs.read_file(&self.path).await {
            Ok(data) => data,
            Err(e) if e.is_not_found() => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let parsed = serde_json::from_slice::<ExportMetadata>(&data)
            .map_err(SyncError::from)
            .and_then(ExportMetadata::normalized);
        match parsed {
            Ok(metadata) => Ok(Some(metadata)),
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Export plan snapshot is unreadable");
                Err(SyncError::StaleResumeState)
            }
        }
    }

    pub async fn delete(&self) -> Result<()> {
        if self.fs.exists(&self.path).await? {
            self.fs.delete_file(&self.path).await?;
            debug!(path = %self.path.display(), "Deleted export plan snapshot");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Batch, EpisodeSummary};
    use bridge_desktop::TokioFileSystem;
    use tempfile::TempDir;

    fn plan() -> ExportMetadata {
        ExportMetadata {
            batch_count: 1,
            batches: vec![Batch {
                index: Some(0),
                episodes: vec![EpisodeSummary {
                    episode_id: "e1".into(),
                    total_snip_count: 2,
                    updated_snip_count: 1,
                    latest_update_ts: "2024-01-01T00:00:00Z".into(),
                }],
            }],
        }
    }

    #[tokio::test]
    async fn test_save_load_delete() {
        let dir = TempDir::new().unwrap();
        let snapshot = MetadataSnapshot::new(
            Arc::new(TokioFileSystem),
            dir.path().join("current_export_metadata.json"),
        );

        assert!(snapshot.load().await.unwrap().is_none());

        snapshot.save(&plan()).await.unwrap();
        assert_eq!(snapshot.load().await.unwrap(), Some(plan()));

        snapshot.delete().await.unwrap();
        assert!(snapshot.load().await.unwrap().is_none());
        snapshot.delete().await.unwrap();
    }

    #[tokio::test]
    async fn test_truncated_snapshot_is_stale() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("current_export_metadata.json");
        let snapshot = MetadataSnapshot::new(Arc::new(TokioFileSystem), path.clone());
        snapshot.save(&plan()).await.unwrap();

        let raw = tokio::fs::read(&path).await.unwrap();
        tokio::fs::write(&path, &raw[..raw.len() / 2]).await.unwrap();

        assert!(matches!(snapshot.load().await, Err(SyncError::StaleResumeState)));
    }

    #[tokio::test]
    async fn test_snapshot_uses_wire_field_names() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("snap.json");
        let snapshot = MetadataSnapshot::new(Arc::new(TokioFileSystem), path.clone());
        snapshot.save(&plan()).await.unwrap();

        let raw = tokio::fs::read_to_string(path).await.unwrap();
        assert!(raw.contains("\"episode_batch_count\": 1"));
    }
}
