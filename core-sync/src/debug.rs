//! Optional copies of raw server responses for troubleshooting exports.

use bridge_traits::storage::FileSystemAccess;
use bytes::Bytes;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::types::{BinaryBundle, ExportMetadata};

/// Writes debug output into `<debug_dir>/sync_<millis>/`. Disabled
/// instances do nothing. Write failures are logged and swallowed.
pub struct DebugArchives {
    fs: Arc<dyn FileSystemAccess>,
    dir: Option<PathBuf>,
}

impl DebugArchives {
    pub fn disabled(fs: Arc<dyn FileSystemAccess>) -> Self {
        Self { fs, dir: None }
    }

    pub fn for_run(fs: Arc<dyn FileSystemAccess>, debug_root: PathBuf, started_millis: i64) -> Self {
        Self {
            fs,
            dir: Some(debug_root.join(format!("sync_{}", started_millis))),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.dir.is_some()
    }

    pub fn dir(&self) -> Option<&PathBuf> {
        self.dir.as_ref()
    }

    async fn write(&self, file_name: &str, data: Bytes) {
        let Some(dir) = &self.dir else {
            return;
        };
        let path = dir.join(file_name);
        if let Err(e) = self.fs.create_dir_all(dir).await {
            warn!(path = %dir.display(), error = %e, "Failed to create debug directory");
            return;
        }
        match self.fs.write_file(&path, data).await {
            Ok(()) => debug!(path = %path.display(), "Saved debug output"),
            Err(e) => warn!(path = %path.display(), error = %e, "Failed to save debug output"),
        }
    }

    pub async fn save_metadata(&self, file_name: &str, metadata: &ExportMetadata) {
        if !self.is_enabled() {
            return;
        }
        match serde_json::to_vec_pretty(metadata) {
            Ok(json) => self.write(file_name, Bytes::from(json)).await,
            Err(e) => warn!(error = %e, "Failed to serialize debug metadata"),
        }
    }

    pub async fn save_bundle(&self, file_name: &str, bundle: &BinaryBundle) {
        self.write(file_name, bundle.0.clone()).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_desktop::TokioFileSystem;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_enabled_archives_write_files() {
        let dir = TempDir::new().unwrap();
        let archives = DebugArchives::for_run(Arc::new(TokioFileSystem), dir.path().join("dbg"), 42);

        archives.save_metadata("metadata.json", &ExportMetadata::empty()).await;
        archives
            .save_bundle("batch_0_42.zip", &BinaryBundle(Bytes::from_static(b"PK")))
            .await;

        let run_dir = dir.path().join("dbg/sync_42");
        assert!(run_dir.join("metadata.json").exists());
        assert_eq!(std::fs::read(run_dir.join("batch_0_42.zip")).unwrap(), b"PK");
    }

    #[tokio::test]
    async fn test_disabled_archives_write_nothing() {
        let dir = TempDir::new().unwrap();
        let archives = DebugArchives::disabled(Arc::new(TokioFileSystem));
        archives.save_metadata("metadata.json", &ExportMetadata::empty()).await;
        assert!(std::fs::read_dir(dir.path()).unwrap().next().is_none());
        assert!(!archives.is_enabled());
    }
}
