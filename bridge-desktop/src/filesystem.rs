//! Vault access through `tokio::fs`.

use async_trait::async_trait;
use bridge_traits::error::{BridgeError, Result};
use bridge_traits::storage::FileSystemAccess;
use bytes::Bytes;
use std::io;
use std::path::Path;
use tokio::fs;
use tracing::trace;

#[derive(Debug, Default, Clone, Copy)]
pub struct TokioFileSystem;

/// Tags a `NotFound` with the path that was missing.
fn io_error(path: &Path, e: io::Error) -> BridgeError {
    match e.kind() {
        io::ErrorKind::NotFound => BridgeError::NotFound(path.display().to_string()),
        _ => BridgeError::Io(e),
    }
}

#[async_trait]
impl FileSystemAccess for TokioFileSystem {
    async fn exists(&self, path: &Path) -> Result<bool> {
        fs::try_exists(path).await.map_err(|e| io_error(path, e))
    }

    async fn create_dir_all(&self, path: &Path) -> Result<()> {
        fs::create_dir_all(path).await.map_err(|e| io_error(path, e))
    }

    async fn read_file(&self, path: &Path) -> Result<Bytes> {
        let data = fs::read(path).await.map_err(|e| io_error(path, e))?;
        trace!(path = %path.display(), bytes = data.len(), "Read vault file");
        Ok(Bytes::from(data))
    }

    async fn write_file(&self, path: &Path, data: Bytes) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await.map_err(|e| io_error(parent, e))?;
        }
        fs::write(path, &data).await.map_err(|e| io_error(path, e))?;
        trace!(path = %path.display(), bytes = data.len(), "Wrote vault file");
        Ok(())
    }

    async fn delete_file(&self, path: &Path) -> Result<()> {
        fs::remove_file(path).await.map_err(|e| io_error(path, e))
    }

    async fn delete_dir_all(&self, path: &Path) -> Result<()> {
        fs::remove_dir_all(path).await.map_err(|e| io_error(path, e))?;
        trace!(path = %path.display(), "Removed directory tree");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_write_creates_show_directory() {
        let vault = tempfile::tempdir().unwrap();
        let note = vault.path().join("Snipd/Some Show/Episode.md");

        TokioFileSystem.write_file(&note, Bytes::from("# Episode\n")).await.unwrap();

        assert!(TokioFileSystem.exists(&note).await.unwrap());
        assert_eq!(
            TokioFileSystem.read_file(&note).await.unwrap(),
            Bytes::from("# Episode\n")
        );
    }

    #[tokio::test]
    async fn test_missing_paths_map_to_not_found() {
        let vault = tempfile::tempdir().unwrap();
        let absent = vault.path().join("absent.md");

        assert!(!TokioFileSystem.exists(&absent).await.unwrap());
        assert!(TokioFileSystem.read_file(&absent).await.unwrap_err().is_not_found());
        assert!(TokioFileSystem.delete_file(&absent).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_delete_dir_all_clears_test_output() {
        let vault = tempfile::tempdir().unwrap();
        let root = vault.path().join("Snipd-TEST");
        TokioFileSystem
            .write_file(&root.join("Show/a.md"), Bytes::from("a"))
            .await
            .unwrap();

        TokioFileSystem.delete_dir_all(&root).await.unwrap();
        assert!(!TokioFileSystem.exists(&root).await.unwrap());
    }
}
