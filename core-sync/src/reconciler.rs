//! Reconciler: decides how one episode document reaches disk.
//!
//! A file whose on-disk hash still equals the hash recorded at the last
//! write is machine-owned and gets fully regenerated. Anything else is
//! treated as user-edited: the path is flagged append-only for good and new
//! snips are appended instead of overwriting.

use bridge_traits::storage::FileSystemAccess;
use bytes::Bytes;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::error::Result;
use crate::fingerprint::{content_hash, FingerprintStore};
use crate::frontmatter::update_snip_count;
use crate::naming::normalize_vault_path;

/// How existing files are treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    /// Regenerate machine-owned files, append to edited ones.
    Merge,
    /// Always write the full rendition. Used for disposable test output.
    Overwrite,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcileRequest {
    pub episode_id: String,
    /// Vault-relative target path.
    pub target_path: String,
    pub full_content: String,
    pub append_content: Option<String>,
    /// Running snip count for the front-matter patch on appended documents.
    pub total_snip_count: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// Target did not exist.
    Created,
    /// Unedited file regenerated from the full rendition.
    Regenerated,
    /// Delta appended to an edited or append-only file.
    Appended,
    /// Edited or append-only file with no delta available; full rendition
    /// written.
    Replaced,
    /// Written unconditionally in [`WriteMode::Overwrite`].
    Overwritten,
}

pub struct Reconciler<'a> {
    fs: &'a dyn FileSystemAccess,
    vault_root: &'a Path,
}

/// `trim_end(existing) + "\n" + delta`.
pub fn append_merge(existing: &str, delta: &str) -> String {
    let head = existing.trim_end();
    let mut merged = String::with_capacity(head.len() + 1 + delta.len());
    merged.push_str(head);
    merged.push('\n');
    merged.push_str(delta);
    merged
}

fn append_merge_bytes(existing: &[u8], delta: &str) -> Vec<u8> {
    match std::str::from_utf8(existing) {
        Ok(text) => append_merge(text, delta).into_bytes(),
        Err(_) => {
            let end = existing
                .iter()
                .rposition(|b| !b.is_ascii_whitespace())
                .map(|i| i + 1)
                .unwrap_or(0);
            let mut merged = existing[..end].to_vec();
            merged.push(b'\n');
            merged.extend_from_slice(delta.as_bytes());
            merged
        }
    }
}

impl<'a> Reconciler<'a> {
    pub fn new(fs: &'a dyn FileSystemAccess, vault_root: &'a Path) -> Self {
        Self { fs, vault_root }
    }

    fn absolute(&self, vault_relative: &str) -> PathBuf {
        self.vault_root.join(vault_relative)
    }

    /// Writes one episode document and records the hash of the bytes that
    /// ended up on disk.
    pub async fn reconcile(
        &self,
        store: &mut FingerprintStore,
        request: &ReconcileRequest,
        mode: WriteMode,
    ) -> Result<WriteOutcome> {
        let key = normalize_vault_path(&request.target_path);
        let path = self.absolute(&key);

        if let Some(parent) = path.parent() {
            self.fs.create_dir_all(parent).await?;
        }

        let (content, outcome) = if mode == WriteMode::Overwrite {
            (
                Bytes::from(request.full_content.clone()),
                WriteOutcome::Overwritten,
            )
        } else if !self.fs.exists(&path).await? {
            (Bytes::from(request.full_content.clone()), WriteOutcome::Created)
        } else {
            let existing = self.fs.read_file(&path).await?;
            let existing_hash = content_hash(&existing);
            let pristine = store.stored_hash(&key) == Some(existing_hash.as_str())
                && !store.is_append_only(&key);

            if pristine {
                (
                    Bytes::from(request.full_content.clone()),
                    WriteOutcome::Regenerated,
                )
            } else {
                if !store.is_append_only(&key) {
                    info!(path = %key, "Local edits detected, switching file to append-only");
                    store.mark_append_only(&key);
                }

                match request.append_content.as_deref() {
                    Some(delta) if !delta.is_empty() => {
                        let mut merged = append_merge_bytes(&existing, delta);
                        if let (Some(total), Ok(text)) =
                            (request.total_snip_count, String::from_utf8(merged.clone()))
                        {
                            merged = update_snip_count(text, total).into_bytes();
                        }
                        (Bytes::from(merged), WriteOutcome::Appended)
                    }
                    _ => (
                        Bytes::from(request.full_content.clone()),
                        WriteOutcome::Replaced,
                    ),
                }
            }
        };

        let hash = content_hash(&content);
        self.fs.write_file(&path, content).await?;
        store.record_hash(&key, hash);

        debug!(
            episode_id = %request.episode_id,
            path = %key,
            outcome = ?outcome,
            "Reconciled episode document"
        );
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_desktop::TokioFileSystem;
    use tempfile::TempDir;

    const PATH: &str = "Snipd/Show/Episode.md";

    fn request(full: &str, append: Option<&str>) -> ReconcileRequest {
        ReconcileRequest {
            episode_id: "e1".into(),
            target_path: PATH.into(),
            full_content: full.into(),
            append_content: append.map(str::to_string),
            total_snip_count: None,
        }
    }

    async fn read(dir: &TempDir) -> String {
        tokio::fs::read_to_string(dir.path().join(PATH)).await.unwrap()
    }

    #[tokio::test]
    async fn test_first_write_stores_hash_of_full_content() {
        let dir = TempDir::new().unwrap();
        let fs = TokioFileSystem;
        let reconciler = Reconciler::new(&fs, dir.path());
        let mut store = FingerprintStore::new();

        let outcome = reconciler
            .reconcile(&mut store, &request("# Full\n", Some("delta")), WriteMode::Merge)
            .await
            .unwrap();

        assert_eq!(outcome, WriteOutcome::Created);
        assert_eq!(read(&dir).await, "# Full\n");
        assert_eq!(store.stored_hash(PATH), Some(content_hash(b"# Full\n").as_str()));
        assert!(!store.is_append_only(PATH));
    }

    #[tokio::test]
    async fn test_reconcile_is_idempotent_without_edits() {
        let dir = TempDir::new().unwrap();
        let fs = TokioFileSystem;
        let reconciler = Reconciler::new(&fs, dir.path());
        let mut store = FingerprintStore::new();
        let req = request("# Full\n", None);

        reconciler.reconcile(&mut store, &req, WriteMode::Merge).await.unwrap();
        let hash_after_first = store.stored_hash(PATH).map(str::to_string);

        let outcome = reconciler.reconcile(&mut store, &req, WriteMode::Merge).await.unwrap();

        assert_eq!(outcome, WriteOutcome::Regenerated);
        assert_eq!(read(&dir).await, "# Full\n");
        assert_eq!(store.stored_hash(PATH).map(str::to_string), hash_after_first);
    }

    #[tokio::test]
    async fn test_unedited_file_is_regenerated_not_appended() {
        let dir = TempDir::new().unwrap();
        let fs = TokioFileSystem;
        let reconciler = Reconciler::new(&fs, dir.path());
        let mut store = FingerprintStore::new();

        reconciler
            .reconcile(&mut store, &request("v1", None), WriteMode::Merge)
            .await
            .unwrap();
        reconciler
            .reconcile(&mut store, &request("v2 full", Some("new snip")), WriteMode::Merge)
            .await
            .unwrap();

        assert_eq!(read(&dir).await, "v2 full");
    }

    #[tokio::test]
    async fn test_edited_file_gets_delta_appended_and_flagged() {
        let dir = TempDir::new().unwrap();
        let fs = TokioFileSystem;
        let reconciler = Reconciler::new(&fs, dir.path());
        let mut store = FingerprintStore::new();

        reconciler
            .reconcile(&mut store, &request("v1", None), WriteMode::Merge)
            .await
            .unwrap();
        tokio::fs::write(dir.path().join(PATH), "v1 with my notes\n\n  ")
            .await
            .unwrap();

        let outcome = reconciler
            .reconcile(&mut store, &request("v2", Some("new snip")), WriteMode::Merge)
            .await
            .unwrap();

        assert_eq!(outcome, WriteOutcome::Appended);
        let on_disk = read(&dir).await;
        assert_eq!(on_disk, "v1 with my notes\nnew snip");
        assert!(store.is_append_only(PATH));
        assert_eq!(store.stored_hash(PATH), Some(content_hash(on_disk.as_bytes()).as_str()));
    }

    #[tokio::test]
    async fn test_append_only_flag_is_sticky() {
        let dir = TempDir::new().unwrap();
        let fs = TokioFileSystem;
        let reconciler = Reconciler::new(&fs, dir.path());
        let mut store = FingerprintStore::new();

        reconciler
            .reconcile(&mut store, &request("v1", None), WriteMode::Merge)
            .await
            .unwrap();
        tokio::fs::write(dir.path().join(PATH), "edited").await.unwrap();
        reconciler
            .reconcile(&mut store, &request("v2", Some("a")), WriteMode::Merge)
            .await
            .unwrap();

        // Hash now matches disk, but the flag keeps the file in append mode.
        let outcome = reconciler
            .reconcile(&mut store, &request("v3", Some("b")), WriteMode::Merge)
            .await
            .unwrap();

        assert_eq!(outcome, WriteOutcome::Appended);
        assert_eq!(read(&dir).await, "edited\na\nb");
    }

    #[tokio::test]
    async fn test_edited_file_without_delta_is_replaced() {
        let dir = TempDir::new().unwrap();
        let fs = TokioFileSystem;
        let reconciler = Reconciler::new(&fs, dir.path());
        let mut store = FingerprintStore::new();

        reconciler
            .reconcile(&mut store, &request("v1", None), WriteMode::Merge)
            .await
            .unwrap();
        tokio::fs::write(dir.path().join(PATH), "edited").await.unwrap();

        let outcome = reconciler
            .reconcile(&mut store, &request("v2", None), WriteMode::Merge)
            .await
            .unwrap();

        assert_eq!(outcome, WriteOutcome::Replaced);
        assert_eq!(read(&dir).await, "v2");
        assert!(store.is_append_only(PATH));
    }

    #[tokio::test]
    async fn test_untracked_existing_file_is_treated_as_edited() {
        let dir = TempDir::new().unwrap();
        tokio::fs::create_dir_all(dir.path().join("Snipd/Show")).await.unwrap();
        tokio::fs::write(dir.path().join(PATH), "hand written").await.unwrap();

        let fs = TokioFileSystem;
        let reconciler = Reconciler::new(&fs, dir.path());
        let mut store = FingerprintStore::new();

        let outcome = reconciler
            .reconcile(&mut store, &request("full", Some("delta")), WriteMode::Merge)
            .await
            .unwrap();

        assert_eq!(outcome, WriteOutcome::Appended);
        assert_eq!(read(&dir).await, "hand written\ndelta");
    }

    #[tokio::test]
    async fn test_appended_document_gets_count_patched() {
        let dir = TempDir::new().unwrap();
        tokio::fs::create_dir_all(dir.path().join("Snipd/Show")).await.unwrap();
        tokio::fs::write(dir.path().join(PATH), "---\nsnip_count: 1\n---\nmine\n")
            .await
            .unwrap();

        let fs = TokioFileSystem;
        let reconciler = Reconciler::new(&fs, dir.path());
        let mut store = FingerprintStore::new();
        let mut req = request("full", Some("snip two"));
        req.total_snip_count = Some(2);

        reconciler.reconcile(&mut store, &req, WriteMode::Merge).await.unwrap();

        assert_eq!(read(&dir).await, "---\nsnip_count: 2\n---\nmine\nsnip two");
    }

    #[tokio::test]
    async fn test_overwrite_mode_ignores_edits() {
        let dir = TempDir::new().unwrap();
        tokio::fs::create_dir_all(dir.path().join("Snipd/Show")).await.unwrap();
        tokio::fs::write(dir.path().join(PATH), "edited").await.unwrap();

        let fs = TokioFileSystem;
        let reconciler = Reconciler::new(&fs, dir.path());
        let mut store = FingerprintStore::new();

        let outcome = reconciler
            .reconcile(&mut store, &request("full", Some("delta")), WriteMode::Overwrite)
            .await
            .unwrap();

        assert_eq!(outcome, WriteOutcome::Overwritten);
        assert_eq!(read(&dir).await, "full");
        assert!(!store.is_append_only(PATH));
    }

    #[test]
    fn test_append_merge_trims_trailing_whitespace_only() {
        assert_eq!(append_merge("  a\n\n\t", "b"), "  a\nb");
        assert_eq!(append_merge("", "b"), "\nb");
    }
}
