//! Vault files, durable settings and credential encryption.

use async_trait::async_trait;
use bytes::Bytes;
use std::path::Path;

use crate::error::Result;

/// Access to the notes vault on disk.
///
/// Paths are absolute: the engine joins vault-relative paths such as
/// `Snipd/Show/Episode.md` onto the vault root before calling in. Only the
/// operations a sync run performs are required; the engine never lists or
/// renames.
///
/// ```ignore
/// let path = vault_root.join("Snipd/Show/Episode.md");
/// if !fs.exists(&path).await? {
///     fs.write_file(&path, Bytes::from(markdown)).await?;
/// }
/// ```
#[async_trait]
pub trait FileSystemAccess: Send + Sync {
    async fn exists(&self, path: &Path) -> Result<bool>;

    async fn create_dir_all(&self, path: &Path) -> Result<()>;

    /// Fails with [`BridgeError::NotFound`](crate::BridgeError::NotFound)
    /// when `path` is absent.
    async fn read_file(&self, path: &Path) -> Result<Bytes>;

    /// Creates or truncates `path`, creating missing parent directories.
    async fn write_file(&self, path: &Path, data: Bytes) -> Result<()>;

    async fn delete_file(&self, path: &Path) -> Result<()>;

    /// Removes a directory tree. Used to clear the previous test-sync output.
    async fn delete_dir_all(&self, path: &Path) -> Result<()>;
}

/// Durable string storage holding the persisted sync state.
///
/// A value written by `set_string` must be readable after a crash once the
/// call has returned: batch commits rely on that.
#[async_trait]
pub trait SettingsStore: Send + Sync {
    async fn set_string(&self, key: &str, value: &str) -> Result<()>;

    async fn get_string(&self, key: &str) -> Result<Option<String>>;
}

/// Authenticated encryption of the API credential at rest.
///
/// `context_id` (the vault identifier) binds a blob to one vault: a blob
/// copied into another vault's settings fails to decrypt instead of yielding
/// garbage. Implementations never log plaintext or key material.
#[async_trait]
pub trait SecretCipher: Send + Sync {
    /// Returns a text-safe blob suitable for a JSON settings document.
    async fn encrypt(&self, plaintext: &str, context_id: &str) -> Result<String>;

    async fn decrypt(&self, blob: &str, context_id: &str) -> Result<String>;
}
