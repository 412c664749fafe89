//! # Desktop Bridges
//!
//! Native implementations of the host bridges, wired in automatically by
//! `CoreConfig::builder()` when the `desktop-shims` feature is on:
//!
//! - [`ReqwestHttpClient`]: rustls, retry with backoff on 5xx/429
//! - [`TokioFileSystem`]: vault I/O via `tokio::fs`
//! - [`SqliteSettingsStore`]: state document in `<vault>/.snip-sync/settings.db`
//! - [`AesGcmSecretCipher`]: PBKDF2-derived AES-256-GCM credential blobs
//!
//! ```ignore
//! let config = CoreConfig::builder()
//!     .vault_root("/home/me/Notes")
//!     .http_client(Arc::new(ReqwestHttpClient::new()?))
//!     .file_system(Arc::new(TokioFileSystem))
//!     .settings_store(Arc::new(SqliteSettingsStore::new(db_path).await?))
//!     .secret_cipher(Arc::new(AesGcmSecretCipher::new()))
//!     .build()?;
//! ```

mod filesystem;
mod http;
mod secret_cipher;
mod settings;

pub use filesystem::TokioFileSystem;
pub use http::ReqwestHttpClient;
pub use secret_cipher::AesGcmSecretCipher;
pub use settings::SqliteSettingsStore;
