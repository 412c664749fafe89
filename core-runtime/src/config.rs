//! # Core Configuration Module
//!
//! Builder-based configuration for the sync engine.
//!
//! ## Overview
//!
//! `CoreConfig` holds the vault location, the remote API endpoint, engine
//! limits and every host bridge the engine needs. The builder enforces
//! fail-fast validation so a misconfigured host learns about a missing
//! capability at startup rather than mid-sync.
//!
//! ## Required Dependencies
//!
//! - `HttpClient` - export API requests
//! - `FileSystemAccess` - vault reads and writes
//! - `SettingsStore` - persisted sync state
//! - `SecretCipher` - credential encryption at rest
//!
//! When the `desktop-shims` feature is enabled, `bridge-desktop` defaults are
//! injected for any bridge that was not provided.
//!
//! ## Usage
//!
//! ```ignore
//! use core_runtime::config::CoreConfig;
//! use std::sync::Arc;
//!
//! let config = CoreConfig::builder()
//!     .vault_root("/home/me/Notes")
//!     .http_client(Arc::new(MyHttpClient))
//!     .file_system(Arc::new(MyFileSystem))
//!     .settings_store(Arc::new(MySettingsStore))
//!     .secret_cipher(Arc::new(MyCipher))
//!     .build()?;
//! ```

use crate::error::{Error, Result};
use bridge_traits::{Clock, FileSystemAccess, HttpClient, SecretCipher, SettingsStore, SystemClock};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

pub const DEFAULT_API_BASE_URL: &str = "https://api.snipd.com/v1/public/api";
pub const DEFAULT_SNAPSHOT_FILE: &str = "current_export_metadata.json";
pub const DEFAULT_DEBUG_DIR: &str = "snip_sync_debug";
pub const DEFAULT_SETTINGS_DB: &str = ".snip-sync/settings.db";
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(120);
pub const DEFAULT_TEST_SAMPLE_SIZE: usize = 5;
pub const DEFAULT_MAX_AUTO_RESTARTS: u32 = 3;

/// Validated engine configuration.
///
/// Use [`CoreConfigBuilder`] to construct instances.
#[derive(Clone)]
pub struct CoreConfig {
    /// Absolute vault directory; every vault-relative path resolves against it.
    pub vault_root: PathBuf,

    /// Installation identifier the credential is encrypted against.
    pub vault_id: String,

    /// Base URL of the export API, without trailing slash.
    pub api_base_url: String,

    /// Per-request timeout handed to the HTTP bridge.
    pub request_timeout: Duration,

    /// Vault-relative path of the export metadata snapshot side file.
    pub snapshot_file: String,

    /// Vault-relative directory for raw debug archives.
    pub debug_dir: String,

    /// Upper bound on episodes sampled by a test sync.
    pub test_sample_size: usize,

    /// How many self-healing restarts a single run may perform.
    pub max_auto_restarts: u32,

    pub http_client: Arc<dyn HttpClient>,
    pub file_system: Arc<dyn FileSystemAccess>,
    pub settings_store: Arc<dyn SettingsStore>,
    pub secret_cipher: Arc<dyn SecretCipher>,
    pub clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for CoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoreConfig")
            .field("vault_root", &self.vault_root)
            .field("vault_id", &self.vault_id)
            .field("api_base_url", &self.api_base_url)
            .field("request_timeout", &self.request_timeout)
            .field("snapshot_file", &self.snapshot_file)
            .field("debug_dir", &self.debug_dir)
            .field("test_sample_size", &self.test_sample_size)
            .field("max_auto_restarts", &self.max_auto_restarts)
            .field("http_client", &"HttpClient { ... }")
            .field("file_system", &"FileSystemAccess { ... }")
            .field("settings_store", &"SettingsStore { ... }")
            .field("secret_cipher", &"SecretCipher { ... }")
            .finish()
    }
}

impl CoreConfig {
    /// Creates a new builder for constructing a `CoreConfig`.
    pub fn builder() -> CoreConfigBuilder {
        CoreConfigBuilder::default()
    }

    /// Validates the configuration and returns an error if invalid.
    ///
    /// This checks:
    /// - The vault root is an absolute path
    /// - The API base URL is an http(s) URL
    /// - Side-file locations are vault-relative
    /// - Limits are within sane bounds
    pub fn validate(&self) -> Result<()> {
        if self.vault_root.as_os_str().is_empty() {
            return Err(Error::Config("Vault root cannot be empty".to_string()));
        }

        if !self.vault_root.is_absolute() {
            return Err(Error::Config(format!(
                "Vault root must be absolute, got {}",
                self.vault_root.display()
            )));
        }

        if self.vault_id.trim().is_empty() {
            return Err(Error::Config("Vault id cannot be empty".to_string()));
        }

        if !(self.api_base_url.starts_with("https://") || self.api_base_url.starts_with("http://"))
        {
            return Err(Error::Config(format!(
                "API base URL must start with http:// or https://, got '{}'",
                self.api_base_url
            )));
        }

        for (name, value) in [
            ("Snapshot file", &self.snapshot_file),
            ("Debug directory", &self.debug_dir),
        ] {
            if value.trim().is_empty() {
                return Err(Error::Config(format!("{name} cannot be empty")));
            }
            if value.starts_with('/') || value.starts_with('\\') || value.contains("..") {
                return Err(Error::Config(format!(
                    "{name} must be a vault-relative path, got '{value}'"
                )));
            }
        }

        if self.request_timeout.is_zero() {
            return Err(Error::Config(
                "Request timeout must be greater than zero".to_string(),
            ));
        }

        if self.test_sample_size == 0 {
            return Err(Error::Config(
                "Test sample size must be at least 1".to_string(),
            ));
        }

        if self.max_auto_restarts > 10 {
            return Err(Error::Config(
                "Max auto restarts exceeds maximum of 10".to_string(),
            ));
        }

        Ok(())
    }

    /// Absolute path of a vault-relative location.
    pub fn resolve(&self, vault_relative: &str) -> PathBuf {
        self.vault_root.join(vault_relative)
    }
}

fn capability_missing(capability: &str, purpose: &str) -> Error {
    Error::CapabilityMissing {
        capability: capability.to_string(),
        message: format!(
            "{capability} implementation is required for {purpose}. \
             Desktop: enable the 'desktop-shims' feature to use the bridge-desktop default. \
             Other hosts: inject an adapter through CoreConfig::builder()."
        ),
    }
}

#[cfg(feature = "desktop-shims")]
fn default_http_client(timeout: Duration) -> Result<Arc<dyn HttpClient>> {
    let client = bridge_desktop::ReqwestHttpClient::with_timeout(timeout)
        .map_err(|e| Error::Internal(format!("Failed to create default HttpClient: {}", e)))?;
    Ok(Arc::new(client))
}

#[cfg(not(feature = "desktop-shims"))]
fn default_http_client(_timeout: Duration) -> Result<Arc<dyn HttpClient>> {
    Err(capability_missing("HttpClient", "export API requests"))
}

#[cfg(feature = "desktop-shims")]
fn default_file_system() -> Result<Arc<dyn FileSystemAccess>> {
    Ok(Arc::new(bridge_desktop::TokioFileSystem))
}

#[cfg(not(feature = "desktop-shims"))]
fn default_file_system() -> Result<Arc<dyn FileSystemAccess>> {
    Err(capability_missing("FileSystemAccess", "vault reads and writes"))
}

#[cfg(feature = "desktop-shims")]
fn default_secret_cipher() -> Result<Arc<dyn SecretCipher>> {
    Ok(Arc::new(bridge_desktop::AesGcmSecretCipher::new()))
}

#[cfg(not(feature = "desktop-shims"))]
fn default_secret_cipher() -> Result<Arc<dyn SecretCipher>> {
    Err(capability_missing("SecretCipher", "credential encryption"))
}

#[cfg(feature = "desktop-shims")]
fn default_settings_store(vault_root: &std::path::Path) -> Result<Arc<dyn SettingsStore>> {
    use bridge_desktop::SqliteSettingsStore;
    use std::thread;
    use tokio::runtime::{Builder, Handle};

    let path = vault_root.join(DEFAULT_SETTINGS_DB);

    let init_store = |path: PathBuf| -> Result<SqliteSettingsStore> {
        let runtime = Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| {
                Error::Internal(format!(
                    "Failed to create Tokio runtime for default settings store: {}",
                    e
                ))
            })?;

        runtime
            .block_on(SqliteSettingsStore::new(path))
            .map_err(|e| Error::Internal(format!("Failed to initialize default SettingsStore: {}", e)))
    };

    // Tokio forbids nested block_on, so build on a helper thread when called
    // from inside a runtime.
    let store = match Handle::try_current() {
        Ok(_) => thread::spawn(move || init_store(path))
            .join()
            .map_err(|_| {
                Error::Internal(
                    "Worker thread panicked while creating default SettingsStore".to_string(),
                )
            })??,
        Err(_) => init_store(path)?,
    };

    Ok(Arc::new(store))
}

#[cfg(not(feature = "desktop-shims"))]
fn default_settings_store(_vault_root: &std::path::Path) -> Result<Arc<dyn SettingsStore>> {
    Err(capability_missing("SettingsStore", "persisted sync state"))
}

/// Builder for constructing [`CoreConfig`] instances.
#[derive(Default)]
pub struct CoreConfigBuilder {
    vault_root: Option<PathBuf>,
    vault_id: Option<String>,
    api_base_url: Option<String>,
    request_timeout: Option<Duration>,
    snapshot_file: Option<String>,
    debug_dir: Option<String>,
    test_sample_size: Option<usize>,
    max_auto_restarts: Option<u32>,
    http_client: Option<Arc<dyn HttpClient>>,
    file_system: Option<Arc<dyn FileSystemAccess>>,
    settings_store: Option<Arc<dyn SettingsStore>>,
    secret_cipher: Option<Arc<dyn SecretCipher>>,
    clock: Option<Arc<dyn Clock>>,
}

impl CoreConfigBuilder {
    /// Sets the vault root (required).
    ///
    /// ```
    /// use core_runtime::config::CoreConfig;
    ///
    /// let builder = CoreConfig::builder().vault_root("/home/me/Notes");
    /// ```
    pub fn vault_root<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.vault_root = Some(path.into());
        self
    }

    /// Sets the credential encryption context. Defaults to the vault root path.
    pub fn vault_id(mut self, id: impl Into<String>) -> Self {
        self.vault_id = Some(id.into());
        self
    }

    /// Overrides the export API base URL.
    pub fn api_base_url(mut self, url: impl Into<String>) -> Self {
        self.api_base_url = Some(url.into());
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    pub fn snapshot_file(mut self, path: impl Into<String>) -> Self {
        self.snapshot_file = Some(path.into());
        self
    }

    pub fn debug_dir(mut self, path: impl Into<String>) -> Self {
        self.debug_dir = Some(path.into());
        self
    }

    pub fn test_sample_size(mut self, size: usize) -> Self {
        self.test_sample_size = Some(size);
        self
    }

    pub fn max_auto_restarts(mut self, restarts: u32) -> Self {
        self.max_auto_restarts = Some(restarts);
        self
    }

    pub fn http_client(mut self, client: Arc<dyn HttpClient>) -> Self {
        self.http_client = Some(client);
        self
    }

    pub fn file_system(mut self, fs: Arc<dyn FileSystemAccess>) -> Self {
        self.file_system = Some(fs);
        self
    }

    pub fn settings_store(mut self, store: Arc<dyn SettingsStore>) -> Self {
        self.settings_store = Some(store);
        self
    }

    pub fn secret_cipher(mut self, cipher: Arc<dyn SecretCipher>) -> Self {
        self.secret_cipher = Some(cipher);
        self
    }

    /// Injects a time source. Defaults to [`SystemClock`].
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Builds the final `CoreConfig` instance.
    ///
    /// Returns an error if:
    /// - The vault root is missing
    /// - A required bridge is missing and no desktop default is available
    /// - Configuration values are invalid
    pub fn build(self) -> Result<CoreConfig> {
        let vault_root = self.vault_root.ok_or_else(|| {
            Error::Config("Vault root is required. Use .vault_root() to set it.".to_string())
        })?;

        let request_timeout = self.request_timeout.unwrap_or(DEFAULT_REQUEST_TIMEOUT);

        let http_client = match self.http_client {
            Some(client) => client,
            None => default_http_client(request_timeout)?,
        };

        let file_system = match self.file_system {
            Some(fs) => fs,
            None => default_file_system()?,
        };

        let settings_store = match self.settings_store {
            Some(store) => store,
            None => default_settings_store(&vault_root)?,
        };

        let secret_cipher = match self.secret_cipher {
            Some(cipher) => cipher,
            None => default_secret_cipher()?,
        };

        let vault_id = self
            .vault_id
            .unwrap_or_else(|| vault_root.to_string_lossy().into_owned());

        let config = CoreConfig {
            vault_root,
            vault_id,
            api_base_url: self
                .api_base_url
                .unwrap_or_else(|| DEFAULT_API_BASE_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            request_timeout,
            snapshot_file: self
                .snapshot_file
                .unwrap_or_else(|| DEFAULT_SNAPSHOT_FILE.to_string()),
            debug_dir: self
                .debug_dir
                .unwrap_or_else(|| DEFAULT_DEBUG_DIR.to_string()),
            test_sample_size: self.test_sample_size.unwrap_or(DEFAULT_TEST_SAMPLE_SIZE),
            max_auto_restarts: self.max_auto_restarts.unwrap_or(DEFAULT_MAX_AUTO_RESTARTS),
            http_client,
            file_system,
            settings_store,
            secret_cipher,
            clock: self.clock.unwrap_or_else(|| Arc::new(SystemClock)),
        };

        config.validate()?;

        Ok(config)
    }
}
