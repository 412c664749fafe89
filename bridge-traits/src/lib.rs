//! # Host Bridge Traits
//!
//! The sync engine never opens a socket, a file or a database itself. Each
//! of those capabilities is a trait here, implemented by `bridge-desktop`
//! for native hosts and by in-memory fakes in tests.
//!
//! | Trait | Used for |
//! |-------|----------|
//! | [`HttpClient`] | export metadata, batch and base-asset requests |
//! | [`FileSystemAccess`] | writing notes and assets into the vault |
//! | [`SettingsStore`] | the persisted sync state document |
//! | [`SecretCipher`] | the API credential at rest |
//! | [`Clock`] | sync timestamps and debug archive names |
//! | [`LoggerSink`] | mirroring engine logs into the host |
//!
//! `core-runtime`'s config builder refuses to build when a required bridge is
//! missing and names the capability:
//!
//! ```ignore
//! let config = CoreConfig::builder()
//!     .vault_root("/home/me/vault")
//!     .build()?; // Err(CapabilityMissing { capability: "HttpClient", .. })
//! ```
//!
//! Every trait is `Send + Sync`: one adapter is shared by the sync task, the
//! scheduler and the host. Failures are reported as [`BridgeError`] carrying
//! the path or URL involved.

pub mod error;
pub mod http;
pub mod storage;
pub mod time;

pub use error::BridgeError;

pub use http::{HttpClient, HttpMethod, HttpRequest, HttpResponse, RetryPolicy};
pub use storage::{FileSystemAccess, SecretCipher, SettingsStore};
pub use time::{Clock, FixedClock, LogEntry, LogLevel, LoggerSink, SystemClock};
