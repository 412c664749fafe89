use thiserror::Error;

/// Failures while assembling the engine's runtime: bad configuration, a
/// bridge the host did not provide, or a default bridge that could not start.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    /// `capability` names the bridge trait, e.g. `HttpClient`.
    #[error("Capability missing: {capability} - {message}")]
    CapabilityMissing { capability: String, message: String },

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, Error>;
