//! # Core Runtime
//!
//! What every engine crate shares: the validated [`config::CoreConfig`]
//! with the host bridges, the tracing setup in [`logging`] and the
//! [`events::EventBus`] that progress and outcomes are broadcast on.

pub mod config;
pub mod error;
pub mod events;
pub mod logging;

pub use error::{Error, Result};
