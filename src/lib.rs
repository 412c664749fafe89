//! Workspace placeholder crate.
//!
//! This crate exposes feature flags that map to the individual workspace
//! crates. Host applications can depend on `snip-sync-workspace` and enable
//! `desktop-shims` (the full service with desktop bridges) or `engine-only`
//! (just the sync engine, bring your own bridges) without wiring each crate
//! individually.

#[cfg(feature = "desktop-shims")]
pub use core_service as service;

#[cfg(feature = "engine-only")]
pub use core_sync as engine;
