//! Fingerprint Store: what the engine last wrote to each path.
//!
//! All keys are vault-relative paths in [`normalize_vault_path`] form.
//! Entries are only added or updated by the reconciler and the base-asset
//! merge; they are dropped in bulk on a directory-missing reset, and
//! individually when an asset disappears from the upstream bundle.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

use crate::naming::normalize_vault_path;

/// SHA-256 of `content`, lowercase hex.
pub fn content_hash(content: &[u8]) -> String {
    hex::encode(Sha256::digest(content))
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FingerprintStore {
    pub file_hash_map: BTreeMap<String, String>,
    pub append_only_flags: BTreeMap<String, bool>,
    pub base_asset_hash_map: BTreeMap<String, String>,
    pub base_manual_override: BTreeMap<String, bool>,
}

impl FingerprintStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// True when no episode document has ever been recorded.
    pub fn is_empty(&self) -> bool {
        self.file_hash_map.is_empty()
    }

    pub fn stored_hash(&self, path: &str) -> Option<&str> {
        self.file_hash_map
            .get(&normalize_vault_path(path))
            .map(String::as_str)
    }

    pub fn record_hash(&mut self, path: &str, hash: String) {
        self.file_hash_map.insert(normalize_vault_path(path), hash);
    }

    pub fn is_append_only(&self, path: &str) -> bool {
        self.append_only_flags
            .get(&normalize_vault_path(path))
            .copied()
            .unwrap_or(false)
    }

    /// Sets the sticky append-only flag. There is no inverse.
    pub fn mark_append_only(&mut self, path: &str) {
        self.append_only_flags.insert(normalize_vault_path(path), true);
    }

    pub fn base_asset_hash(&self, path: &str) -> Option<&str> {
        self.base_asset_hash_map
            .get(&normalize_vault_path(path))
            .map(String::as_str)
    }

    pub fn record_base_asset_hash(&mut self, path: &str, hash: String) {
        self.base_asset_hash_map
            .insert(normalize_vault_path(path), hash);
    }

    pub fn is_base_overridden(&self, path: &str) -> bool {
        self.base_manual_override
            .get(&normalize_vault_path(path))
            .copied()
            .unwrap_or(false)
    }

    pub fn mark_base_overridden(&mut self, path: &str) {
        self.base_manual_override
            .insert(normalize_vault_path(path), true);
    }

    /// Lifts a manual override so the next base-asset sync rewrites the file.
    pub fn clear_base_override(&mut self, path: &str) -> bool {
        let path = normalize_vault_path(path);
        let removed = self.base_manual_override.remove(&path).is_some();
        self.base_asset_hash_map.remove(&path);
        removed
    }

    /// Drops the hash and override of every base asset under `scope` that is
    /// not in `present`. Returns the purged paths.
    pub fn purge_base_assets_except(&mut self, scope: &str, present: &[String]) -> Vec<String> {
        let prefix = format!("{}/", normalize_vault_path(scope));
        let keep: Vec<String> = present.iter().map(|p| normalize_vault_path(p)).collect();
        let stale: Vec<String> = self
            .base_asset_hash_map
            .keys()
            .chain(self.base_manual_override.keys())
            .filter(|path| path.starts_with(&prefix) && !keep.contains(path))
            .cloned()
            .collect();

        let mut purged = Vec::new();
        for path in stale {
            self.base_asset_hash_map.remove(&path);
            self.base_manual_override.remove(&path);
            if !purged.contains(&path) {
                purged.push(path);
            }
        }
        purged
    }

    /// Forgets every episode fingerprint and base-asset hash. Manual overrides
    /// survive: they are only lifted by [`Self::clear_base_override`].
    pub fn reset(&mut self) {
        self.file_hash_map.clear();
        self.append_only_flags.clear();
        self.base_asset_hash_map.clear();
    }
}
