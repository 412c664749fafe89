//! Base-asset merge: the static support files shipped next to the episode
//! documents.
//!
//! A base asset the user has modified is never overwritten again until the
//! override is cleared through [`FingerprintStore::clear_base_override`].

use bridge_traits::storage::FileSystemAccess;
use bytes::Bytes;
use std::path::Path;
use tracing::{debug, info, warn};

use crate::bundle::UnpackedAssets;
use crate::error::Result;
use crate::fingerprint::{content_hash, FingerprintStore};
use crate::naming::{is_contained_vault_path, normalize_vault_path};
use crate::reconciler::WriteMode;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BaseAssetOutcome {
    pub written: u32,
    pub skipped: u32,
    pub purged: u32,
    /// Vault-relative path of the asset the host should open by default.
    pub default_file: Option<String>,
    /// Paths newly flagged as manually overridden during this merge.
    pub new_overrides: Vec<String>,
}

enum AssetCheck {
    Writable,
    Overridden,
    NewlyOverridden,
}

async fn check_asset(
    fs: &dyn FileSystemAccess,
    store: &FingerprintStore,
    key: &str,
    path: &Path,
) -> AssetCheck {
    if store.is_base_overridden(key) {
        return AssetCheck::Overridden;
    }
    let Some(stored) = store.base_asset_hash(key) else {
        return AssetCheck::Writable;
    };

    match fs.exists(path).await {
        Ok(false) => AssetCheck::Writable,
        Ok(true) => match fs.read_file(path).await {
            Ok(existing) if content_hash(&existing) == stored => AssetCheck::Writable,
            Ok(_) => AssetCheck::NewlyOverridden,
            Err(e) => {
                warn!(path = %key, error = %e, "Cannot validate base asset, treating as overridden");
                AssetCheck::NewlyOverridden
            }
        },
        Err(e) => {
            warn!(path = %key, error = %e, "Cannot validate base asset, treating as overridden");
            AssetCheck::NewlyOverridden
        }
    }
}

/// Writes `assets` under `target_dir`.
///
/// In [`WriteMode::Overwrite`] every asset is written and `store` is left
/// untouched. Asset names that would resolve outside `target_dir` are
/// skipped.
pub async fn merge_base_assets(
    fs: &dyn FileSystemAccess,
    vault_root: &Path,
    store: &mut FingerprintStore,
    target_dir: &str,
    assets: &UnpackedAssets,
    mode: WriteMode,
) -> Result<BaseAssetOutcome> {
    let mut outcome = BaseAssetOutcome {
        default_file: assets
            .manifest
            .as_ref()
            .and_then(|m| m.default_file.as_deref())
            .map(|f| normalize_vault_path(&format!("{}/{}", target_dir, f))),
        ..Default::default()
    };
    let mut present = Vec::with_capacity(assets.assets.len());

    for (name, content) in &assets.assets {
        let key = normalize_vault_path(&format!("{}/{}", target_dir, name));
        if !is_contained_vault_path(name) || !is_contained_vault_path(&key) {
            warn!(asset = %name, "Refusing base asset path outside the target directory");
            outcome.skipped += 1;
            continue;
        }
        let path = vault_root.join(&key);
        present.push(key.clone());

        if mode == WriteMode::Merge {
            match check_asset(fs, store, &key, &path).await {
                AssetCheck::Writable => {}
                AssetCheck::Overridden => {
                    debug!(path = %key, "Skipping manually overridden base asset");
                    outcome.skipped += 1;
                    continue;
                }
                AssetCheck::NewlyOverridden => {
                    info!(path = %key, "Base asset modified locally, no longer overwriting it");
                    store.mark_base_overridden(&key);
                    outcome.new_overrides.push(key);
                    outcome.skipped += 1;
                    continue;
                }
            }
        }

        if let Some(parent) = path.parent() {
            fs.create_dir_all(parent).await?;
        }
        fs.write_file(&path, Bytes::from(content.clone())).await?;
        if mode == WriteMode::Merge {
            store.record_base_asset_hash(&key, content_hash(content.as_bytes()));
        }
        debug!(path = %key, "Wrote base asset");
        outcome.written += 1;
    }

    if mode == WriteMode::Merge {
        let purged = store.purge_base_assets_except(target_dir, &present);
        for path in &purged {
            debug!(path = %path, "Base asset no longer shipped, forgetting its fingerprint");
        }
        outcome.purged = purged.len() as u32;
    }

    Ok(outcome)
}
