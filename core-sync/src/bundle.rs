//! Bundle Unpacker: turns export archives into named text entries.

use serde::Deserialize;
use std::collections::BTreeMap;
use std::io::{Cursor, Read};
use tracing::{debug, trace, warn};

use crate::error::{Result, SyncError};
use crate::types::{BinaryBundle, BundleMetadata};

pub const METADATA_ENTRY: &str = "metadata.json";
const EPISODES_PREFIX: &str = "episodes/";
const FULL_SUFFIX: &str = "_full_content.md";
const APPEND_SUFFIX: &str = "_append_only_content.md";

/// The two renditions the backend produces for one episode.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EpisodeContent {
    pub full: String,
    pub append: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct UnpackedBatch {
    pub metadata: Option<BundleMetadata>,
    pub episodes: BTreeMap<String, EpisodeContent>,
}

/// Manifest found in the base-asset archive.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct AssetManifest {
    #[serde(default)]
    pub default_file: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct UnpackedAssets {
    pub manifest: Option<AssetManifest>,
    /// `(archive entry name, content)` in archive order.
    pub assets: Vec<(String, String)>,
}

enum EntryKind<'a> {
    Full(&'a str),
    Append(&'a str),
}

fn classify_episode_entry(name: &str) -> Option<EntryKind<'_>> {
    let file_name = name.strip_prefix(EPISODES_PREFIX)?;
    if let Some(id) = file_name.strip_suffix(FULL_SUFFIX) {
        return (!id.is_empty()).then_some(EntryKind::Full(id));
    }
    if let Some(id) = file_name.strip_suffix(APPEND_SUFFIX) {
        return (!id.is_empty()).then_some(EntryKind::Append(id));
    }
    None
}

/// Iterates the non-directory entries of an archive as `(name, text)`.
/// Entries whose names would escape the extraction root are skipped.
fn for_each_text_entry<F>(bundle: &BinaryBundle, mut visit: F) -> Result<()>
where
    F: FnMut(&str, String) -> Result<()>,
{
    let mut archive = zip::ZipArchive::new(Cursor::new(bundle.as_bytes()))
        .map_err(|e| SyncError::CorruptBundle(format!("cannot open archive: {}", e)))?;

    for i in 0..archive.len() {
        let mut entry = archive
            .by_index(i)
            .map_err(|e| SyncError::CorruptBundle(format!("cannot read entry {}: {}", i, e)))?;

        if entry.is_dir() {
            continue;
        }

        let name = entry.name().to_string();
        if entry.enclosed_name().is_none() {
            warn!(entry = %name, "Skipping archive entry with a path outside the archive root");
            continue;
        }

        let mut text = String::new();
        entry.read_to_string(&mut text).map_err(|e| {
            SyncError::CorruptBundle(format!("entry {} is not valid text: {}", name, e))
        })?;

        visit(&name, text)?;
    }

    Ok(())
}

/// Unpacks one batch archive.
///
/// Entries other than `metadata.json` and `episodes/<id>_*.md` are ignored.
pub fn unpack(bundle: &BinaryBundle) -> Result<UnpackedBatch> {
    let mut unpacked = UnpackedBatch::default();

    for_each_text_entry(bundle, |name, text| {
        if name == METADATA_ENTRY {
            let metadata: BundleMetadata = serde_json::from_str(&text).map_err(|e| {
                SyncError::CorruptBundle(format!("invalid {}: {}", METADATA_ENTRY, e))
            })?;
            unpacked.metadata = Some(metadata);
            return Ok(());
        }

        match classify_episode_entry(name) {
            Some(EntryKind::Full(id)) => {
                unpacked.episodes.entry(id.to_string()).or_default().full = text;
            }
            Some(EntryKind::Append(id)) => {
                unpacked.episodes.entry(id.to_string()).or_default().append = Some(text);
            }
            None => trace!(entry = name, "Ignoring unrecognized archive entry"),
        }
        Ok(())
    })?;

    debug!(
        episodes = unpacked.episodes.len(),
        has_metadata = unpacked.metadata.is_some(),
        "Unpacked batch archive"
    );
    Ok(unpacked)
}

/// Unpacks the base-asset archive. `metadata.json` is the manifest; every
/// other file is an asset.
pub fn unpack_assets(bundle: &BinaryBundle) -> Result<UnpackedAssets> {
    let mut unpacked = UnpackedAssets::default();

    for_each_text_entry(bundle, |name, text| {
        if name == METADATA_ENTRY {
            let manifest: AssetManifest = serde_json::from_str(&text).map_err(|e| {
                SyncError::CorruptBundle(format!("invalid asset manifest: {}", e))
            })?;
            unpacked.manifest = Some(manifest);
        } else {
            unpacked.assets.push((name.to_string(), text));
        }
        Ok(())
    })?;

    Ok(unpacked)
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use std::io::Write;
    use zip::write::SimpleFileOptions;

    /// Builds an in-memory archive. Names ending in `/` become directories.
    pub fn build_zip(entries: &[(&str, &str)]) -> BinaryBundle {
        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        let options = SimpleFileOptions::default();
        for (name, content) in entries {
            if name.ends_with('/') {
                writer.add_directory(*name, options).unwrap();
            } else {
                writer.start_file(*name, options).unwrap();
                writer.write_all(content.as_bytes()).unwrap();
            }
        }
        let cursor = writer.finish().unwrap();
        BinaryBundle(bytes::Bytes::from(cursor.into_inner()))
    }
}
