//! Wire and domain types shared by the export client, the unpacker and the
//! orchestrator.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::{Result, SyncError};

/// The export plan returned by the metadata endpoint.
///
/// Immutable once fetched for a run: an interrupted run resumes from the
/// snapshot persisted on disk, never from a fresh fetch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportMetadata {
    #[serde(rename = "episode_batch_count")]
    pub batch_count: u32,
    #[serde(rename = "episode_batches", default)]
    pub batches: Vec<Batch>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Batch {
    /// Position in the plan. The server may omit it; [`ExportMetadata::normalized`]
    /// fills it from the array position.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<u32>,
    #[serde(default)]
    pub episodes: Vec<EpisodeSummary>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpisodeSummary {
    pub episode_id: String,
    #[serde(default)]
    pub total_snip_count: u64,
    #[serde(default)]
    pub updated_snip_count: u64,
    #[serde(default, rename = "latest_snip_update_ts")]
    pub latest_update_ts: String,
}

impl ExportMetadata {
    pub fn empty() -> Self {
        Self {
            batch_count: 0,
            batches: Vec::new(),
        }
    }

    /// Orders batches by index and checks they are contiguous from zero and
    /// agree with `batch_count`.
    pub fn normalized(mut self) -> Result<Self> {
        for (position, batch) in self.batches.iter_mut().enumerate() {
            if batch.index.is_none() {
                batch.index = Some(position as u32);
            }
        }
        self.batches.sort_by_key(|b| b.index);

        for (position, batch) in self.batches.iter().enumerate() {
            if batch.index != Some(position as u32) {
                return Err(SyncError::Serialization(format!(
                    "export plan batch indices are not contiguous: expected {}, found {:?}",
                    position, batch.index
                )));
            }
        }

        if self.batches.len() != self.batch_count as usize {
            return Err(SyncError::Serialization(format!(
                "export plan announces {} batches but lists {}",
                self.batch_count,
                self.batches.len()
            )));
        }

        Ok(self)
    }

    pub fn batch(&self, index: u32) -> Option<&Batch> {
        self.batches.get(index as usize)
    }

    pub fn episodes(&self) -> impl Iterator<Item = &EpisodeSummary> {
        self.batches.iter().flat_map(|b| b.episodes.iter())
    }
}

impl Batch {
    pub fn episode_ids(&self) -> Vec<String> {
        self.episodes.iter().map(|e| e.episode_id.clone()).collect()
    }

    pub fn snip_count(&self) -> u64 {
        self.episodes.iter().map(|e| e.updated_snip_count).sum()
    }

    /// Latest update timestamp of any episode in the batch.
    pub fn latest_update_ts(&self) -> Option<&str> {
        self.episodes
            .iter()
            .map(|e| e.latest_update_ts.as_str())
            .filter(|ts| !ts.is_empty())
            .max()
    }
}

/// `metadata.json` carried inside every batch archive.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BundleMetadata {
    #[serde(default)]
    pub latest_snip_update_ts: Option<String>,
    #[serde(default)]
    pub episodes_data: HashMap<String, EpisodeData>,
    #[serde(default)]
    pub shows_data: HashMap<String, ShowData>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EpisodeData {
    #[serde(default)]
    pub episode_name: String,
    #[serde(default)]
    pub show_id: Option<String>,
    #[serde(default)]
    pub episode_duration: String,
    #[serde(default)]
    pub episode_publish_date: String,
    #[serde(default)]
    pub episode_url: String,
    #[serde(default)]
    pub total_snip_count: Option<u64>,
    #[serde(default)]
    pub updated_snip_count: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ShowData {
    #[serde(default)]
    pub name: String,
}

impl BundleMetadata {
    pub fn show_name_for(&self, episode: Option<&EpisodeData>) -> Option<&str> {
        let show_id = episode?.show_id.as_deref()?;
        self.shows_data.get(show_id).map(|s| s.name.as_str())
    }
}

/// Rendering templates forwarded to the backend with every batch request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportTemplates {
    pub episode_template: Option<String>,
    pub snip_template: Option<String>,
}

/// Raw archive bytes returned by the export endpoints.
#[derive(Debug, Clone)]
pub struct BinaryBundle(pub bytes::Bytes);

impl BinaryBundle {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Counts reported for a committed batch or a finished run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncStats {
    pub episode_count: u64,
    pub snip_count: u64,
}

impl std::ops::AddAssign for SyncStats {
    fn add_assign(&mut self, rhs: Self) {
        self.episode_count += rhs.episode_count;
        self.snip_count += rhs.snip_count;
    }
}
