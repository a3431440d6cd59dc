//! Enrolled speaker profiles.
//!
//! The profile table is immutable at this boundary: enrollment runs out of
//! band and produces a YAML file of user ids and reference vectors. The
//! gateway loads it into a [`ProfileTable`] snapshot; refreshes swap the
//! whole table atomically through a [`ProfileCell`], so readers never see a
//! partial update.

use crate::embedding::{l2_norm, l2_normalize};
use crate::error::SpeakerError;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use tracing::info;

/// One enrolled user: id plus reference embedding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrolledProfile {
    pub user_id: String,
    pub embedding: Vec<f32>,
}

#[derive(Debug, Deserialize)]
struct ProfileDoc {
    #[serde(default)]
    profiles: Vec<EnrolledProfile>,
}

/// Read-only table of enrolled profiles.
///
/// Reference vectors are L2-normalized at construction and entries are
/// sorted by user id, so scans are deterministic.
#[derive(Debug, Clone, Default)]
pub struct ProfileTable {
    profiles: Vec<EnrolledProfile>,
}

impl ProfileTable {
    /// Builds a table, validating and normalizing the vectors.
    ///
    /// All embeddings must share one dimension and none may be zero.
    pub fn new(mut profiles: Vec<EnrolledProfile>) -> Result<Self, SpeakerError> {
        if let Some(first) = profiles.first() {
            let expected = first.embedding.len();
            for p in &profiles {
                if p.embedding.len() != expected {
                    return Err(SpeakerError::DimensionMismatch {
                        expected,
                        got: p.embedding.len(),
                    });
                }
                if l2_norm(&p.embedding) == 0.0 {
                    return Err(SpeakerError::ZeroEmbedding(p.user_id.clone()));
                }
            }
        }
        for p in &mut profiles {
            l2_normalize(&mut p.embedding);
        }
        profiles.sort_by(|a, b| a.user_id.cmp(&b.user_id));
        Ok(Self { profiles })
    }

    /// Parses a table from YAML text.
    pub fn from_yaml(text: &str) -> Result<Self, SpeakerError> {
        let doc: ProfileDoc = serde_yaml::from_str(text)?;
        Self::new(doc.profiles)
    }

    /// Loads a table from a YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, SpeakerError> {
        let path = path.as_ref();
        let table = Self::from_yaml(&std::fs::read_to_string(path)?)?;
        info!("loaded {} enrolled profiles from {}", table.len(), path.display());
        Ok(table)
    }

    /// Returns the shared embedding dimension, or None for an empty table.
    pub fn dimension(&self) -> Option<usize> {
        self.profiles.first().map(|p| p.embedding.len())
    }

    /// Returns the profile for a user id, if enrolled.
    pub fn get(&self, user_id: &str) -> Option<&EnrolledProfile> {
        self.profiles.iter().find(|p| p.user_id == user_id)
    }

    /// Iterates profiles in user-id order.
    pub fn iter(&self) -> impl Iterator<Item = &EnrolledProfile> {
        self.profiles.iter()
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }
}

/// Atomically swappable profile snapshot shared across sessions.
///
/// Readers clone the `Arc` and keep scanning a consistent table even while a
/// refresh replaces the cell's contents.
#[derive(Debug)]
pub struct ProfileCell {
    inner: RwLock<Arc<ProfileTable>>,
}

impl ProfileCell {
    /// Creates a cell holding the given table.
    pub fn new(table: ProfileTable) -> Self {
        Self {
            inner: RwLock::new(Arc::new(table)),
        }
    }

    /// Returns the current snapshot.
    pub fn snapshot(&self) -> Arc<ProfileTable> {
        self.inner.read().clone()
    }

    /// Replaces the table as a whole.
    pub fn swap(&self, table: ProfileTable) {
        *self.inner.write() = Arc::new(table);
    }
}

impl Default for ProfileCell {
    fn default() -> Self {
        Self::new(ProfileTable::default())
    }
}
