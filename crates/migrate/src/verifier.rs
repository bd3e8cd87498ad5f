//! Consistency verifier: side-effect free reads of source and destination
//! at checkpoints.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use tracing::info;

use reindex_core::{Document, StoreError, Version};
use reindex_store::DocumentStore;

/// Result of reading one id. `NotFound` is an expected outcome, not an error.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Observation {
    Found(Document),
    NotFound,
}

impl Observation {
    pub fn document(&self) -> Option<&Document> {
        match self {
            Observation::Found(doc) => Some(doc),
            Observation::NotFound => None,
        }
    }

    pub fn is_found(&self) -> bool {
        matches!(self, Observation::Found(_))
    }

    pub fn version(&self) -> Option<Version> {
        self.document().map(|d| d.version)
    }
}

impl fmt::Display for Observation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Observation::Found(doc) => write!(f, "found {doc}"),
            Observation::NotFound => write!(f, "not found"),
        }
    }
}

/// How one id compares between source and destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Divergence {
    InSync,
    MissingInDest,
    StaleInDest { source_version: Version, dest_version: Version },
    /// Present in the destination only, e.g. deleted from the source after the snapshot.
    OrphanedInDest { dest_version: Version },
    AbsentInBoth,
}

impl fmt::Display for Divergence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Divergence::InSync => write!(f, "in sync"),
            Divergence::MissingInDest => write!(f, "missing in destination"),
            Divergence::StaleInDest {
                source_version,
                dest_version,
            } => write!(
                f,
                "stale in destination (source v{source_version}, destination v{dest_version})"
            ),
            Divergence::OrphanedInDest { dest_version } => {
                write!(f, "orphaned in destination (v{dest_version})")
            }
            Divergence::AbsentInBoth => write!(f, "absent in both"),
        }
    }
}

/// A labelled set of reads taken at one point of the scenario.
#[derive(Debug, Clone, Serialize)]
pub struct Checkpoint {
    pub label: String,
    pub collection: String,
    pub observations: Vec<(String, Observation)>,
}

impl Checkpoint {
    pub fn get(&self, id: &str) -> Option<&Observation> {
        self.observations
            .iter()
            .find(|(obs_id, _)| obs_id == id)
            .map(|(_, obs)| obs)
    }

    /// Text lines for the checkpoint log.
    pub fn lines(&self) -> Vec<String> {
        let mut lines = vec![format!("==== {} ({}) ====", self.label, self.collection)];
        lines.extend(
            self.observations
                .iter()
                .map(|(id, obs)| format!(" --- {id}: {obs}")),
        );
        lines
    }
}

pub struct ConsistencyVerifier {
    store: Arc<dyn DocumentStore>,
}

impl ConsistencyVerifier {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    pub async fn read_at(&self, collection: &str, id: &str) -> Result<Observation, StoreError> {
        Ok(match self.store.get(collection, id).await? {
            Some(doc) => Observation::Found(doc),
            None => Observation::NotFound,
        })
    }

    pub async fn checkpoint(
        &self,
        label: &str,
        collection: &str,
        ids: &[&str],
    ) -> Result<Checkpoint, StoreError> {
        let mut observations = Vec::with_capacity(ids.len());
        for id in ids {
            let obs = self.read_at(collection, id).await?;
            info!(checkpoint = label, collection, id, found = obs.is_found(), version = ?obs.version(), "checkpoint read");
            observations.push((id.to_string(), obs));
        }
        Ok(Checkpoint {
            label: label.to_string(),
            collection: collection.to_string(),
            observations,
        })
    }

    pub async fn compare(&self, source: &str, dest: &str, id: &str) -> Result<Divergence, StoreError> {
        let src = self.read_at(source, id).await?;
        let dst = self.read_at(dest, id).await?;
        Ok(match (src, dst) {
            (Observation::NotFound, Observation::NotFound) => Divergence::AbsentInBoth,
            (Observation::Found(_), Observation::NotFound) => Divergence::MissingInDest,
            (Observation::NotFound, Observation::Found(d)) => Divergence::OrphanedInDest {
                dest_version: d.version,
            },
            (Observation::Found(s), Observation::Found(d)) => {
                if s.version > d.version || s.payload != d.payload {
                    Divergence::StaleInDest {
                        source_version: s.version,
                        dest_version: d.version,
                    }
                } else {
                    Divergence::InSync
                }
            }
        })
    }
}
