//! Dedup classifier - partition incoming items against a growing corpus
//!
//! Two entry points mirror the two ingestion paths: a single-nearest
//! uniqueness gate (k=1) for interactive "is this new?" checks, and a
//! multi-neighbor triage that also caps how many visually-similar items
//! a cluster may contribute. Only kept items are inserted, so later
//! candidates are compared against the retained population - processing
//! order matters by design.

use crate::embeddings::{cosine_similarity, EmbeddingProducer, Modality, Vector};
use crate::error::{Error, Result};
use crate::index::VectorIndex;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, warn};

/// Outcome of classifying one candidate
///
/// `Similar` and `Duplicate` carry the measured distance to the nearest
/// prior neighbor for auditability.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub enum Classification {
    Unique,
    Similar(f32),
    Duplicate(f32),
}

impl Classification {
    /// Whether the candidate was kept (inserted into the index)
    pub fn is_unique(&self) -> bool {
        matches!(self, Classification::Unique)
    }
}

/// How the single-nearest uniqueness gate decides "duplicate"
///
/// The two modes exist because deployments disagree on the semantics
/// of the cutoff: one converts the neighbor into a cosine similarity
/// and rejects above the threshold, the other compares the raw L2
/// ranking distance against it. Pick per deployment; neither is
/// implied by the other.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "rule", rename_all = "lowercase")]
pub enum UniquenessRule {
    /// Duplicate when cosine similarity to the nearest neighbor exceeds
    /// the threshold
    #[serde(rename = "cosine")]
    CosineSimilarity { threshold: f32 },
    /// Duplicate when the nearest neighbor's L2 distance is within the
    /// threshold
    #[serde(rename = "l2")]
    L2Distance { threshold: f32 },
}

/// Thresholds for the dedup classifier
///
/// `same_distance` catches near-identical duplicates (always excluded).
/// `similar_distance` with the `max_similar` count cap lets a bounded
/// number of similar-but-distinct items through, so a cluster is not
/// collapsed to a single representative while still capping redundancy.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DedupPolicy {
    pub same_distance: f32,
    pub similar_distance: f32,
    pub max_similar: usize,
    pub uniqueness: UniquenessRule,
}

impl Default for DedupPolicy {
    fn default() -> Self {
        Self {
            same_distance: 0.2,
            similar_distance: 0.5,
            max_similar: 10,
            uniqueness: UniquenessRule::CosineSimilarity { threshold: 0.5 },
        }
    }
}

/// Partition of a processed work list
#[derive(Debug, Clone, Default, Serialize)]
pub struct SiftReport {
    /// Ids classified unique and inserted into the index
    pub kept: Vec<String>,
    /// Ids classified duplicate or similar; never inserted
    pub rejected: Vec<String>,
    /// Ids whose decode or embedding failed; processing continued
    pub unavailable: Vec<String>,
}

/// Batch/streaming dedup orchestrator over one vector index
pub struct DedupClassifier {
    index: Arc<VectorIndex>,
    policy: DedupPolicy,
}

impl DedupClassifier {
    pub fn new(index: Arc<VectorIndex>, policy: DedupPolicy) -> Self {
        Self { index, policy }
    }

    pub fn policy(&self) -> &DedupPolicy {
        &self.policy
    }

    pub fn index(&self) -> &Arc<VectorIndex> {
        &self.index
    }

    /// Single-nearest uniqueness gate (k=1)
    ///
    /// Empty index classifies `Unique` and inserts. Otherwise the
    /// nearest neighbor is judged by the policy's uniqueness rule;
    /// duplicates are never inserted.
    pub fn check_unique(&self, id: &str, vector: Vector) -> Result<Classification> {
        let nearest = self.index.nearest_entry(&vector)?;

        let (neighbor, stored) = match nearest {
            None => {
                self.index.insert(id, vector)?;
                return Ok(Classification::Unique);
            }
            Some(found) => found,
        };

        let duplicate = match self.policy.uniqueness {
            UniquenessRule::CosineSimilarity { threshold } => {
                cosine_similarity(&vector, &stored) > threshold
            }
            UniquenessRule::L2Distance { threshold } => neighbor.distance <= threshold,
        };

        if duplicate {
            debug!(id, nearest = %neighbor.id, distance = neighbor.distance, "duplicate");
            return Ok(Classification::Duplicate(neighbor.distance));
        }

        self.index.insert(id, vector)?;
        Ok(Classification::Unique)
    }

    /// Multi-neighbor triage against up to `max_similar` neighbors
    ///
    /// Neighbors are scanned in ascending distance: anything within
    /// `same_distance` rejects the candidate outright; otherwise
    /// neighbors within `similar_distance` are counted and the candidate
    /// is rejected once the count reaches `max_similar`. Survivors are
    /// classified `Unique` and inserted for future comparisons.
    pub fn classify_and_maybe_insert(&self, id: &str, vector: Vector) -> Result<Classification> {
        let neighbors = self.index.query(&vector, self.policy.max_similar)?;

        let mut similar_count = 0;
        for neighbor in &neighbors {
            if neighbor.distance < self.policy.same_distance {
                debug!(id, nearest = %neighbor.id, distance = neighbor.distance, "same-image drop");
                return Ok(Classification::Duplicate(neighbor.distance));
            }
            if neighbor.distance < self.policy.similar_distance {
                similar_count += 1;
                if similar_count >= self.policy.max_similar {
                    debug!(id, count = similar_count, "similar-cluster drop");
                    return Ok(Classification::Similar(neighbor.distance));
                }
            }
        }

        self.index.insert(id, vector)?;
        Ok(Classification::Unique)
    }

    /// Classify a stream of pre-embedded candidates
    ///
    /// Items carrying an error contribute an `unavailable` outcome and
    /// processing continues.
    pub fn sift<I>(&self, items: I) -> Result<SiftReport>
    where
        I: IntoIterator<Item = (String, Result<Vector>)>,
    {
        let mut report = SiftReport::default();
        for (id, vector) in items {
            self.apply(id, vector, &mut report)?;
        }
        Ok(report)
    }

    /// Batch pipeline over image files: decode, embed, classify
    ///
    /// Work is partitioned into fixed-size batches; each batch's images
    /// decode in parallel, then classification runs sequentially within
    /// and across batches so batch N's inserts are visible to batch
    /// N+1. Per-item decode/embedding failures are isolated as
    /// `unavailable`; engine misconfiguration fails the whole call.
    pub fn sift_images(
        &self,
        producer: &EmbeddingProducer,
        engine_name: &str,
        paths: &[PathBuf],
        batch_size: usize,
    ) -> Result<SiftReport> {
        let descriptor = producer.registry().get(engine_name)?;
        if descriptor.modality != Modality::Image {
            return Err(Error::ModalityMismatch {
                name: engine_name.to_string(),
                expected: descriptor.modality,
                requested: Modality::Image,
            });
        }
        if !descriptor.supported {
            return Err(Error::UnsupportedEngine {
                name: engine_name.to_string(),
            });
        }

        let batch_size = batch_size.max(1);
        let mut report = SiftReport::default();

        for batch in paths.chunks(batch_size) {
            let decoded: Vec<(String, Result<image::DynamicImage>)> = batch
                .par_iter()
                .map(|path| {
                    let id = path.display().to_string();
                    let decoded = image::open(path).map_err(|e| Error::InputDecode {
                        cause: format!("{}: {}", path.display(), e),
                    });
                    (id, decoded)
                })
                .collect();

            for (id, decoded) in decoded {
                let vector =
                    decoded.and_then(|img| producer.embed_image(engine_name, &img));
                self.apply(id, vector, &mut report)?;
            }
        }

        Ok(report)
    }

    fn apply(&self, id: String, vector: Result<Vector>, report: &mut SiftReport) -> Result<()> {
        match vector {
            Ok(vector) => match self.classify_and_maybe_insert(&id, vector)? {
                Classification::Unique => report.kept.push(id),
                Classification::Similar(_) | Classification::Duplicate(_) => {
                    report.rejected.push(id)
                }
            },
            Err(e) => {
                warn!(id = %id, error = %e, "item unavailable, continuing batch");
                report.unavailable.push(id);
            }
        }
        Ok(())
    }
}
