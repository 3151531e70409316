//! Brute-force vector index
//!
//! Append-only store of (id, vector) pairs for one engine, queried by
//! linear scan over Euclidean distance. No tree or graph structure is
//! built: query cost is O(entries x dimension) and entries accumulate
//! for the lifetime of the index, so callers must not assume
//! sub-linear cost at scale.

pub mod store;

pub use store::IndexStore;

use crate::embeddings::{euclidean_distance, Vector};
use crate::error::{Error, Result};
use parking_lot::RwLock;

/// One k-NN query hit
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct Neighbor {
    pub id: String,
    pub distance: f32,
}

struct IndexEntry {
    id: String,
    vector: Vector,
}

/// Append-only vector index for one engine
///
/// Inserts are published atomically under the write lock: a concurrent
/// query observes the pre- or post-state of an insert, never a torn
/// entry. Reads proceed concurrently with other reads.
pub struct VectorIndex {
    dimension: usize,
    entries: RwLock<Vec<IndexEntry>>,
}

impl VectorIndex {
    /// Create an empty index accepting vectors of exactly `dimension`
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            entries: RwLock::new(Vec::new()),
        }
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Append an entry; the id is opaque and not checked for uniqueness
    ///
    /// Rejects wrong-length vectors before any mutation.
    pub fn insert(&self, id: impl Into<String>, vector: Vector) -> Result<()> {
        self.check_dimension(&vector)?;
        self.entries.write().push(IndexEntry {
            id: id.into(),
            vector,
        });
        Ok(())
    }

    /// k nearest entries by Euclidean distance, ascending
    ///
    /// Ties are broken by insertion order (first inserted ranks first)
    /// so results are deterministic. Returns at most `k` neighbors.
    pub fn query(&self, vector: &[f32], k: usize) -> Result<Vec<Neighbor>> {
        self.check_dimension(vector)?;
        if k == 0 {
            return Ok(Vec::new());
        }

        let entries = self.entries.read();
        let mut scored: Vec<(f32, usize)> = entries
            .iter()
            .enumerate()
            .map(|(position, entry)| (euclidean_distance(vector, &entry.vector), position))
            .collect();

        scored.sort_by(|a, b| {
            a.0.partial_cmp(&b.0)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.1.cmp(&b.1))
        });
        scored.truncate(k);

        Ok(scored
            .into_iter()
            .map(|(distance, position)| Neighbor {
                id: entries[position].id.clone(),
                distance,
            })
            .collect())
    }

    /// Nearest entry with its stored vector, or None when empty
    ///
    /// Used by policies that need the neighbor's raw vector (e.g. a true
    /// cosine-similarity check) rather than the L2 ranking distance.
    pub fn nearest_entry(&self, vector: &[f32]) -> Result<Option<(Neighbor, Vector)>> {
        self.check_dimension(vector)?;

        let entries = self.entries.read();
        let mut best: Option<(f32, usize)> = None;
        for (position, entry) in entries.iter().enumerate() {
            let distance = euclidean_distance(vector, &entry.vector);
            if best.map_or(true, |(d, _)| distance < d) {
                best = Some((distance, position));
            }
        }

        Ok(best.map(|(distance, position)| {
            (
                Neighbor {
                    id: entries[position].id.clone(),
                    distance,
                },
                entries[position].vector.clone(),
            )
        }))
    }

    /// Snapshot of all entries, in insertion order
    pub fn entries(&self) -> Vec<(String, Vector)> {
        self.entries
            .read()
            .iter()
            .map(|entry| (entry.id.clone(), entry.vector.clone()))
            .collect()
    }

    fn check_dimension(&self, vector: &[f32]) -> Result<()> {
        if vector.len() != self.dimension {
            return Err(Error::DimensionMismatch {
                expected: self.dimension,
                actual: vector.len(),
            });
        }
        Ok(())
    }
}
