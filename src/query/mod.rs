//! Similarity query service - ranked retrieval over stored corpora
//!
//! Read path used by callers that want ids ranked by distance to a
//! query vector. Image and text corpora live in separate per-engine
//! indices and must not cross-query.

use crate::embeddings::{EngineRegistry, Modality};
use crate::error::{Error, Result};
use crate::index::{Neighbor, VectorIndex};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

/// Ranked retrieval over one index per engine
pub struct SimilarityQueryService {
    registry: Arc<EngineRegistry>,
    indices: RwLock<HashMap<String, Arc<VectorIndex>>>,
}

impl SimilarityQueryService {
    pub fn new(registry: Arc<EngineRegistry>) -> Self {
        Self {
            registry,
            indices: RwLock::new(HashMap::new()),
        }
    }

    /// Attach the corpus index for an engine
    pub fn attach_index(&self, engine_name: &str, index: Arc<VectorIndex>) {
        self.indices
            .write()
            .insert(engine_name.to_string(), index);
    }

    /// The attached index for an engine, if any
    pub fn index(&self, engine_name: &str) -> Option<Arc<VectorIndex>> {
        self.indices.read().get(engine_name).cloned()
    }

    /// Ids ranked by ascending distance to the query vector
    ///
    /// `modality` must match the engine's declared modality, and the
    /// vector's length must match its dimension. Ranking always sees
    /// the full candidate set; `skip`/`limit` pagination is applied
    /// after ranking. An engine with no attached corpus yields an
    /// empty result.
    pub fn query_by_vector(
        &self,
        engine_name: &str,
        vector: &[f32],
        modality: Modality,
        skip: usize,
        limit: usize,
    ) -> Result<Vec<Neighbor>> {
        let descriptor = self.registry.get(engine_name)?;
        if descriptor.modality != modality {
            return Err(Error::ModalityMismatch {
                name: engine_name.to_string(),
                expected: descriptor.modality,
                requested: modality,
            });
        }
        if vector.len() != descriptor.dimension {
            return Err(Error::DimensionMismatch {
                expected: descriptor.dimension,
                actual: vector.len(),
            });
        }

        let index = match self.index(engine_name) {
            Some(index) => index,
            None => return Ok(Vec::new()),
        };

        let ranked = index.query(vector, usize::MAX)?;
        Ok(ranked.into_iter().skip(skip).take(limit).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::EngineDescriptor;

    fn service_with_corpus() -> SimilarityQueryService {
        let mut registry = EngineRegistry::new();
        registry
            .insert(EngineDescriptor {
                name: "img-4".to_string(),
                modality: Modality::Image,
                dimension: 4,
                supported: true,
                model_path: None,
                tokenizer_path: None,
                model_url: None,
                tokenizer_url: None,
                sha256_model: None,
                sha256_tokenizer: None,
            })
            .unwrap();
        registry
            .insert(EngineDescriptor {
                name: "txt-2".to_string(),
                modality: Modality::Text,
                dimension: 2,
                supported: true,
                model_path: None,
                tokenizer_path: None,
                model_url: None,
                tokenizer_url: None,
                sha256_model: None,
                sha256_tokenizer: None,
            })
            .unwrap();

        let service = SimilarityQueryService::new(Arc::new(registry));

        let index = Arc::new(VectorIndex::new(4));
        for (id, x) in [("a", 0.0f32), ("b", 1.0), ("c", 2.0), ("d", 3.0)] {
            index.insert(id, vec![x, 0.0, 0.0, 0.0]).unwrap();
        }
        service.attach_index("img-4", index);
        service
    }

    #[test]
    fn test_ranked_ascending_with_pagination_after_ranking() {
        let service = service_with_corpus();
        let query = [0.0, 0.0, 0.0, 0.0];

        let all = service
            .query_by_vector("img-4", &query, Modality::Image, 0, 10)
            .unwrap();
        let ids: Vec<_> = all.iter().map(|n| n.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c", "d"]);

        // skip applies to the ranked list, not the raw candidate set
        let page = service
            .query_by_vector("img-4", &query, Modality::Image, 2, 1)
            .unwrap();
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].id, "c");
    }

    #[test]
    fn test_modality_cross_query_is_rejected() {
        let service = service_with_corpus();
        let err = service
            .query_by_vector("img-4", &[0.0; 4], Modality::Text, 0, 10)
            .unwrap_err();
        assert!(matches!(err, Error::ModalityMismatch { .. }));
    }

    #[test]
    fn test_dimension_guard() {
        let service = service_with_corpus();
        let err = service
            .query_by_vector("img-4", &[0.0; 3], Modality::Image, 0, 10)
            .unwrap_err();
        assert!(matches!(
            err,
            Error::DimensionMismatch {
                expected: 4,
                actual: 3
            }
        ));
    }

    #[test]
    fn test_unknown_engine_and_empty_corpus() {
        let service = service_with_corpus();
        assert!(matches!(
            service
                .query_by_vector("nope", &[0.0; 4], Modality::Image, 0, 10)
                .unwrap_err(),
            Error::EngineNotFound { .. }
        ));

        // Registered engine with no attached corpus
        let empty = service
            .query_by_vector("txt-2", &[0.0; 2], Modality::Text, 0, 10)
            .unwrap();
        assert!(empty.is_empty());
    }
}
