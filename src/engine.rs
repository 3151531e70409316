//! SimilarityEngine - explicitly constructed owner of the pipeline
//!
//! One registry, one model cache, and one vector index per engine,
//! wired together without process-wide globals. Tests construct a
//! fresh instance each; applications construct one from Config and
//! pass it by reference.

use crate::config::Config;
use crate::dedup::{DedupClassifier, DedupPolicy};
use crate::embeddings::{
    EmbeddingProducer, EngineRegistry, ModelCache, ModelLoader, OnnxModelLoader,
};
use crate::error::Result;
use crate::index::VectorIndex;
use crate::query::SimilarityQueryService;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Facade owning the embedding cache, per-engine indices, and read path
pub struct SimilarityEngine {
    registry: Arc<EngineRegistry>,
    cache: Arc<ModelCache>,
    producer: EmbeddingProducer,
    queries: SimilarityQueryService,
    indices: RwLock<HashMap<String, Arc<VectorIndex>>>,
}

impl SimilarityEngine {
    /// Build an engine around an explicit registry and model loader
    pub fn new(
        registry: Arc<EngineRegistry>,
        loader: Arc<dyn ModelLoader>,
        ttl: Duration,
        load_timeout: Option<Duration>,
    ) -> Self {
        let mut cache = ModelCache::new(Arc::clone(&registry), loader, ttl);
        if let Some(timeout) = load_timeout {
            cache = cache.with_load_timeout(timeout);
        }
        let cache = Arc::new(cache);

        Self {
            producer: EmbeddingProducer::new(Arc::clone(&registry), Arc::clone(&cache)),
            queries: SimilarityQueryService::new(Arc::clone(&registry)),
            registry,
            cache,
            indices: RwLock::new(HashMap::new()),
        }
    }

    /// Build an engine from configuration, with ONNX model loading
    pub fn from_config(config: &Config) -> Result<Self> {
        let registry = Arc::new(config.registry()?);
        let loader = Arc::new(OnnxModelLoader::new(config.models.models_dir()));
        Ok(Self::new(
            registry,
            loader,
            Duration::from_secs(config.cache.ttl_secs),
            config.cache.load_timeout_secs.map(Duration::from_secs),
        ))
    }

    pub fn registry(&self) -> &Arc<EngineRegistry> {
        &self.registry
    }

    pub fn cache(&self) -> &Arc<ModelCache> {
        &self.cache
    }

    pub fn producer(&self) -> &EmbeddingProducer {
        &self.producer
    }

    pub fn queries(&self) -> &SimilarityQueryService {
        &self.queries
    }

    /// The corpus index for an engine, created on first use with the
    /// engine's declared dimension and shared with the query service
    pub fn index(&self, engine_name: &str) -> Result<Arc<VectorIndex>> {
        if let Some(index) = self.indices.read().get(engine_name) {
            return Ok(Arc::clone(index));
        }

        let descriptor = self.registry.get(engine_name)?;
        let mut indices = self.indices.write();
        // Raced constructions resolve to whichever index landed first
        let index = indices
            .entry(engine_name.to_string())
            .or_insert_with(|| Arc::new(VectorIndex::new(descriptor.dimension)));
        let index = Arc::clone(index);
        drop(indices);

        self.queries.attach_index(engine_name, Arc::clone(&index));
        Ok(index)
    }

    /// A dedup classifier over the engine's corpus index
    pub fn classifier(&self, engine_name: &str, policy: DedupPolicy) -> Result<DedupClassifier> {
        Ok(DedupClassifier::new(self.index(engine_name)?, policy))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::{
        EngineDescriptor, LoadedModel, Modality, TextEmbedder, Vector,
    };

    struct UpperStubEmbedder;

    impl TextEmbedder for UpperStubEmbedder {
        fn embed(&self, text: &str) -> Result<Vector> {
            // Deterministic toy embedding: length and vowel count
            let vowels = text.chars().filter(|c| "aeiou".contains(*c)).count();
            Ok(vec![text.len() as f32, vowels as f32])
        }

        fn dimension(&self) -> usize {
            2
        }

        fn engine_name(&self) -> &str {
            "stub"
        }
    }

    struct StubLoader;

    impl ModelLoader for StubLoader {
        fn load(&self, _descriptor: &EngineDescriptor) -> Result<LoadedModel> {
            Ok(LoadedModel::Text(Arc::new(UpperStubEmbedder)))
        }
    }

    fn test_engine() -> SimilarityEngine {
        let mut registry = EngineRegistry::new();
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
        SimilarityEngine::new(
            Arc::new(registry),
            Arc::new(StubLoader),
            Duration::from_secs(60),
            None,
        )
    }

    #[test]
    fn test_index_uses_declared_dimension_and_is_shared() {
        let engine = test_engine();
        let index = engine.index("txt-2").unwrap();
        assert_eq!(index.dimension(), 2);

        // Same Arc on repeat lookups, and visible to the query service
        let again = engine.index("txt-2").unwrap();
        assert!(Arc::ptr_eq(&index, &again));
        assert!(engine.queries().index("txt-2").is_some());
    }

    #[test]
    fn test_embed_classify_query_round_trip() {
        let engine = test_engine();
        let classifier = engine
            .classifier("txt-2", DedupPolicy::default())
            .unwrap();

        let vector = engine.producer().embed_text("txt-2", "hello").unwrap();
        assert!(classifier
            .classify_and_maybe_insert("greeting", vector.clone())
            .unwrap()
            .is_unique());

        let ranked = engine
            .queries()
            .query_by_vector("txt-2", &vector, Modality::Text, 0, 10)
            .unwrap();
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].id, "greeting");
    }

    #[test]
    fn test_unknown_engine_has_no_index() {
        let engine = test_engine();
        assert!(engine.index("missing").is_err());
    }
}
