//! Integration tests for the classification pipeline over the facade

use semsift::embeddings::{
    EngineDescriptor, EngineRegistry, LoadedModel, Modality, ModelLoader, TextEmbedder, Vector,
};
use semsift::{Classification, DedupPolicy, Result, SimilarityEngine, UniquenessRule};
use std::sync::Arc;
use std::time::Duration;

struct NoopTextEmbedder {
    dimension: usize,
}

impl TextEmbedder for NoopTextEmbedder {
    fn embed(&self, _text: &str) -> Result<Vector> {
        Ok(vec![0.0; self.dimension])
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn engine_name(&self) -> &str {
        "noop"
    }
}

struct NoopLoader;

impl ModelLoader for NoopLoader {
    fn load(&self, descriptor: &EngineDescriptor) -> Result<LoadedModel> {
        Ok(LoadedModel::Text(Arc::new(NoopTextEmbedder {
            dimension: descriptor.dimension,
        })))
    }
}

fn descriptor(name: &str, modality: Modality, dimension: usize) -> EngineDescriptor {
    EngineDescriptor {
        name: name.to_string(),
        modality,
        dimension,
        supported: true,
        model_path: None,
        tokenizer_path: None,
        model_url: None,
        tokenizer_url: None,
        sha256_model: None,
        sha256_tokenizer: None,
    }
}

fn engine_with(descriptors: Vec<EngineDescriptor>) -> SimilarityEngine {
    let mut registry = EngineRegistry::new();
    for d in descriptors {
        registry.insert(d).unwrap();
    }
    SimilarityEngine::new(
        Arc::new(registry),
        Arc::new(NoopLoader),
        Duration::from_secs(60),
        None,
    )
}

#[test]
fn end_to_end_duplicate_then_unique() {
    // img-512: insert A, query identical B (distance 0.0 -> duplicate),
    // then C at L2 distance 10.0 with thresholds same=0.2, similar=5.0
    // (-> unique, inserted).
    let engine = engine_with(vec![descriptor("img-512", Modality::Image, 512)]);
    let policy = DedupPolicy {
        same_distance: 0.2,
        similar_distance: 5.0,
        max_similar: 10,
        uniqueness: UniquenessRule::L2Distance { threshold: 0.2 },
    };
    let classifier = engine.classifier("img-512", policy).unwrap();

    let mut a = vec![0.0f32; 512];
    a[0] = 1.0;
    assert_eq!(
        classifier.classify_and_maybe_insert("a", a.clone()).unwrap(),
        Classification::Unique
    );

    let b = a.clone();
    match classifier.classify_and_maybe_insert("b", b).unwrap() {
        Classification::Duplicate(distance) => assert!(distance.abs() < 1e-6),
        other => panic!("identical vector should be a duplicate, got {:?}", other),
    }

    let mut c = a.clone();
    c[1] = 10.0;
    assert_eq!(
        classifier.classify_and_maybe_insert("c", c).unwrap(),
        Classification::Unique
    );

    // Only a and c made it into the corpus
    assert_eq!(engine.index("img-512").unwrap().len(), 2);
}

#[test]
fn rejected_items_never_reach_the_query_path() {
    let engine = engine_with(vec![descriptor("img-4", Modality::Image, 4)]);
    let policy = DedupPolicy {
        same_distance: 0.5,
        similar_distance: 2.0,
        max_similar: 10,
        uniqueness: UniquenessRule::L2Distance { threshold: 0.5 },
    };
    let classifier = engine.classifier("img-4", policy).unwrap();

    classifier
        .classify_and_maybe_insert("kept", vec![0.0, 0.0, 0.0, 0.0])
        .unwrap();
    let rejected = classifier
        .classify_and_maybe_insert("near-copy", vec![0.1, 0.0, 0.0, 0.0])
        .unwrap();
    assert!(!rejected.is_unique());

    let ranked = engine
        .queries()
        .query_by_vector("img-4", &[0.0, 0.0, 0.0, 0.0], Modality::Image, 0, 10)
        .unwrap();
    let ids: Vec<_> = ranked.iter().map(|n| n.id.as_str()).collect();
    assert_eq!(ids, vec!["kept"]);
}

#[test]
fn text_and_image_corpora_do_not_cross_query() {
    let engine = engine_with(vec![
        descriptor("img-4", Modality::Image, 4),
        descriptor("txt-4", Modality::Text, 4),
    ]);

    engine
        .index("img-4")
        .unwrap()
        .insert("picture", vec![0.0; 4])
        .unwrap();

    // Asking for text results from the image engine is a modality error,
    // not an empty result.
    let err = engine
        .queries()
        .query_by_vector("img-4", &[0.0; 4], Modality::Text, 0, 10)
        .unwrap_err();
    assert!(matches!(err, semsift::Error::ModalityMismatch { .. }));

    // The text engine's corpus is separate and still empty
    let ranked = engine
        .queries()
        .query_by_vector("txt-4", &[0.0; 4], Modality::Text, 0, 10)
        .unwrap();
    assert!(ranked.is_empty());
}

#[test]
fn pagination_is_applied_after_ranking() {
    let engine = engine_with(vec![descriptor("img-2", Modality::Image, 2)]);
    let index = engine.index("img-2").unwrap();

    // Insert out of distance order so ranking has to see everything
    index.insert("far", vec![9.0, 0.0]).unwrap();
    index.insert("near", vec![1.0, 0.0]).unwrap();
    index.insert("mid", vec![4.0, 0.0]).unwrap();

    let page = engine
        .queries()
        .query_by_vector("img-2", &[0.0, 0.0], Modality::Image, 1, 1)
        .unwrap();
    assert_eq!(page.len(), 1);
    assert_eq!(page[0].id, "mid");
}
