//! Embeddings module - generate fixed-dimension vectors for text and images
//!
//! Provides trait-based abstraction over embedding backends with an ONNX
//! implementation per modality, a registry of named engines, and a
//! sliding-TTL cache of loaded models.

mod cache;
mod onnx_image;
mod onnx_text;
pub mod producer;
pub mod registry;
mod similarity;

pub use cache::{ModelCache, ModelLoader, DEFAULT_TTL_SECS};
pub use onnx_image::OnnxImageEmbedder;
pub use onnx_text::OnnxTextEmbedder;
pub use producer::EmbeddingProducer;
pub use registry::{EngineDescriptor, EngineRegistry, Modality};
pub use similarity::{cosine_similarity, euclidean_distance};

use crate::error::Result;
use image::DynamicImage;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// A fixed-length embedding vector
pub type Vector = Vec<f32>;

/// Trait for text embedding backends
///
/// Requires Send + Sync so a loaded model can be shared from the cache
/// across concurrent callers. Backends needing interior mutability (ONNX
/// sessions) wrap their state in a lock.
pub trait TextEmbedder: Send + Sync {
    /// Generate embedding for a single text
    fn embed(&self, text: &str) -> Result<Vector>;

    /// Generate embeddings for multiple texts
    ///
    /// Default implementation embeds sequentially.
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vector>> {
        texts.iter().map(|t| self.embed(t)).collect()
    }

    /// Embedding dimension (e.g., 384 for all-MiniLM-L6-v2)
    fn dimension(&self) -> usize;

    /// Name of the engine this embedder backs
    fn engine_name(&self) -> &str;
}

/// Trait for image embedding backends
pub trait ImageEmbedder: Send + Sync {
    /// Generate embedding for a decoded image
    fn embed(&self, image: &DynamicImage) -> Result<Vector>;

    /// Embedding dimension (e.g., 512 for CLIP ViT-B/32)
    fn dimension(&self) -> usize;

    /// Name of the engine this embedder backs
    fn engine_name(&self) -> &str;
}

/// A loaded, ready-to-use embedding model
///
/// Tagged by modality; the variant is selected from the engine
/// descriptor when the model is instantiated.
pub enum LoadedModel {
    Text(Arc<dyn TextEmbedder>),
    Image(Arc<dyn ImageEmbedder>),
}

impl LoadedModel {
    /// Modality this model serves
    pub fn modality(&self) -> Modality {
        match self {
            LoadedModel::Text(_) => Modality::Text,
            LoadedModel::Image(_) => Modality::Image,
        }
    }
}

/// Loader that instantiates ONNX backends from engine descriptors
///
/// Model files are resolved relative to `models_dir` when the descriptor
/// does not carry explicit paths: `<models_dir>/<engine>/model.onnx` and
/// `<models_dir>/<engine>/tokenizer.json`.
pub struct OnnxModelLoader {
    models_dir: PathBuf,
}

impl OnnxModelLoader {
    pub fn new<P: AsRef<Path>>(models_dir: P) -> Self {
        Self {
            models_dir: models_dir.as_ref().to_path_buf(),
        }
    }

    fn model_path(&self, descriptor: &EngineDescriptor) -> PathBuf {
        descriptor
            .model_path
            .clone()
            .unwrap_or_else(|| self.models_dir.join(&descriptor.name).join("model.onnx"))
    }

    fn tokenizer_path(&self, descriptor: &EngineDescriptor) -> PathBuf {
        descriptor.tokenizer_path.clone().unwrap_or_else(|| {
            self.models_dir
                .join(&descriptor.name)
                .join("tokenizer.json")
        })
    }
}

impl ModelLoader for OnnxModelLoader {
    fn load(&self, descriptor: &EngineDescriptor) -> Result<LoadedModel> {
        match descriptor.modality {
            Modality::Text => {
                let embedder = OnnxTextEmbedder::new_from_paths(
                    &self.model_path(descriptor),
                    &self.tokenizer_path(descriptor),
                    &descriptor.name,
                    descriptor.dimension,
                )?;
                Ok(LoadedModel::Text(Arc::new(embedder)))
            }
            Modality::Image => {
                let embedder = OnnxImageEmbedder::new_from_path(
                    &self.model_path(descriptor),
                    &descriptor.name,
                    descriptor.dimension,
                )?;
                Ok(LoadedModel::Image(Arc::new(embedder)))
            }
        }
    }
}
