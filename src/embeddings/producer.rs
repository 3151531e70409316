//! Embedding generation front door
//!
//! Validates the engine contract (existence, support, modality),
//! resolves the backing model through the cache, and enforces the
//! declared dimension on every produced vector before it escapes.

use super::cache::ModelCache;
use super::registry::{EngineDescriptor, EngineRegistry, Modality};
use super::{LoadedModel, Vector};
use crate::error::{Error, Result};
use image::DynamicImage;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

/// Produces fixed-dimension vectors for registered engines
///
/// Triggers `ModelCache::get_or_load` as needed; no other observable
/// state changes.
pub struct EmbeddingProducer {
    registry: Arc<EngineRegistry>,
    cache: Arc<ModelCache>,
}

impl EmbeddingProducer {
    pub fn new(registry: Arc<EngineRegistry>, cache: Arc<ModelCache>) -> Self {
        Self { registry, cache }
    }

    /// Embed a text under a text-modality engine
    pub fn embed_text(&self, engine_name: &str, text: &str) -> Result<Vector> {
        let descriptor = self.checked_descriptor(engine_name, Modality::Text)?;
        let model = self.cache.get_or_load(engine_name)?;
        let vector = match model.as_ref() {
            LoadedModel::Text(embedder) => embedder.embed(text)?,
            LoadedModel::Image(_) => {
                return Err(self.wrong_variant(&descriptor));
            }
        };
        self.ensure_dimension(&descriptor, vector)
    }

    /// Embed a batch of texts under a text-modality engine
    pub fn embed_text_batch(&self, engine_name: &str, texts: &[String]) -> Result<Vec<Vector>> {
        let descriptor = self.checked_descriptor(engine_name, Modality::Text)?;
        let model = self.cache.get_or_load(engine_name)?;
        let vectors = match model.as_ref() {
            LoadedModel::Text(embedder) => embedder.embed_batch(texts)?,
            LoadedModel::Image(_) => {
                return Err(self.wrong_variant(&descriptor));
            }
        };
        vectors
            .into_iter()
            .map(|v| self.ensure_dimension(&descriptor, v))
            .collect()
    }

    /// Embed a decoded image under an image-modality engine
    pub fn embed_image(&self, engine_name: &str, image: &DynamicImage) -> Result<Vector> {
        let descriptor = self.checked_descriptor(engine_name, Modality::Image)?;
        let model = self.cache.get_or_load(engine_name)?;
        let vector = match model.as_ref() {
            LoadedModel::Image(embedder) => embedder.embed(image)?,
            LoadedModel::Text(_) => {
                return Err(self.wrong_variant(&descriptor));
            }
        };
        self.ensure_dimension(&descriptor, vector)
    }

    /// Decode an image file and embed it
    ///
    /// Decode failures surface as `InputDecode` without touching the
    /// cache or any index.
    pub fn embed_image_path(&self, engine_name: &str, path: &Path) -> Result<Vector> {
        // Validate the engine before paying for the decode
        self.checked_descriptor(engine_name, Modality::Image)?;
        let image = image::open(path).map_err(|e| Error::InputDecode {
            cause: format!("{}: {}", path.display(), e),
        })?;
        debug!(path = %path.display(), "decoded image");
        self.embed_image(engine_name, &image)
    }

    /// The registry backing this producer
    pub fn registry(&self) -> &Arc<EngineRegistry> {
        &self.registry
    }

    fn checked_descriptor(
        &self,
        engine_name: &str,
        requested: Modality,
    ) -> Result<EngineDescriptor> {
        let descriptor = self.registry.get(engine_name)?;
        if descriptor.modality != requested {
            return Err(Error::ModalityMismatch {
                name: engine_name.to_string(),
                expected: descriptor.modality,
                requested,
            });
        }
        if !descriptor.supported {
            return Err(Error::UnsupportedEngine {
                name: engine_name.to_string(),
            });
        }
        Ok(descriptor.clone())
    }

    fn ensure_dimension(&self, descriptor: &EngineDescriptor, vector: Vector) -> Result<Vector> {
        if vector.len() != descriptor.dimension {
            return Err(Error::DimensionMismatch {
                expected: descriptor.dimension,
                actual: vector.len(),
            });
        }
        Ok(vector)
    }

    fn wrong_variant(&self, descriptor: &EngineDescriptor) -> Error {
        // Loader returned a model of the wrong modality; a backend bug,
        // not caller error.
        Error::ModelLoad {
            name: descriptor.name.clone(),
            cause: format!(
                "loader produced a model that does not serve {} input",
                descriptor.modality
            ),
        }
    }
}
