//! Engine registry - catalog of available embedding engines
//!
//! Descriptors carry the contract every produced or accepted vector is
//! validated against: modality and dimension. Loadable from a TOML file
//! or seeded from the built-in catalog.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};

/// Input modality an engine accepts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Modality {
    Text,
    Image,
}

impl fmt::Display for Modality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Modality::Text => write!(f, "text"),
            Modality::Image => write!(f, "image"),
        }
    }
}

/// Descriptor for one named embedding engine
///
/// Immutable once registered; looked up by name. Every vector produced
/// or accepted under this engine must have exactly `dimension`
/// components - violations are hard errors, never truncated or padded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineDescriptor {
    #[serde(default)]
    pub name: String,
    pub modality: Modality,
    pub dimension: usize,
    #[serde(default = "default_supported")]
    pub supported: bool,

    /// Explicit model file location; defaults to `<models_dir>/<name>/model.onnx`
    #[serde(default)]
    pub model_path: Option<PathBuf>,
    /// Explicit tokenizer location (text engines only)
    #[serde(default)]
    pub tokenizer_path: Option<PathBuf>,

    /// Download source for `semsift fetch`
    #[serde(default)]
    pub model_url: Option<String>,
    #[serde(default)]
    pub tokenizer_url: Option<String>,

    /// Expected checksums for downloaded files, verified when present
    #[serde(default)]
    pub sha256_model: Option<String>,
    #[serde(default)]
    pub sha256_tokenizer: Option<String>,
}

fn default_supported() -> bool {
    true
}

/// Catalog of embedding engines, looked up by name
#[derive(Debug, Clone)]
pub struct EngineRegistry {
    engines: HashMap<String, EngineDescriptor>,
}

#[derive(Debug, Deserialize)]
struct RegistryFile {
    engines: HashMap<String, EngineDescriptor>,
}

impl EngineRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self {
            engines: HashMap::new(),
        }
    }

    /// Built-in catalog matching the models the CLI knows how to fetch
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        let defaults = [
            EngineDescriptor {
                name: "clip-vit-b-32".to_string(),
                modality: Modality::Image,
                dimension: 512,
                supported: true,
                model_path: None,
                tokenizer_path: None,
                model_url: Some(
                    "https://huggingface.co/Qdrant/clip-ViT-B-32-vision/resolve/main/model.onnx"
                        .to_string(),
                ),
                tokenizer_url: None,
                sha256_model: None,
                sha256_tokenizer: None,
            },
            EngineDescriptor {
                name: "resnet50".to_string(),
                modality: Modality::Image,
                dimension: 2048,
                supported: true,
                model_path: None,
                tokenizer_path: None,
                model_url: Some(
                    "https://huggingface.co/Qdrant/resnet50-onnx/resolve/main/model.onnx"
                        .to_string(),
                ),
                tokenizer_url: None,
                sha256_model: None,
                sha256_tokenizer: None,
            },
            EngineDescriptor {
                name: "unicom-vit-b-16".to_string(),
                modality: Modality::Image,
                dimension: 768,
                supported: true,
                model_path: None,
                tokenizer_path: None,
                model_url: Some(
                    "https://huggingface.co/Qdrant/Unicom-ViT-B-16/resolve/main/model.onnx"
                        .to_string(),
                ),
                tokenizer_url: None,
                sha256_model: None,
                sha256_tokenizer: None,
            },
            EngineDescriptor {
                name: "all-minilm-l6-v2".to_string(),
                modality: Modality::Text,
                dimension: 384,
                supported: true,
                model_path: None,
                tokenizer_path: None,
                model_url: Some(
                    "https://huggingface.co/Xenova/all-MiniLM-L6-v2/resolve/main/onnx/model_quantized.onnx"
                        .to_string(),
                ),
                tokenizer_url: Some(
                    "https://huggingface.co/sentence-transformers/all-MiniLM-L6-v2/resolve/main/tokenizer.json"
                        .to_string(),
                ),
                sha256_model: None,
                sha256_tokenizer: None,
            },
        ];

        for descriptor in defaults {
            // Built-in descriptors are well-formed
            registry
                .insert(descriptor)
                .expect("built-in engine catalog is valid");
        }
        registry
    }

    /// Load a registry from a TOML file with `[engines.<name>]` tables
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| Error::Registry {
            cause: format!("failed to read {}: {}", path.display(), e),
        })?;

        let file: RegistryFile = toml::from_str(&content).map_err(|e| Error::Registry {
            cause: format!("failed to parse {}: {}", path.display(), e),
        })?;

        let mut registry = Self::new();
        for (name, mut descriptor) in file.engines {
            descriptor.name = name;
            registry.insert(descriptor)?;
        }
        Ok(registry)
    }

    /// Register a descriptor, validating its contract
    pub fn insert(&mut self, descriptor: EngineDescriptor) -> Result<()> {
        if descriptor.name.is_empty() {
            return Err(Error::Registry {
                cause: "engine name must not be empty".to_string(),
            });
        }
        if descriptor.dimension == 0 {
            return Err(Error::Registry {
                cause: format!("engine '{}' declares dimension 0", descriptor.name),
            });
        }
        self.engines.insert(descriptor.name.clone(), descriptor);
        Ok(())
    }

    /// Look up a descriptor by name
    pub fn get(&self, name: &str) -> Result<&EngineDescriptor> {
        self.engines.get(name).ok_or_else(|| Error::EngineNotFound {
            name: name.to_string(),
        })
    }

    /// All descriptors, sorted by name
    pub fn list(&self) -> Vec<&EngineDescriptor> {
        let mut engines: Vec<_> = self.engines.values().collect();
        engines.sort_by(|a, b| a.name.cmp(&b.name));
        engines
    }

    pub fn len(&self) -> usize {
        self.engines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.engines.is_empty()
    }
}

impl Default for EngineRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn builtin_catalog_has_both_modalities() {
        let registry = EngineRegistry::builtin();
        assert!(registry.get("clip-vit-b-32").is_ok());
        assert!(registry.get("all-minilm-l6-v2").is_ok());

        let clip = registry.get("clip-vit-b-32").unwrap();
        assert_eq!(clip.modality, Modality::Image);
        assert_eq!(clip.dimension, 512);

        let minilm = registry.get("all-minilm-l6-v2").unwrap();
        assert_eq!(minilm.modality, Modality::Text);
        assert_eq!(minilm.dimension, 384);
    }

    #[test]
    fn unknown_engine_is_a_lookup_error() {
        let registry = EngineRegistry::builtin();
        let err = registry.get("no-such-engine").unwrap_err();
        assert!(matches!(err, Error::EngineNotFound { .. }));
    }

    #[test]
    fn zero_dimension_is_rejected() {
        let mut registry = EngineRegistry::new();
        let err = registry
            .insert(EngineDescriptor {
                name: "broken".to_string(),
                modality: Modality::Text,
                dimension: 0,
                supported: true,
                model_path: None,
                tokenizer_path: None,
                model_url: None,
                tokenizer_url: None,
                sha256_model: None,
                sha256_tokenizer: None,
            })
            .unwrap_err();
        assert!(matches!(err, Error::Registry { .. }));
    }

    #[test]
    fn registry_loads_from_toml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
[engines.test-image]
modality = "image"
dimension = 16

[engines.test-text]
modality = "text"
dimension = 8
supported = false
"#
        )
        .unwrap();

        let registry = EngineRegistry::load(file.path()).unwrap();
        assert_eq!(registry.len(), 2);

        let img = registry.get("test-image").unwrap();
        assert_eq!(img.modality, Modality::Image);
        assert_eq!(img.dimension, 16);
        assert!(img.supported);

        let txt = registry.get("test-text").unwrap();
        assert!(!txt.supported);
    }
}
