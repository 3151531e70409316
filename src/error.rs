//! Error taxonomy for the embedding and similarity pipeline
//!
//! Every variant is detected before any cache or index mutation, so a
//! failed call leaves shared state unchanged and is always retryable.

use crate::embeddings::Modality;
use std::time::Duration;

/// Errors that can occur during embedding, indexing, and classification
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Engine name is not present in the registry
    #[error("Embedding engine '{name}' not found in registry")]
    EngineNotFound { name: String },

    /// Engine exists but is flagged as unsupported
    #[error("Embedding engine '{name}' is not supported")]
    UnsupportedEngine { name: String },

    /// Requested operation does not match the engine's modality
    #[error("Engine '{name}' is a {expected} engine, cannot embed {requested} input")]
    ModalityMismatch {
        name: String,
        expected: Modality,
        requested: Modality,
    },

    /// Vector length differs from the engine's declared dimension
    #[error("Vector dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// Raw input could not be decoded into an embeddable form
    #[error("Failed to decode input: {cause}")]
    InputDecode { cause: String },

    /// Model instantiation failed (missing files, bad weights, runtime error)
    #[error("Failed to load model for engine '{name}': {cause}")]
    ModelLoad { name: String, cause: String },

    /// Model instantiation exceeded the configured deadline
    #[error("Loading model for engine '{name}' timed out after {waited:?}")]
    LoadTimeout { name: String, waited: Duration },

    /// Registry file could not be read or parsed
    #[error("Invalid engine registry: {cause}")]
    Registry { cause: String },

    /// Index snapshot store failure
    #[error("Index store error: {0}")]
    Store(#[from] rusqlite::Error),
}

/// Result type for similarity engine operations
pub type Result<T> = std::result::Result<T, Error>;
