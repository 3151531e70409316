//! ONNX Runtime text embedder
//!
//! Tokenize, run the transformer, mean-pool over the attention mask,
//! L2-normalize. Works with sentence-transformer style models exported
//! to ONNX (MiniLM, BGE, E5).

use super::{TextEmbedder, Vector};
use crate::error::{Error, Result};
use ndarray::Array2;
use ort::{inputs, session::Session, value::Value};
use parking_lot::Mutex;
use std::path::Path;
use tokenizers::Tokenizer;

/// ONNX-based text embedding backend
///
/// The session requires mutable access to run inference, so it sits
/// behind a lock; the embedder itself is shared immutably from the
/// model cache.
pub struct OnnxTextEmbedder {
    session: Mutex<Session>,
    tokenizer: Tokenizer,
    dimension: usize,
    engine_name: String,
}

impl OnnxTextEmbedder {
    /// Load a text embedder from model and tokenizer files
    pub fn new_from_paths(
        model_path: &Path,
        tokenizer_path: &Path,
        engine_name: &str,
        dimension: usize,
    ) -> Result<Self> {
        if !model_path.exists() {
            return Err(Error::ModelLoad {
                name: engine_name.to_string(),
                cause: format!(
                    "model file not found at {} (run `semsift fetch {}`)",
                    model_path.display(),
                    engine_name
                ),
            });
        }
        if !tokenizer_path.exists() {
            return Err(Error::ModelLoad {
                name: engine_name.to_string(),
                cause: format!(
                    "tokenizer not found at {} (run `semsift fetch {}`)",
                    tokenizer_path.display(),
                    engine_name
                ),
            });
        }

        let session = Session::builder()
            .and_then(|builder| builder.commit_from_file(model_path))
            .map_err(|e| Error::ModelLoad {
                name: engine_name.to_string(),
                cause: format!("failed to load ONNX model: {}", e),
            })?;

        let mut tokenizer = Tokenizer::from_file(tokenizer_path).map_err(|e| Error::ModelLoad {
            name: engine_name.to_string(),
            cause: format!("failed to load tokenizer: {}", e),
        })?;

        // Truncate to the transformer's sequence limit; longer inputs
        // would fail inside the ONNX graph with a broadcast error.
        tokenizer
            .with_truncation(Some(tokenizers::TruncationParams {
                max_length: 512,
                ..Default::default()
            }))
            .map_err(|e| Error::ModelLoad {
                name: engine_name.to_string(),
                cause: format!("failed to configure truncation: {}", e),
            })?;

        Ok(Self {
            session: Mutex::new(session),
            tokenizer,
            dimension,
            engine_name: engine_name.to_string(),
        })
    }

    fn tokenize(&self, text: &str) -> Result<(Vec<i64>, Vec<i64>)> {
        let encoding = self
            .tokenizer
            .encode(text, true)
            .map_err(|e| Error::InputDecode {
                cause: format!("tokenization failed: {}", e),
            })?;

        let input_ids = encoding.get_ids().iter().map(|&x| x as i64).collect();
        let attention_mask = encoding
            .get_attention_mask()
            .iter()
            .map(|&x| x as i64)
            .collect();

        Ok((input_ids, attention_mask))
    }

    /// Mean pooling - average token embeddings weighted by attention mask
    fn mean_pool(&self, token_embeddings: &Array2<f32>, attention_mask: &[i64]) -> Vector {
        let mask_sum: f32 = attention_mask.iter().map(|&x| x as f32).sum();
        if mask_sum == 0.0 {
            return vec![0.0; self.dimension];
        }

        let hidden = token_embeddings.ncols();
        let mut pooled = vec![0.0; hidden];
        for (i, &mask) in attention_mask.iter().enumerate() {
            if mask == 1 && i < token_embeddings.nrows() {
                for (j, value) in pooled.iter_mut().enumerate() {
                    *value += token_embeddings[[i, j]];
                }
            }
        }

        pooled.iter().map(|&x| x / mask_sum).collect()
    }

    fn inference_error(&self, cause: impl std::fmt::Display) -> Error {
        Error::ModelLoad {
            name: self.engine_name.clone(),
            cause: cause.to_string(),
        }
    }
}

impl TextEmbedder for OnnxTextEmbedder {
    fn embed(&self, text: &str) -> Result<Vector> {
        let (input_ids, attention_mask) = self.tokenize(text)?;

        let seq_len = input_ids.len();
        let input_ids_array = Array2::from_shape_vec((1, seq_len), input_ids)
            .map_err(|e| self.inference_error(e))?;
        let attention_mask_array = Array2::from_shape_vec((1, seq_len), attention_mask.clone())
            .map_err(|e| self.inference_error(e))?;
        // All zeros for single-sentence embeddings
        let token_type_ids_array = Array2::from_shape_vec((1, seq_len), vec![0i64; seq_len])
            .map_err(|e| self.inference_error(e))?;

        let token_embeddings = {
            let mut session = self.session.lock();
            let outputs = session
                .run(inputs![
                    "input_ids" => Value::from_array(input_ids_array)
                        .map_err(|e| self.inference_error(e))?,
                    "attention_mask" => Value::from_array(attention_mask_array)
                        .map_err(|e| self.inference_error(e))?,
                    "token_type_ids" => Value::from_array(token_type_ids_array)
                        .map_err(|e| self.inference_error(e))?
                ])
                .map_err(|e| self.inference_error(e))?;

            let (shape, data) = outputs["last_hidden_state"]
                .try_extract_tensor::<f32>()
                .map_err(|e| self.inference_error(e))?;

            // Shape is [batch=1, seq_len, hidden]
            let dims = shape.as_ref();
            if dims.len() != 3 {
                return Err(self.inference_error(format!("expected 3D output, got {:?}", dims)));
            }

            let out_seq = dims[1] as usize;
            let hidden = dims[2] as usize;
            Array2::from_shape_vec((out_seq, hidden), data[0..out_seq * hidden].to_vec())
                .map_err(|e| self.inference_error(e))?
        };

        let pooled = self.mean_pool(&token_embeddings, &attention_mask);
        Ok(l2_normalize(&pooled))
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn engine_name(&self) -> &str {
        &self.engine_name
    }
}

/// L2-normalize a vector, leaving zero vectors unchanged
pub(crate) fn l2_normalize(vector: &[f32]) -> Vector {
    let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm == 0.0 {
        return vector.to_vec();
    }
    vector.iter().map(|x| x / norm).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_l2_normalize_unit_norm() {
        let normalized = l2_normalize(&[3.0, 4.0]);
        assert_relative_eq!(normalized[0], 0.6, epsilon = 1e-6);
        assert_relative_eq!(normalized[1], 0.8, epsilon = 1e-6);

        let norm: f32 = normalized.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert_relative_eq!(norm, 1.0, epsilon = 1e-6);
    }

    #[test]
    fn test_l2_normalize_zero_vector() {
        assert_eq!(l2_normalize(&[0.0, 0.0]), vec![0.0, 0.0]);
    }

    #[test]
    fn test_missing_model_file_is_load_error() {
        let err = OnnxTextEmbedder::new_from_paths(
            Path::new("/nonexistent/model.onnx"),
            Path::new("/nonexistent/tokenizer.json"),
            "test-engine",
            384,
        )
        .unwrap_err();
        assert!(matches!(err, Error::ModelLoad { .. }));
    }
}
