//! ONNX Runtime image embedder
//!
//! Resize/center-crop to the vision encoder's input resolution, build an
//! NCHW tensor, run the session, L2-normalize. Works with CLIP-family
//! and ResNet vision encoders exported to ONNX.

use super::onnx_text::l2_normalize;
use super::{ImageEmbedder, Vector};
use crate::error::{Error, Result};
use image::{imageops::FilterType, DynamicImage, GenericImageView};
use ndarray::Array4;
use ort::{inputs, session::Session, value::Value};
use parking_lot::Mutex;
use std::path::Path;

/// Vision encoder input resolution (square), shared by the supported
/// CLIP/ResNet exports
const INPUT_RESOLUTION: u32 = 224;

/// CLIP-style channel normalization constants
const CHANNEL_MEAN: [f32; 3] = [0.481_454_66, 0.457_827_5, 0.408_210_73];
const CHANNEL_STD: [f32; 3] = [0.268_629_54, 0.261_302_58, 0.275_777_11];

/// ONNX-based image embedding backend
pub struct OnnxImageEmbedder {
    session: Mutex<Session>,
    input_name: String,
    output_name: String,
    dimension: usize,
    engine_name: String,
}

impl OnnxImageEmbedder {
    /// Load an image embedder from a vision model file
    pub fn new_from_path(model_path: &Path, engine_name: &str, dimension: usize) -> Result<Self> {
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

        let session = Session::builder()
            .and_then(|builder| builder.commit_from_file(model_path))
            .map_err(|e| Error::ModelLoad {
                name: engine_name.to_string(),
                cause: format!("failed to load ONNX model: {}", e),
            })?;

        let input_name = session
            .inputs
            .first()
            .map(|i| i.name.clone())
            .unwrap_or_else(|| "pixel_values".to_string());
        let output_name = session
            .outputs
            .first()
            .map(|o| o.name.clone())
            .unwrap_or_else(|| "image_embeds".to_string());

        Ok(Self {
            session: Mutex::new(session),
            input_name,
            output_name,
            dimension,
            engine_name: engine_name.to_string(),
        })
    }

    /// Preprocess into NCHW [1, 3, H, W]: shortest edge to the input
    /// resolution, center crop, per-channel normalization.
    fn preprocess(&self, image: &DynamicImage) -> Array4<f32> {
        let size = INPUT_RESOLUTION;
        let (w, h) = image.dimensions();
        let (w, h) = (w.max(1), h.max(1));

        let scale = size as f32 / w.min(h) as f32;
        let new_w = ((w as f32) * scale).round().max(1.0) as u32;
        let new_h = ((h as f32) * scale).round().max(1.0) as u32;
        let resized = image.resize_exact(new_w, new_h, FilterType::Triangle).to_rgb8();

        let start_x = (resized.width().saturating_sub(size)) / 2;
        let start_y = (resized.height().saturating_sub(size)) / 2;

        let mut array = Array4::<f32>::zeros((1, 3, size as usize, size as usize));
        for y in 0..size as usize {
            for x in 0..size as usize {
                let px = resized.get_pixel(
                    (start_x + x as u32).min(resized.width() - 1),
                    (start_y + y as u32).min(resized.height() - 1),
                );
                for c in 0..3 {
                    let value = px[c] as f32 / 255.0;
                    array[[0, c, y, x]] = (value - CHANNEL_MEAN[c]) / CHANNEL_STD[c];
                }
            }
        }

        array
    }

    fn inference_error(&self, cause: impl std::fmt::Display) -> Error {
        Error::ModelLoad {
            name: self.engine_name.clone(),
            cause: cause.to_string(),
        }
    }
}

impl ImageEmbedder for OnnxImageEmbedder {
    fn embed(&self, image: &DynamicImage) -> Result<Vector> {
        let pixel_values = self.preprocess(image);

        let embedding = {
            let mut session = self.session.lock();
            let input = Value::from_array(pixel_values).map_err(|e| self.inference_error(e))?;
            let outputs = session
                .run(inputs![self.input_name.as_str() => input])
                .map_err(|e| self.inference_error(e))?;

            let (_, data) = outputs[self.output_name.as_str()]
                .try_extract_tensor::<f32>()
                .map_err(|e| self.inference_error(e))?;
            data.to_vec()
        };

        if embedding.iter().any(|v| !v.is_finite()) {
            return Err(self.inference_error("embedding contains non-finite values"));
        }

        Ok(l2_normalize(&embedding))
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn engine_name(&self) -> &str {
        &self.engine_name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_model_file_is_load_error() {
        let err = OnnxImageEmbedder::new_from_path(
            Path::new("/nonexistent/model.onnx"),
            "test-engine",
            512,
        )
        .unwrap_err();
        assert!(matches!(err, Error::ModelLoad { .. }));
    }
}
