//! Face-mesh landmark extraction via ONNX Runtime.
//!
//! Runs a 478-point refined face-mesh model (468 surface points plus iris
//! rings) on a letterboxed RGB frame and maps the landmarks back to
//! normalized frame coordinates.

use crate::landmarks::{Landmark, LandmarkSet, FACE_MESH_POINTS};
use image::imageops::FilterType;
use image::RgbImage;
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;
use thiserror::Error;

const FACE_MESH_INPUT_SIZE: usize = 256;
const FACE_MESH_PIXEL_SCALE: f32 = 255.0;
const FACE_MESH_PRESENCE_THRESHOLD: f32 = 0.5;
const FACE_MESH_VALUES: usize = FACE_MESH_POINTS * 3;

#[derive(Error, Debug)]
pub enum ExtractorError {
    #[error("model file not found: {0}")]
    ModelNotFound(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// Source of per-frame face landmarks. `Ok(None)` means no face was found.
pub trait LandmarkExtractor: Send {
    fn extract(&mut self, image: &RgbImage) -> Result<Option<LandmarkSet>, ExtractorError>;
}

/// Metadata for coordinate de-mapping after letterbox resize.
#[derive(Debug, Clone, Copy)]
struct LetterboxInfo {
    scale: f32,
    pad_x: f32,
    pad_y: f32,
}

impl LetterboxInfo {
    fn for_frame(width: u32, height: u32, input: usize) -> Self {
        let scale = (input as f32 / width as f32).min(input as f32 / height as f32);
        let new_w = (width as f32 * scale).round();
        let new_h = (height as f32 * scale).round();
        Self {
            scale,
            pad_x: (input as f32 - new_w) / 2.0,
            pad_y: (input as f32 - new_h) / 2.0,
        }
    }
}

/// Face-mesh model wrapper.
pub struct FaceMeshExtractor {
    session: Session,
    input_size: usize,
    /// Input layout: NHWC for models converted from TFLite, NCHW otherwise.
    channels_last: bool,
}

impl FaceMeshExtractor {
    /// Load the face-mesh ONNX model from the given path.
    pub fn load(model_path: &str, channels_last: bool) -> Result<Self, ExtractorError> {
        if !Path::new(model_path).exists() {
            return Err(ExtractorError::ModelNotFound(model_path.to_string()));
        }

        let session = Session::builder()?
            .with_intra_threads(2)?
            .commit_from_file(model_path)?;

        tracing::info!(
            path = model_path,
            inputs = ?session.inputs().iter().map(|i| (i.name(), i.dtype())).collect::<Vec<_>>(),
            outputs = ?session.outputs().iter().map(|o| o.name()).collect::<Vec<_>>(),
            channels_last,
            "loaded face mesh model"
        );

        Ok(Self {
            session,
            input_size: FACE_MESH_INPUT_SIZE,
            channels_last,
        })
    }

    /// Letterbox the frame into a normalized [0, 1] float tensor.
    fn preprocess(&self, image: &RgbImage) -> (Array4<f32>, LetterboxInfo) {
        let letterbox = LetterboxInfo::for_frame(image.width(), image.height(), self.input_size);
        let new_w = ((image.width() as f32 * letterbox.scale).round() as u32).max(1);
        let new_h = ((image.height() as f32 * letterbox.scale).round() as u32).max(1);
        let resized = image::imageops::resize(image, new_w, new_h, FilterType::Triangle);

        let size = self.input_size;
        let mut tensor = if self.channels_last {
            Array4::<f32>::zeros((1, size, size, 3))
        } else {
            Array4::<f32>::zeros((1, 3, size, size))
        };

        let x0 = letterbox.pad_x.floor() as usize;
        let y0 = letterbox.pad_y.floor() as usize;
        for (x, y, pixel) in resized.enumerate_pixels() {
            let (tx, ty) = (x0 + x as usize, y0 + y as usize);
            if tx >= size || ty >= size {
                continue;
            }
            for c in 0..3 {
                let value = pixel.0[c] as f32 / FACE_MESH_PIXEL_SCALE;
                if self.channels_last {
                    tensor[[0, ty, tx, c]] = value;
                } else {
                    tensor[[0, c, ty, tx]] = value;
                }
            }
        }

        (tensor, letterbox)
    }
}

impl LandmarkExtractor for FaceMeshExtractor {
    fn extract(&mut self, image: &RgbImage) -> Result<Option<LandmarkSet>, ExtractorError> {
        let (input, letterbox) = self.preprocess(image);
        let (width, height) = image.dimensions();

        let outputs = self.session.run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let mut tensors = Vec::with_capacity(outputs.len());
        for i in 0..outputs.len() {
            let (_, data) = outputs[i]
                .try_extract_tensor::<f32>()
                .map_err(|e| ExtractorError::InferenceFailed(format!("output {i}: {e}")))?;
            tensors.push(data);
        }

        let sizes: Vec<usize> = tensors.iter().map(|t| t.len()).collect();
        let (landmark_idx, score_idx) = discover_outputs(&sizes).ok_or_else(|| {
            ExtractorError::InferenceFailed(format!(
                "no landmark tensor with {FACE_MESH_VALUES} values among outputs {sizes:?}"
            ))
        })?;

        if let Some(idx) = score_idx {
            let presence = sigmoid(tensors[idx][0]);
            if presence < FACE_MESH_PRESENCE_THRESHOLD {
                tracing::trace!(presence, "no face in frame");
                return Ok(None);
            }
        }

        let points = decode_landmarks(tensors[landmark_idx], &letterbox, width, height);
        LandmarkSet::new(points)
            .map(Some)
            .map_err(|e| ExtractorError::InferenceFailed(e.to_string()))
    }
}

/// Pick the landmark tensor (at least 478 x 3 values) and the optional
/// single-value presence score from the output element counts.
fn discover_outputs(sizes: &[usize]) -> Option<(usize, Option<usize>)> {
    let landmarks = sizes.iter().position(|&n| n >= FACE_MESH_VALUES)?;
    let score = sizes.iter().position(|&n| n == 1);
    Some((landmarks, score))
}

fn sigmoid(logit: f32) -> f32 {
    1.0 / (1.0 + (-logit).exp())
}

/// Map model-space (x, y, z) triples back to normalized frame coordinates.
/// Depth is scaled like x so it stays comparable to the horizontal axis.
fn decode_landmarks(
    raw: &[f32],
    letterbox: &LetterboxInfo,
    width: u32,
    height: u32,
) -> Vec<Landmark> {
    raw.chunks_exact(3)
        .take(FACE_MESH_POINTS)
        .map(|p| {
            let x = (p[0] - letterbox.pad_x) / letterbox.scale;
            let y = (p[1] - letterbox.pad_y) / letterbox.scale;
            let z = p[2] / letterbox.scale;
            Landmark::new(x / width as f32, y / height as f32, z / width as f32)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_letterbox_landscape() {
        let lb = LetterboxInfo::for_frame(640, 480, 256);
        assert!((lb.scale - 0.4).abs() < 1e-6);
        assert!(lb.pad_x.abs() < 1e-6);
        assert!((lb.pad_y - 32.0).abs() < 1e-6);
    }

    #[test]
    fn test_decode_landmarks_roundtrip() {
        let lb = LetterboxInfo::for_frame(640, 480, 256);
        // Frame point (320, 240) maps to (128, 128) in model space.
        let mut raw = vec![0.0f32; FACE_MESH_VALUES];
        raw[0] = 320.0 * lb.scale + lb.pad_x;
        raw[1] = 240.0 * lb.scale + lb.pad_y;
        raw[2] = 8.0;
        let points = decode_landmarks(&raw, &lb, 640, 480);
        assert_eq!(points.len(), FACE_MESH_POINTS);
        assert!((points[0].x - 0.5).abs() < 1e-5, "x: {}", points[0].x);
        assert!((points[0].y - 0.5).abs() < 1e-5, "y: {}", points[0].y);
        assert!((points[0].z - 20.0 / 640.0).abs() < 1e-6);
    }

    #[test]
    fn test_discover_outputs() {
        assert_eq!(discover_outputs(&[1434, 1]), Some((0, Some(1))));
        assert_eq!(discover_outputs(&[1, 1, 1434]), Some((2, Some(0))));
        assert_eq!(discover_outputs(&[1434]), Some((0, None)));
        assert_eq!(discover_outputs(&[1404, 1]), None);
    }

    #[test]
    fn test_sigmoid_threshold() {
        assert!((sigmoid(0.0) - 0.5).abs() < 1e-6);
        assert!(sigmoid(-4.0) < FACE_MESH_PRESENCE_THRESHOLD);
        assert!(sigmoid(4.0) > FACE_MESH_PRESENCE_THRESHOLD);
    }

    #[test]
    fn test_missing_model() {
        let err = FaceMeshExtractor::load("/nonexistent/face_mesh.onnx", true).err().unwrap();
        assert!(matches!(err, ExtractorError::ModelNotFound(_)));
    }
}
