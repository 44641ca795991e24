//! Image classifier abstraction.
//!
//! A classifier maps a preprocessed NHWC tensor to per-class probabilities.
//! Label mapping and confidence clamping live here so every backend
//! reports predictions the same way.

pub mod mock;
pub mod onnx;

use ndarray::Array4;

pub use mock::FixedClassifier;
pub use onnx::OnnxClassifier;

/// Synchronous, CPU-bound classifier. Callers run it on the blocking pool.
pub trait ImageClassifier: Send + Sync {
    /// Edge length of the square input the model expects.
    fn input_size(&self) -> u32;

    /// Class probabilities for a `(1, H, W, 3)` tensor.
    fn predict(&self, input: Array4<f32>) -> anyhow::Result<Vec<f32>>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct Prediction {
    pub label: String,
    /// Clamped to 0.0..=1.0.
    pub confidence: f64,
}

/// Arg-max over `probs`. Indices beyond `class_names` are labelled with the
/// index itself. Returns `None` for an empty output.
pub fn top_prediction(probs: &[f32], class_names: &[String]) -> Option<Prediction> {
    let (idx, score) = probs
        .iter()
        .copied()
        .enumerate()
        .filter(|(_, p)| !p.is_nan())
        .max_by(|a, b| a.1.total_cmp(&b.1))?;

    let label = class_names
        .get(idx)
        .cloned()
        .unwrap_or_else(|| idx.to_string());

    Some(Prediction {
        label,
        confidence: clamp_confidence(score as f64),
    })
}

pub fn clamp_confidence(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}
