//! ONNX Runtime classifier for the plant-disease model.
//!
//! The Keras model is exported to ONNX (`tf2onnx`) and expects an NHWC float
//! tensor scaled to [0,1]; its single output is a softmax over the classes.

use super::ImageClassifier;
use anyhow::{anyhow, bail, Context, Result};
use ndarray::Array4;
use ort::{
    memory::MemoryInfo,
    session::{builder::GraphOptimizationLevel, Session},
    value::Value,
};
use std::path::Path;
use std::sync::Mutex;
use tracing::info;

/// Classifier backed by an ONNX Runtime session.
///
/// The session sits behind a `Mutex` because `run_binding` needs
/// `&mut Session` while `predict` takes `&self`.
pub struct OnnxClassifier {
    session: Mutex<Session>,
    input_name: String,
    output_name: String,
    input_size: u32,
}

impl OnnxClassifier {
    /// Loads the model eagerly. Blocking; run on the blocking pool.
    pub fn load(model_path: &Path, input_size: u32) -> Result<Self> {
        if !model_path.exists() {
            bail!("Model file not found: {}", model_path.display());
        }

        info!(path = %model_path.display(), "Loading ONNX classifier");

        let session = Session::builder()
            .context("Failed to create ONNX session builder")?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .context("Failed to set optimization level")?
            .with_intra_threads(2)
            .context("Failed to set thread count")?
            .commit_from_file(model_path)
            .with_context(|| format!("Failed to load ONNX model from {:?}", model_path))?;

        let input_name = session
            .inputs()
            .first()
            .map(|i| i.name().to_string())
            .ok_or_else(|| anyhow!("ONNX model declares no inputs"))?;
        let output_name = session
            .outputs()
            .first()
            .map(|o| o.name().to_string())
            .ok_or_else(|| anyhow!("ONNX model declares no outputs"))?;

        info!(
            input = %input_name,
            output = %output_name,
            input_size,
            "ONNX classifier loaded"
        );

        Ok(Self {
            session: Mutex::new(session),
            input_name,
            output_name,
            input_size,
        })
    }
}

impl ImageClassifier for OnnxClassifier {
    fn input_size(&self) -> u32 {
        self.input_size
    }

    fn predict(&self, input: Array4<f32>) -> Result<Vec<f32>> {
        let input_val = Value::from_array(input)
            .context("Failed to create input Value")?
            .into_dyn();

        let mut session = self
            .session
            .lock()
            .map_err(|_| anyhow!("ONNX session mutex poisoned"))?;

        let mut binding = session
            .create_binding()
            .context("Failed to create IoBinding")?;

        binding
            .bind_input(self.input_name.as_str(), &input_val)
            .context("Failed to bind model input")?;

        let mem_info = MemoryInfo::default();
        binding
            .bind_output_to_device(self.output_name.as_str(), &mem_info)
            .context("Failed to bind model output")?;

        let outputs = session
            .run_binding(&binding)
            .context("ONNX inference failed")?;

        let probs = outputs
            .get(self.output_name.as_str())
            .ok_or_else(|| anyhow!("Missing {} in model outputs", self.output_name))?;

        // Shape: [1, num_classes]
        let (shape, data) = probs
            .try_extract_tensor::<f32>()
            .context("Failed to extract output tensor")?;

        if shape.len() != 2 || shape[0] != 1 {
            bail!("Expected [1, num_classes] output, got shape {:?}", shape);
        }

        Ok(data.to_vec())
    }
}
