//! Fixed-output classifier for tests and local runs without a model file.

use super::ImageClassifier;
use ndarray::Array4;
use std::sync::atomic::{AtomicUsize, Ordering};

pub struct FixedClassifier {
    probabilities: Vec<f32>,
    input_size: u32,
    calls: AtomicUsize,
}

impl FixedClassifier {
    pub fn new(probabilities: Vec<f32>) -> Self {
        Self {
            probabilities,
            input_size: 32,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn with_input_size(mut self, input_size: u32) -> Self {
        self.input_size = input_size;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl ImageClassifier for FixedClassifier {
    fn input_size(&self) -> u32 {
        self.input_size
    }

    fn predict(&self, input: Array4<f32>) -> anyhow::Result<Vec<f32>> {
        let side = self.input_size as usize;
        if input.shape() != [1, side, side, 3] {
            anyhow::bail!("unexpected input shape {:?}", input.shape());
        }
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.probabilities.clone())
    }
}
