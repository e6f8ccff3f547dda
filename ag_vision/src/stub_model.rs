//! ABOUTME: Pure-Rust detection model stub: frame passthrough, zero detections
//! ABOUTME: Always available; used when no real inference engine is configured

use crate::{Detection, DetectionModel};
use ag_core::{Frame, Result};

/// A detection model that never detects anything. Exercises the
/// `DetectionModel` boundary and its cache without depending on a real
/// inference engine, which is out of scope to implement here.
pub struct StubModel {
    model_path: String,
}

impl StubModel {
    pub fn new(model_path: impl Into<String>) -> Self {
        Self {
            model_path: model_path.into(),
        }
    }
}

impl DetectionModel for StubModel {
    fn infer(&self, frame: &Frame) -> Result<(Frame, Vec<Detection>)> {
        Ok((frame.clone(), Vec::new()))
    }

    fn model_path(&self) -> &str {
        &self.model_path
    }
}
