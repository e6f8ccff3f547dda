//! ABOUTME: Detection-model boundary with a pure-Rust stub and optional OpenCV backend
//! ABOUTME: Defines the frame-to-detections interface and its process-wide model cache

use ag_core::{Frame, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, OnceLock};
use tracing::{debug, info};
#[cfg(feature = "heavy_opencv")]
use tracing::warn;

#[cfg(feature = "heavy_opencv")]
pub mod opencv_model;
pub mod stub_model;

#[cfg(feature = "heavy_opencv")]
pub use opencv_model::OpenCvModel;
pub use stub_model::StubModel;

/// A class reference in a detection: either a fixed class id (closed-set
/// models) or an open-vocabulary class name (e.g. YOLO-World style models
/// driven by a configured class list).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClassRef {
    Id(u32),
    Name(String),
}

impl std::fmt::Display for ClassRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ClassRef::Id(id) => write!(f, "{id}"),
            ClassRef::Name(name) => write!(f, "{name}"),
        }
    }
}

/// One raw model output: an axis-aligned bounding box plus confidence and
/// class, matching the original engine's `{x1,y1,x2,y2,confidence,
/// classIdOrName}` shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Detection {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
    pub confidence: f32,
    pub class: ClassRef,
}

impl Detection {
    pub fn class_name(&self) -> String {
        self.class.to_string()
    }

    pub fn is_class(&self, name: &str) -> bool {
        matches!(&self.class, ClassRef::Name(n) if n == name)
    }
}

/// The pluggable boundary described as "frame -> detections" in the
/// specification: never implemented here beyond this interface and a
/// pure-Rust stub, since the model's internals are out of scope.
pub trait DetectionModel: Send + Sync {
    /// Run inference on `frame`, returning a (possibly annotated) frame and
    /// the raw detections found. Implementations that don't draw anything
    /// on the frame themselves should return it unchanged.
    fn infer(&self, frame: &Frame) -> Result<(Frame, Vec<Detection>)>;

    /// Identifier used in logs and cache diagnostics.
    fn model_path(&self) -> &str;
}

/// Key identifying a loaded model instance: its path/identifier plus the
/// open-vocabulary class list it was configured with (empty for
/// closed-set models), matching the shared-resource policy in the
/// concurrency section.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ModelKey {
    pub model_path: String,
    pub class_list: Vec<String>,
}

impl ModelKey {
    pub fn new(model_path: impl Into<String>, mut class_list: Vec<String>) -> Self {
        class_list.sort();
        Self {
            model_path: model_path.into(),
            class_list,
        }
    }
}

type ModelCache = Mutex<HashMap<ModelKey, Arc<dyn DetectionModel>>>;

fn model_cache() -> &'static ModelCache {
    static CACHE: OnceLock<ModelCache> = OnceLock::new();
    CACHE.get_or_init(|| Mutex::new(HashMap::new()))
}

/// Load (or return a cached handle to) the detection model identified by
/// `key`. Every Control sharing a `(model_path, class_list)` pair reuses
/// the same loaded instance process-wide.
pub fn load_model(key: ModelKey) -> Arc<dyn DetectionModel> {
    let mut cache = model_cache().lock().expect("model cache mutex poisoned");
    if let Some(existing) = cache.get(&key) {
        debug!(model_path = %key.model_path, "reusing cached detection model");
        return Arc::clone(existing);
    }

    info!(model_path = %key.model_path, "loading detection model");
    let model: Arc<dyn DetectionModel> = build_model(&key.model_path);
    cache.insert(key, Arc::clone(&model));
    model
}

#[cfg(feature = "heavy_opencv")]
fn build_model(model_path: &str) -> Arc<dyn DetectionModel> {
    match OpenCvModel::new(model_path) {
        Ok(model) => Arc::new(model),
        Err(e) => {
            warn!(model_path = %model_path, error = %e, "opencv model load failed, falling back to stub");
            Arc::new(StubModel::new(model_path.to_string()))
        }
    }
}

#[cfg(not(feature = "heavy_opencv"))]
fn build_model(model_path: &str) -> Arc<dyn DetectionModel> {
    Arc::new(StubModel::new(model_path.to_string()))
}

/// Remove every cached model. Exists for test isolation; production code
/// never needs to evict the cache.
pub fn clear_model_cache() {
    model_cache().lock().expect("model cache mutex poisoned").clear();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn model_key_ignores_class_list_order() {
        let a = ModelKey::new("m.pt", vec!["b".into(), "a".into()]);
        let b = ModelKey::new("m.pt", vec!["a".into(), "b".into()]);
        assert_eq!(a, b);
    }

    #[test]
    fn load_model_caches_by_key() {
        clear_model_cache();
        let key = ModelKey::new("cache-test.pt", vec![]);
        let first = load_model(key.clone());
        let second = load_model(key);
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn load_model_distinguishes_different_keys() {
        clear_model_cache();
        let a = load_model(ModelKey::new("model-a.pt", vec![]));
        let b = load_model(ModelKey::new("model-b.pt", vec![]));
        assert!(!Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn detection_is_class_matches_name_variant() {
        let det = Detection {
            x1: 0.0,
            y1: 0.0,
            x2: 1.0,
            y2: 1.0,
            confidence: 0.9,
            class: ClassRef::Name("person".to_string()),
        };
        assert!(det.is_class("person"));
        assert!(!det.is_class("car"));
    }
}
