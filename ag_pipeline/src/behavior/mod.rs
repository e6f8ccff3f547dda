//! ABOUTME: Behavior plug-in contract and the static registry of reference behaviors.
//! ABOUTME: A plug-in interprets detections per frame and decides when to trigger a clip.

pub mod dwell_intrusion;
pub mod object_count;
pub mod specialised_object;

use ag_core::{Error, Frame, Result};
use ag_vision::Detection;
use std::time::Instant;

/// Per-control mutable bag, owned and mutated exclusively by the Detector
/// task. Behaviors stash their own fields here instead of holding interior
/// mutability themselves, so a plug-in instance can be shared (it holds no
/// per-control state of its own) while still being "stateful" per control.
#[derive(Debug, Default)]
pub struct BehaviorState {
    /// DwellIntrusion's running dwell timer.
    pub first_seen_at: Option<Instant>,
}

/// Fields a behavior returns just before the Detector spawns a Clip-writer.
#[derive(Debug, Clone)]
pub struct AlarmData {
    pub desc: String,
    pub state: i64,
    pub image_path: Option<String>,
}

impl Default for AlarmData {
    fn default() -> Self {
        Self {
            desc: "event detected".to_string(),
            state: 0,
            image_path: None,
        }
    }
}

/// The narrow interface every behavior plug-in implements (§4.3). A single
/// instance is shared across every Control configured with that behavior
/// code; all per-control state lives in the caller-owned `BehaviorState`.
pub trait BehaviorPlugin: Send + Sync {
    /// Initialise per-control fields in `state`. Optional; default is a no-op.
    fn on_start(&self, _state: &mut BehaviorState) {}

    /// Inspect `detections` for `frame`, returning a possibly-annotated
    /// frame of the same dimensions and whether an event fired.
    fn process_frame(
        &self,
        frame: &Frame,
        detections: &[Detection],
        state: &mut BehaviorState,
    ) -> (Frame, bool);

    /// Release any behavior-owned resources. Optional; default is a no-op.
    fn on_stop(&self, _state: &mut BehaviorState) {}

    /// Descriptive fields to persist with the triggered alarm.
    fn get_alarm_data(&self, _state: &BehaviorState) -> AlarmData {
        AlarmData::default()
    }

    /// The model path this behavior was configured to run against.
    fn model_path(&self) -> &str;
}

/// True if `detection`'s class matches one of `target_classes`: by name
/// (case-insensitive) for open-vocabulary models, or by id 0 (assumed
/// "person") for closed-set models, mirroring the reference behaviors'
/// shared matching rule.
pub(crate) fn detection_matches(detection: &Detection, target_classes: &[String]) -> bool {
    match &detection.class {
        ag_vision::ClassRef::Name(name) => target_classes
            .iter()
            .any(|target| target.eq_ignore_ascii_case(name)),
        ag_vision::ClassRef::Id(id) => *id == 0,
    }
}

/// Build the configured plug-in for `behavior_code`. Returns
/// `Error::Validation` for an unknown code, which is fatal at `add` time
/// (§7: "Behavior configuration unknown ... fatal at add time").
pub fn build_plugin(
    behavior_code: &str,
    model_path: &str,
    class_list: Vec<String>,
    clip_duration_seconds: u64,
) -> Result<Box<dyn BehaviorPlugin>> {
    match behavior_code {
        "ZHOUJIERUQIN" => Ok(Box::new(dwell_intrusion::DwellIntrusion::new(
            model_path,
            clip_duration_seconds,
        ))),
        "RENSHUTONGJI" => Ok(Box::new(object_count::ObjectCount::new(
            model_path, class_list,
        ))),
        "INSULATOR" => Ok(Box::new(specialised_object::SpecialisedObject::new(
            model_path,
        ))),
        other => Err(Error::Validation(format!(
            "unknown behavior code: {other}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_plugin_rejects_unknown_code() {
        let err = build_plugin("NOT_A_BEHAVIOR", "model.pt", vec![], 3).unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn build_plugin_accepts_every_reference_behavior() {
        assert!(build_plugin("ZHOUJIERUQIN", "m.pt", vec![], 3).is_ok());
        assert!(build_plugin("RENSHUTONGJI", "m.pt", vec!["person".into()], 3).is_ok());
        assert!(build_plugin("INSULATOR", "m.pt", vec![], 3).is_ok());
    }
}
