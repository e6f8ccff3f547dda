//! ABOUTME: DwellIntrusion (ZHOUJIERUQIN): triggers once a person dwells continuously.
//! ABOUTME: Clears its timer the instant the frame no longer contains a person.

use super::{detection_matches, AlarmData, BehaviorPlugin, BehaviorState};
use ag_core::Frame;
use ag_vision::Detection;
use std::time::Instant;

pub struct DwellIntrusion {
    model_path: String,
    clip_duration_seconds: u64,
}

impl DwellIntrusion {
    pub fn new(model_path: impl Into<String>, clip_duration_seconds: u64) -> Self {
        Self {
            model_path: model_path.into(),
            clip_duration_seconds,
        }
    }
}

impl BehaviorPlugin for DwellIntrusion {
    fn on_start(&self, state: &mut BehaviorState) {
        state.first_seen_at = None;
    }

    fn process_frame(
        &self,
        frame: &Frame,
        detections: &[Detection],
        state: &mut BehaviorState,
    ) -> (Frame, bool) {
        let person_present = detections
            .iter()
            .any(|d| detection_matches(d, &["person".to_string()]));

        let mut event_triggered = false;
        if person_present {
            let first_seen = *state.first_seen_at.get_or_insert_with(Instant::now);
            let dwell = first_seen.elapsed().as_secs_f64();
            if dwell >= self.clip_duration_seconds as f64 {
                event_triggered = true;
            }
        } else {
            // Reset even if a save triggered by this dwell is still in
            // flight: the buffered save is self-contained and completes
            // regardless (§4.7 note in the reference source).
            state.first_seen_at = None;
        }

        (frame.clone(), event_triggered)
    }

    fn on_stop(&self, state: &mut BehaviorState) {
        state.first_seen_at = None;
    }

    fn get_alarm_data(&self, _state: &BehaviorState) -> AlarmData {
        AlarmData {
            desc: format!(
                "Intrusion: continuous person presence >= {} seconds",
                self.clip_duration_seconds
            ),
            state: 0,
            image_path: None,
        }
    }

    fn model_path(&self) -> &str {
        &self.model_path
    }
}
