//! ABOUTME: SpecialisedObject (INSULATOR): overlays a count from a dedicated model.
//! ABOUTME: Every detection the model returns counts; never triggers an event.

use super::{AlarmData, BehaviorPlugin, BehaviorState};
use crate::overlay;
use ag_core::Frame;
use ag_vision::Detection;

pub struct SpecialisedObject {
    model_path: String,
}

impl SpecialisedObject {
    pub fn new(model_path: impl Into<String>) -> Self {
        Self {
            model_path: model_path.into(),
        }
    }
}

impl BehaviorPlugin for SpecialisedObject {
    fn process_frame(
        &self,
        frame: &Frame,
        detections: &[Detection],
        _state: &mut BehaviorState,
    ) -> (Frame, bool) {
        let count = detections.len();
        let annotated = overlay::draw_text(
            frame,
            &format!("Insulators Detected: {count}"),
            10,
            35,
            1,
            (0, 255, 0),
        );
        let banner_x = frame.width().saturating_sub(300);
        let annotated = overlay::draw_text(
            &annotated,
            "Specialized Insulator Model",
            banner_x,
            30,
            1,
            (255, 255, 0),
        );

        let annotated = if count > 0 {
            let status_y = frame.height().saturating_sub(20);
            overlay::draw_text(
                &annotated,
                &format!("Status: {count} insulator(s) monitored"),
                10,
                status_y,
                1,
                (0, 255, 255),
            )
        } else {
            annotated
        };

        (annotated, false)
    }

    fn get_alarm_data(&self, _state: &BehaviorState) -> AlarmData {
        AlarmData::default()
    }

    fn model_path(&self) -> &str {
        &self.model_path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ag_vision::ClassRef;

    fn detection() -> Detection {
        Detection {
            x1: 0.0,
            y1: 0.0,
            x2: 1.0,
            y2: 1.0,
            confidence: 0.8,
            class: ClassRef::Id(0),
        }
    }

    fn frame() -> Frame {
        Frame::packed(vec![0u8; 640 * 480 * 3], 640, 480).unwrap()
    }

    #[test]
    fn never_triggers_an_event() {
        let behavior = SpecialisedObject::new("insulator.pt");
        let mut state = BehaviorState::default();
        let (_, triggered) = behavior.process_frame(&frame(), &[detection()], &mut state);
        assert!(!triggered);
    }

    #[test]
    fn zero_detections_skips_status_line_but_still_overlays_count() {
        let behavior = SpecialisedObject::new("insulator.pt");
        let mut state = BehaviorState::default();
        let input = frame();
        let (annotated, _) = behavior.process_frame(&input, &[], &mut state);
        assert_ne!(annotated.as_bytes(), input.as_bytes());
    }
}
