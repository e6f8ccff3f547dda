//! ABOUTME: ObjectCount (RENSHUTONGJI): overlays a live count of matching detections.
//! ABOUTME: Never triggers an event; purely a visualisation behavior.

use super::{detection_matches, AlarmData, BehaviorPlugin, BehaviorState};
use crate::overlay;
use ag_core::Frame;
use ag_vision::Detection;

pub struct ObjectCount {
    model_path: String,
    target_classes: Vec<String>,
}

impl ObjectCount {
    pub fn new(model_path: impl Into<String>, target_classes: Vec<String>) -> Self {
        let target_classes = if target_classes.is_empty() {
            vec!["person".to_string()]
        } else {
            target_classes
        };
        Self {
            model_path: model_path.into(),
            target_classes,
        }
    }

    fn is_default_person_only(&self) -> bool {
        self.target_classes.len() == 1 && self.target_classes[0].eq_ignore_ascii_case("person")
    }
}

impl BehaviorPlugin for ObjectCount {
    fn process_frame(
        &self,
        frame: &Frame,
        detections: &[Detection],
        _state: &mut BehaviorState,
    ) -> (Frame, bool) {
        let count = detections
            .iter()
            .filter(|d| detection_matches(d, &self.target_classes))
            .count();

        let count_text = if self.is_default_person_only() {
            format!("People Count: {count}")
        } else {
            format!("{} Count: {count}", self.target_classes.join("/"))
        };
        let annotated = overlay::draw_text(frame, &count_text, 10, 30, 1, (0, 255, 0));

        let banner = format!("Classes: {}", self.target_classes.join(", "));
        let banner_x = frame.width().saturating_sub(300);
        let annotated = overlay::draw_text(&annotated, &banner, banner_x, 30, 1, (255, 255, 0));

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

    fn person_detection() -> Detection {
        Detection {
            x1: 0.0,
            y1: 0.0,
            x2: 1.0,
            y2: 1.0,
            confidence: 0.9,
            class: ClassRef::Name("person".into()),
        }
    }

    fn frame() -> Frame {
        Frame::packed(vec![0u8; 640 * 480 * 3], 640, 480).unwrap()
    }

    #[test]
    fn never_triggers_an_event() {
        let behavior = ObjectCount::new("m.pt", vec!["person".into()]);
        let mut state = BehaviorState::default();
        let (_, triggered) = behavior.process_frame(
            &frame(),
            &[person_detection(), person_detection(), person_detection()],
            &mut state,
        );
        assert!(!triggered);
    }

    #[test]
    fn overlay_changes_the_frame_bytes() {
        let behavior = ObjectCount::new("m.pt", vec!["person".into()]);
        let mut state = BehaviorState::default();
        let input = frame();
        let (annotated, _) = behavior.process_frame(&input, &[person_detection()], &mut state);
        assert_ne!(annotated.as_bytes(), input.as_bytes());
        assert_eq!(annotated.width(), input.width());
        assert_eq!(annotated.height(), input.height());
    }

    #[test]
    fn defaults_to_person_when_class_list_empty() {
        let behavior = ObjectCount::new("m.pt", vec![]);
        assert!(behavior.is_default_person_only());
    }

    #[test]
    fn count_ignores_non_matching_detections() {
        let other = Detection {
            x1: 0.0,
            y1: 0.0,
            x2: 1.0,
            y2: 1.0,
            confidence: 0.9,
            class: ClassRef::Name("car".into()),
        };
        let behavior = ObjectCount::new("m.pt", vec!["person".into()]);
        let mut state = BehaviorState::default();
        let count = [person_detection(), other]
            .iter()
            .filter(|d| detection_matches(d, &behavior.target_classes))
            .count();
        assert_eq!(count, 1);
        let _ = behavior.process_frame(&frame(), &[], &mut state);
    }
}
