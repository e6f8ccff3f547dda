//! ABOUTME: Bounded FIFO of recent annotated frames, owned exclusively by the Detector.
//! ABOUTME: Snapshots are deep copies so the Clip-writer never races live mutation.

use ag_core::Frame;
use std::collections::VecDeque;

pub struct RollingBuffer {
    frames: VecDeque<Frame>,
    capacity: usize,
}

impl RollingBuffer {
    /// Capacity = `ceil(inputFps * clipDurationSeconds * 1.5)`, minimum 1.
    pub fn sized_for(input_fps: f64, clip_duration_seconds: u64) -> Self {
        let raw = (input_fps * clip_duration_seconds as f64 * 1.5).ceil();
        let capacity = if raw.is_finite() && raw >= 1.0 {
            raw as usize
        } else {
            1
        };
        Self {
            frames: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Append a frame, dropping the oldest entry if at capacity. Callers
    /// pass an already-copied frame (the Detector appends a copy of the
    /// annotated frame, per §4.5 step 5).
    pub fn push(&mut self, frame: Frame) {
        if self.frames.len() >= self.capacity {
            self.frames.pop_front();
        }
        self.frames.push_back(frame);
    }

    /// Deep-copy every frame currently held into an independent Vec, so the
    /// live buffer can keep mutating without aliasing the Clip-writer's
    /// input (§5 Memory).
    pub fn snapshot(&self) -> Vec<Frame> {
        self.frames.iter().map(Frame::to_owned_copy).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(byte: u8) -> Frame {
        Frame::packed(vec![byte; 2 * 2 * 3], 2, 2).unwrap()
    }

    #[test]
    fn sized_for_rounds_up_and_enforces_minimum() {
        assert_eq!(RollingBuffer::sized_for(25.0, 3).capacity(), 113); // 25*3*1.5 = 112.5 -> 113
        assert_eq!(RollingBuffer::sized_for(0.0, 3).capacity(), 1);
        assert_eq!(RollingBuffer::sized_for(-5.0, 3).capacity(), 1);
    }

    #[test]
    fn push_evicts_oldest_at_capacity() {
        let mut buf = RollingBuffer::sized_for(1.0, 1); // capacity 2
        assert_eq!(buf.capacity(), 2);
        buf.push(frame(1));
        buf.push(frame(2));
        buf.push(frame(3));
        assert_eq!(buf.len(), 2);
        let snap = buf.snapshot();
        assert_eq!(snap[0].as_bytes()[0], 2);
        assert_eq!(snap[1].as_bytes()[0], 3);
    }

    #[test]
    fn snapshot_is_independent_of_live_buffer() {
        let mut buf = RollingBuffer::sized_for(10.0, 1);
        buf.push(frame(9));
        let snap = buf.snapshot();
        buf.push(frame(1));
        buf.push(frame(2));
        assert_eq!(snap.len(), 1);
        assert_eq!(snap[0].as_bytes()[0], 9);
    }
}
