// ABOUTME: Raw decoded video frame shared by the capture, vision, and pipeline crates.
// ABOUTME: A contiguous BGR8 buffer plus the dimensions needed to interpret it.
use crate::{Error, Result};
use std::sync::Arc;

/// A single decoded video frame: packed BGR8 pixels, row-major, with an
/// explicit stride so callers never have to assume `stride == width * 3`.
///
/// The buffer is held behind an `Arc` so a frame can be cloned cheaply into
/// the rolling buffer, the detector, and the pusher without copying pixels
/// on every hop; a true deep copy (e.g. before handing a frame set to the
/// clip-writer) goes through [`Frame::to_owned_copy`].
#[derive(Debug, Clone)]
pub struct Frame {
    data: Arc<Vec<u8>>,
    width: u32,
    height: u32,
    stride: u32,
}

impl Frame {
    /// Build a frame from a raw BGR8 buffer, validating that it is large
    /// enough to hold `height` rows of `stride` bytes.
    pub fn new(data: Vec<u8>, width: u32, height: u32, stride: u32) -> Result<Self> {
        let required = stride as usize * height as usize;
        if data.len() < required {
            return Err(Error::Validation(format!(
                "frame buffer too small: got {} bytes, need at least {} for {}x{} stride {}",
                data.len(),
                required,
                width,
                height,
                stride
            )));
        }
        Ok(Self {
            data: Arc::new(data),
            width,
            height,
            stride,
        })
    }

    /// Build a frame assuming the tightest possible stride (`width * 3`).
    pub fn packed(data: Vec<u8>, width: u32, height: u32) -> Result<Self> {
        Self::new(data, width, height, width * 3)
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn stride(&self) -> u32 {
        self.stride
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Byte size a single BGR24 frame of these dimensions should occupy,
    /// used by pullers/pushers to size their read/write buffers.
    pub fn expected_byte_len(width: u32, height: u32) -> usize {
        width as usize * height as usize * 3
    }

    /// Produce an independent deep copy of this frame's pixel data. Used
    /// when a frame crosses into the rolling-buffer snapshot handed to the
    /// clip-writer, so later mutation of the live rolling buffer can never
    /// alias memory the clip-writer is reading.
    pub fn to_owned_copy(&self) -> Frame {
        Frame {
            data: Arc::new((*self.data).clone()),
            width: self.width,
            height: self.height,
            stride: self.stride,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_rejects_undersized_buffer() {
        let err = Frame::new(vec![0u8; 10], 4, 4, 12).unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn packed_accepts_exact_buffer() {
        let frame = Frame::packed(vec![0u8; 4 * 4 * 3], 4, 4).unwrap();
        assert_eq!(frame.width(), 4);
        assert_eq!(frame.stride(), 12);
    }

    #[test]
    fn to_owned_copy_does_not_alias() {
        let frame = Frame::packed(vec![1u8; 3 * 1 * 3], 3, 1).unwrap();
        let copy = frame.to_owned_copy();
        assert_eq!(frame.as_bytes(), copy.as_bytes());
        assert!(!Arc::ptr_eq(&frame.data, &copy.data));
    }

    #[test]
    fn expected_byte_len_matches_packed_size() {
        assert_eq!(Frame::expected_byte_len(640, 480), 640 * 480 * 3);
    }
}
