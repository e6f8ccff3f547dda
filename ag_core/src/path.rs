//! ABOUTME: Path string helpers shared by every crate that persists a video/image path

/// Normalize a path string to forward slashes so paths stored in the
/// database stay portable regardless of the host OS.
pub fn normalize_slashes(path: &str) -> String {
    path.replace('\\', "/")
}
