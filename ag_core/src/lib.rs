//! ABOUTME: Core types, errors, IDs, and tracing utilities
//! ABOUTME: Foundation crate used by every other component of the service

pub mod error;
pub mod frame;
pub mod id;
pub mod path;
pub mod telemetry;
pub mod time;

pub use error::{Error, Result};
pub use frame::Frame;
pub use id::Id;
pub use path::normalize_slashes;
pub use time::{now_for_alarm_id, now_like_sql, to_rfc3339, utc_now, MonotonicTimer};

#[cfg(test)]
mod tests {
    use test_support::create_test_id;

    #[test]
    fn test_cross_crate_usage() {
        let test_id = create_test_id();
        assert_eq!(test_id, "test-id-123");
    }
}
