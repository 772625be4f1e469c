//! Throughput classification for the download speed test.

use std::fmt;
use std::time::Duration;

/// Size of the reference download (10 MiB).
pub const SPEED_TEST_BYTES: u64 = 10 * 1024 * 1024;

/// Transfers shorter than this are reported as unmeasurable.
const MIN_MEASURABLE: Duration = Duration::from_millis(100);

const BITS_PER_MEGABIT: f64 = 1024.0 * 1024.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SpeedResult {
    /// Throughput in megabits per second, rounded to two decimals
    Measured { mbps: f64 },
    TooFast,
    TimedOut,
    Failed,
}

impl fmt::Display for SpeedResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SpeedResult::Measured { mbps } => write!(f, "{:.2} Mbps", mbps),
            SpeedResult::TooFast => write!(f, "Test too fast to measure."),
            SpeedResult::TimedOut => write!(f, "Test timed out."),
            SpeedResult::Failed => write!(f, "Speed test failed."),
        }
    }
}

/// `(bytes * 8) / seconds / 1,048,576`
pub fn throughput_mbps(bytes: u64, elapsed: Duration) -> f64 {
    (bytes as f64 * 8.0) / elapsed.as_secs_f64() / BITS_PER_MEGABIT
}

/// Classify a completed transfer of `bytes` that took `elapsed`.
pub fn classify_transfer(bytes: u64, elapsed: Duration) -> SpeedResult {
    if elapsed < MIN_MEASURABLE {
        return SpeedResult::TooFast;
    }
    let mbps = (throughput_mbps(bytes, elapsed) * 100.0).round() / 100.0;
    SpeedResult::Measured { mbps }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reference_transfer_in_two_seconds() {
        let elapsed = Duration::from_secs(2);
        let expected = (SPEED_TEST_BYTES as f64 * 8.0) / 2.0 / 1_048_576.0;
        let result = classify_transfer(SPEED_TEST_BYTES, elapsed);
        assert_eq!(result, SpeedResult::Measured { mbps: expected });
        assert_eq!(result.to_string(), format!("{:.2} Mbps", expected));
        assert_eq!(result.to_string(), "40.00 Mbps");
    }

    #[test]
    fn test_rounds_to_two_decimals() {
        let result = classify_transfer(SPEED_TEST_BYTES, Duration::from_secs(3));
        assert_eq!(result, SpeedResult::Measured { mbps: 26.67 });
        assert_eq!(result.to_string(), "26.67 Mbps");
    }

    #[test]
    fn test_too_fast_below_threshold() {
        let result = classify_transfer(SPEED_TEST_BYTES, Duration::from_millis(99));
        assert_eq!(result, SpeedResult::TooFast);
        assert_eq!(result.to_string(), "Test too fast to measure.");
        assert!(matches!(
            classify_transfer(SPEED_TEST_BYTES, MIN_MEASURABLE),
            SpeedResult::Measured { .. }
        ));
    }

    #[test]
    fn test_failure_messages() {
        assert_eq!(SpeedResult::TimedOut.to_string(), "Test timed out.");
        assert_eq!(SpeedResult::Failed.to_string(), "Speed test failed.");
    }
}
