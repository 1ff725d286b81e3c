//! Time conversion and display utilities

/// Convert a position in seconds to a frame index at `sample_rate`.
///
/// Negative and NaN inputs map to frame 0.
pub fn seconds_to_frames(seconds: f64, sample_rate: u32) -> usize {
    if seconds.is_nan() || seconds <= 0.0 {
        return 0;
    }
    (seconds * sample_rate as f64).round() as usize
}

/// Convert a frame index at `sample_rate` to seconds.
pub fn frames_to_seconds(frames: usize, sample_rate: u32) -> f64 {
    if sample_rate == 0 {
        return 0.0;
    }
    frames as f64 / sample_rate as f64
}

/// Format seconds as `mm:ss` (minutes are not wrapped at one hour).
pub fn format_clock(seconds: f64) -> String {
    let total = if seconds.is_finite() && seconds > 0.0 {
        seconds.floor() as u64
    } else {
        0
    };
    format!("{:02}:{:02}", total / 60, total % 60)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seconds_to_frames() {
        assert_eq!(seconds_to_frames(1.0, 44100), 44100);
        assert_eq!(seconds_to_frames(0.5, 8000), 4000);
        assert_eq!(seconds_to_frames(-2.0, 44100), 0);
        assert_eq!(seconds_to_frames(f64::NAN, 44100), 0);
    }

    #[test]
    fn test_frames_to_seconds() {
        assert_eq!(frames_to_seconds(88200, 44100), 2.0);
        assert_eq!(frames_to_seconds(100, 0), 0.0);
    }

    #[test]
    fn test_format_clock() {
        assert_eq!(format_clock(0.0), "00:00");
        assert_eq!(format_clock(59.9), "00:59");
        assert_eq!(format_clock(61.0), "01:01");
        assert_eq!(format_clock(3725.0), "62:05");
        assert_eq!(format_clock(-4.0), "00:00");
    }
}
