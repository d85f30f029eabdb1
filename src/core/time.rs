//! Time representation for the sync core.
//! Presentation times are f64 seconds; packet timestamps stay in stream ticks
//! until converted through the stream's time base.

use serde::{Deserialize, Serialize};

/// Presentation time in seconds
pub type Seconds = f64;

/// Time constants for conversions
pub mod constants {
    pub const MILLIS_PER_SECOND: f64 = 1_000.0;
}

/// Rational time base of a stream (seconds per tick = num / den)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeBase {
    pub num: i32,
    pub den: i32,
}

impl TimeBase {
    /// Microsecond ticks, the demuxer's own timestamp unit.
    pub const MICROS: TimeBase = TimeBase { num: 1, den: 1_000_000 };

    /// Millisecond ticks
    pub const MILLIS: TimeBase = TimeBase { num: 1, den: 1_000 };

    pub const fn new(num: i32, den: i32) -> Self {
        Self { num, den }
    }

    /// Seconds per tick. A zero denominator yields 0.0 rather than infinity.
    #[inline]
    pub fn as_f64(&self) -> f64 {
        if self.den == 0 {
            0.0
        } else {
            self.num as f64 / self.den as f64
        }
    }

    /// Convert a tick count to seconds
    #[inline]
    pub fn ticks_to_seconds(&self, ticks: i64) -> Seconds {
        ticks as f64 * self.as_f64()
    }

    /// Convert seconds to the nearest tick count
    #[inline]
    pub fn seconds_to_ticks(&self, seconds: Seconds) -> i64 {
        let per_tick = self.as_f64();
        if per_tick == 0.0 {
            return 0;
        }
        (seconds / per_tick).round() as i64
    }
}

impl Default for TimeBase {
    fn default() -> Self {
        Self::MICROS
    }
}

/// Convert seconds to whole milliseconds
#[inline]
pub fn to_millis(seconds: Seconds) -> i64 {
    (seconds * constants::MILLIS_PER_SECOND).floor() as i64
}

/// Convert non-negative seconds to a std duration; negative or NaN becomes zero.
#[inline]
pub fn to_duration(seconds: Seconds) -> std::time::Duration {
    if seconds.is_finite() && seconds > 0.0 {
        std::time::Duration::from_secs_f64(seconds)
    } else {
        std::time::Duration::ZERO
    }
}

/// Format time as HH:MM:SS.mmm for the on-screen clock
pub fn format_time(seconds: Seconds) -> String {
    let sign = if seconds < 0.0 { "-" } else { "" };
    let total_millis = to_millis(seconds.abs());
    let hours = total_millis / 3_600_000;
    let minutes = (total_millis / 60_000) % 60;
    let secs = (total_millis / 1_000) % 60;
    let millis = total_millis % 1_000;

    format!("{}{:02}:{:02}:{:02}.{:03}", sign, hours, minutes, secs, millis)
}
