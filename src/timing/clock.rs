use std::time::Instant;

use chrono::{DateTime, Datelike, Timelike, Utc};

/// One wall-clock reading after application of the timezone fuse.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WallTime {
    pub epoch: i64,
    pub year: i32,
    pub month: u32,
    pub day: u32,
    pub hour: u32,
    pub minute: u32,
    pub second: u32,
}

impl WallTime {
    /// Seconds into the current hour, the stamp raw records carry.
    pub fn intra_hour(&self) -> i16 {
        (self.minute * 60 + self.second) as i16
    }

    /// `YYYY-MM-DD HH:MM:SS`, the format the post-processor expects.
    pub fn date_time_string(&self) -> String {
        format!(
            "{:04}-{:02}-{:02} {:02}:{:02}:{:02}",
            self.year, self.month, self.day, self.hour, self.minute, self.second
        )
    }
}

/// Current wall clock shifted by `fuse` whole hours.
pub fn wall_now(fuse: i32) -> WallTime {
    wall_from_epoch(Utc::now().timestamp() + i64::from(fuse) * 3600)
}

/// Split an already-fused epoch into calendar fields.
pub fn wall_from_epoch(epoch: i64) -> WallTime {
    let dt: DateTime<Utc> = DateTime::from_timestamp(epoch, 0).unwrap_or_default();
    WallTime {
        epoch,
        year: dt.year(),
        month: dt.month(),
        day: dt.day(),
        hour: dt.hour(),
        minute: dt.minute(),
        second: dt.second(),
    }
}

/// Monotonic seconds since construction, quantized to hundredths.
pub struct MonotonicClock {
    start: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn now(&self) -> f64 {
        let elapsed = self.start.elapsed();
        let hundredths = (elapsed.subsec_nanos() / 10_000_000) as f64;
        elapsed.as_secs() as f64 + hundredths / 100.0
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

/// Detects entry into a new `delta`-second bucket of fused epoch time.
///
/// The first `advance` after construction fires; callers that must not act
/// on startup suppress it with their own just-started flag.
pub struct TimeStep {
    delta: i64,
    bucket: i64,
}

impl TimeStep {
    pub fn new(delta_seconds: u32) -> Self {
        Self {
            delta: i64::from(delta_seconds.max(1)),
            bucket: 0,
        }
    }

    /// True exactly when `epoch` falls in a different bucket than the one
    /// stored by the previous firing.
    pub fn advance(&mut self, epoch: i64) -> bool {
        let block = (epoch / self.delta) * self.delta;
        if block != self.bucket {
            self.bucket = block;
            true
        } else {
            false
        }
    }

    /// Floor of the bucket stored by the last firing.
    pub fn bucket(&self) -> i64 {
        self.bucket
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn intra_hour_stamp() {
        let w = wall_from_epoch(3600 * 24 + 17 * 60 + 42);
        assert_eq!(w.minute, 17);
        assert_eq!(w.second, 42);
        assert_eq!(w.intra_hour(), 17 * 60 + 42);
    }

    #[test]
    fn date_time_format() {
        // 2024-03-05 07:08:09 UTC
        let w = wall_from_epoch(1_709_622_489);
        assert_eq!(w.date_time_string(), "2024-03-05 07:08:09");
    }

    #[test]
    fn hour_rollover_fires_once() {
        let mut step = TimeStep::new(3600);
        let base = 1_709_622_000; // mid-hour
        assert!(step.advance(base)); // first observation
        assert!(!step.advance(base + 1));
        // Cross HH:59:59 -> HH+1:00:00
        let next_hour = (base / 3600 + 1) * 3600;
        assert!(!step.advance(next_hour - 1));
        assert!(step.advance(next_hour));
        assert!(!step.advance(next_hour + 1));
    }

    #[test]
    fn bucket_floor_is_stored() {
        let mut step = TimeStep::new(600);
        step.advance(1234);
        assert_eq!(step.bucket(), 1200);
        step.advance(1800);
        assert_eq!(step.bucket(), 1800);
    }

    #[test]
    fn monotonic_clock_is_nondecreasing() {
        let clock = MonotonicClock::new();
        let a = clock.now();
        let b = clock.now();
        assert!(b >= a);
        assert!(a >= 0.0);
    }
}
