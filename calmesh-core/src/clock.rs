//! Injectable time source.

use chrono::{DateTime, Utc};

/// Source of "now", injected so pruning and window math are testable.
pub trait Clock {
    fn now(&self) -> DateTime<Utc>;
}

/// The real clock.
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock pinned to a fixed instant, for tests.
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

/// Epoch seconds as a float, the unit used throughout the state file.
pub fn epoch_seconds(instant: &DateTime<Utc>) -> f64 {
    instant.timestamp_micros() as f64 / 1_000_000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn epoch_seconds_preserves_subsecond_precision() {
        let instant = Utc.timestamp_micros(1_736_942_400_500_000).unwrap();
        assert_eq!(epoch_seconds(&instant), 1_736_942_400.5);
    }
}
