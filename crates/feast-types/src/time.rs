use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

const NANOS_PER_SEC: i128 = 1_000_000_000;

/// Point in time as whole seconds plus nanoseconds since the Unix epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct Timestamp {
    pub seconds: i64,
    #[serde(default)]
    pub nanos: i32,
}

impl Timestamp {
    pub const fn new(seconds: i64, nanos: i32) -> Self {
        Self { seconds, nanos }
    }

    pub const fn from_secs(seconds: i64) -> Self {
        Self { seconds, nanos: 0 }
    }

    /// Wall-clock now. A clock set before the epoch reads as the epoch.
    pub fn now() -> Self {
        let elapsed = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        Self {
            seconds: elapsed.as_secs() as i64,
            nanos: elapsed.subsec_nanos() as i32,
        }
    }

    pub fn as_nanos(&self) -> i128 {
        self.seconds as i128 * NANOS_PER_SEC + self.nanos as i128
    }

    /// How old this timestamp is when observed at `at`.
    ///
    /// A timestamp later than `at` has age zero.
    pub fn age_at(&self, at: Timestamp) -> Duration {
        let diff = at.as_nanos() - self.as_nanos();
        if diff <= 0 {
            return Duration::ZERO;
        }
        let secs = (diff / NANOS_PER_SEC).min(u64::MAX as i128) as u64;
        let nanos = (diff % NANOS_PER_SEC) as u32;
        Duration::new(secs, nanos)
    }

    pub fn saturating_sub(&self, delta: Duration) -> Timestamp {
        Self::from_nanos(self.as_nanos() - delta.as_nanos() as i128)
    }

    pub fn saturating_add(&self, delta: Duration) -> Timestamp {
        Self::from_nanos(self.as_nanos() + delta.as_nanos() as i128)
    }

    fn from_nanos(total: i128) -> Timestamp {
        let seconds = total.div_euclid(NANOS_PER_SEC);
        let nanos = total.rem_euclid(NANOS_PER_SEC) as i32;
        let seconds = seconds.clamp(i64::MIN as i128, i64::MAX as i128) as i64;
        Timestamp { seconds, nanos }
    }
}
