//! # Clock
//!
//! Source of "now" for every timestamp the engine writes and for the
//! future-date and no-show checks.
//!
//! Repositories hold an `Arc<dyn Clock>` ([`mockable::Clock`]). Production
//! uses [`DefaultClock`]. Tests pin time with [`ManualClock`] so that a
//! reservation at `2025-06-01T20:00` is still in the future.

use chrono::{DateTime, Duration, Local, Utc};
use std::sync::{Mutex, MutexGuard};

pub use mockable::{Clock, DefaultClock};

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock(Mutex<DateTime<Utc>>);

impl ManualClock {
    pub fn new(at: DateTime<Utc>) -> Self {
        Self(Mutex::new(at))
    }

    /// Jumps to an absolute instant.
    pub fn set(&self, at: DateTime<Utc>) {
        *self.lock() = at;
    }

    /// Moves forward (or backward, for a negative duration).
    pub fn advance(&self, by: Duration) {
        *self.lock() += by;
    }

    // A poisoned lock still holds a valid instant.
    fn lock(&self) -> MutexGuard<'_, DateTime<Utc>> {
        self.0.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Clock for ManualClock {
    fn local(&self) -> DateTime<Local> {
        self.utc().with_timezone(&Local)
    }

    fn utc(&self) -> DateTime<Utc> {
        *self.lock()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::sync::Arc;

    #[test]
    fn test_manual_clock_moves_only_when_told() {
        let start = Utc.with_ymd_and_hms(2025, 5, 1, 12, 0, 0).unwrap();
        let clock = ManualClock::new(start);
        assert_eq!(clock.utc(), start);

        clock.advance(Duration::hours(2));
        assert_eq!(clock.utc(), start + Duration::hours(2));

        clock.set(start);
        assert_eq!(clock.utc(), start);
    }

    #[test]
    fn test_clocks_share_one_trait_object() {
        let start = Utc.with_ymd_and_hms(2025, 5, 1, 12, 0, 0).unwrap();
        let pinned: Arc<dyn Clock> = Arc::new(ManualClock::new(start));
        assert_eq!(pinned.utc(), start);

        let before = Utc::now();
        let wall: Arc<dyn Clock> = Arc::new(DefaultClock);
        assert!(wall.utc() >= before);
    }
}
