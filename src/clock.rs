use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use time::OffsetDateTime;

/// Source of the current time for rotation names and retention decisions.
#[derive(Debug, Clone, Default)]
pub enum Clock {
    /// Local wall-clock time, falling back to UTC when the local offset
    /// cannot be determined (on Linux, once the process has more than one
    /// thread). Only line stamps see the offset; rotated names are UTC.
    #[default]
    System,
    /// A clock that only moves when told to.
    Manual(ManualClock),
}

impl Clock {
    pub fn manual(now: OffsetDateTime) -> Self {
        Self::Manual(ManualClock::new(now))
    }

    pub fn now(&self) -> OffsetDateTime {
        match self {
            Clock::System => {
                OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc())
            }
            Clock::Manual(clock) => clock.now(),
        }
    }
}

/// The time could be reset. Clones share the same instant.
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<Mutex<OffsetDateTime>>,
}

impl ManualClock {
    pub fn new(now: OffsetDateTime) -> ManualClock {
        ManualClock {
            now: Arc::new(Mutex::new(now)),
        }
    }

    pub fn now(&self) -> OffsetDateTime {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set_now(&self, now: OffsetDateTime) {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner) = now;
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(PoisonError::into_inner);
        *now += by;
    }
}
