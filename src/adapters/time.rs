//! Clock adapters.
//!
//! - [`SystemClock`]: wall-clock UTC for the host binary.
//! - [`ManualClock`]: settable time for simulation and tests; suspension
//!   windows and cooldowns are evaluated lazily, so advancing this clock is
//!   all it takes to make them lapse.

use std::sync::{Mutex, PoisonError};

use chrono::{TimeDelta, Utc};

use crate::app::ports::{Clock, Timestamp};

pub struct SystemClock;

impl SystemClock {
    pub fn new() -> Self {
        Self
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        Utc::now()
    }
}

pub struct ManualClock {
    now: Mutex<Timestamp>,
}

impl ManualClock {
    pub fn new(start: Timestamp) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn set(&self, at: Timestamp) {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner) = at;
    }

    pub fn advance(&self, by: TimeDelta) {
        let mut now = self.now.lock().unwrap_or_else(PoisonError::into_inner);
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
