//! Caretaker bolus cooldown.
//!
//! Tracks when each caretaker last had a bolus recorded for each patient.
//! Evaluated lazily against the caller's clock; nothing expires on its own.
//! State lives in memory only and starts empty on every run.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};

use crate::app::ports::Timestamp;

pub struct CooldownRegistry {
    window: TimeDelta,
    /// (patient, caretaker) → time of the last recorded request.
    last: Mutex<HashMap<(String, String), Timestamp>>,
}

impl CooldownRegistry {
    pub fn new(window: TimeDelta) -> Self {
        Self {
            window,
            last: Mutex::new(HashMap::new()),
        }
    }

    /// Time the caretaker must still wait, or `None` when clear.
    pub fn remaining(&self, patient: &str, caretaker: &str, now: Timestamp) -> Option<Duration> {
        let last = self.last.lock().unwrap_or_else(PoisonError::into_inner);
        let at = last.get(&(patient.to_string(), caretaker.to_string()))?;
        let until = at.checked_add_signed(self.window).unwrap_or(DateTime::<Utc>::MAX_UTC);
        let left = until - now;
        (left > TimeDelta::zero()).then(|| left.to_std().unwrap_or(Duration::ZERO))
    }

    pub fn record(&self, patient: &str, caretaker: &str, at: Timestamp) {
        let mut last = self.last.lock().unwrap_or_else(PoisonError::into_inner);
        last.insert((patient.to_string(), caretaker.to_string()), at);
    }
}
