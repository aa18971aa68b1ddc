//! Hypoglycemia suspension state machine.
//!
//! One [`SuspensionState`] per patient, each behind its own lock, held in a
//! [`SuspensionRegistry`] shared by the feed monitors (writers) and the dose
//! engine (reader).
//!
//! ```text
//!             value < critical
//!   Normal ────────────────────▶ Suspended(until = now + window)
//!     ▲                              │
//!     │  value > recovery            │
//!     ├──────────────────────────────┤
//!     │  now > until (lazy)          │
//!     └──────────────────────────────┘
//! ```
//!
//! ## Rules
//!
//! 1. A critical reading while normal suspends delivery and records the
//!    reading.  A further critical reading while suspended changes nothing;
//!    the window is never extended.
//! 2. A reading above the recovery threshold lifts the suspension at once.
//!    Values in between leave it alone.
//! 3. Every operation first clears a suspension whose window has elapsed.
//!    No background timer is involved.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use log::{error, info};

use crate::app::events::AuditEvent;
use crate::app::ports::{AuditSink, Clock, Timestamp};
use crate::config::EngineConfig;

/// The most recent reading that triggered a suspension.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CriticalReading {
    pub value: f64,
    pub at: Timestamp,
}

/// Per-patient suspension state.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SuspensionState {
    pub is_suspended: bool,
    pub suspended_until: Option<Timestamp>,
    pub last_critical: Option<CriticalReading>,
}

pub struct SuspensionRegistry {
    critical: f64,
    recovery: f64,
    window: TimeDelta,
    clock: Arc<dyn Clock>,
    audit: Arc<dyn AuditSink>,
    states: Mutex<HashMap<String, Arc<Mutex<SuspensionState>>>>,
}

impl SuspensionRegistry {
    pub fn new(config: &EngineConfig, clock: Arc<dyn Clock>, audit: Arc<dyn AuditSink>) -> Self {
        Self {
            critical: config.critical_glucose_mg_dl,
            recovery: config.recovery_glucose_mg_dl,
            window: config.suspension_duration(),
            clock,
            audit,
            states: Mutex::new(HashMap::new()),
        }
    }

    /// Feed one glucose value.  Returns whether delivery is suspended after it.
    pub fn update(&self, patient: &str, value: f64) -> bool {
        self.with_state(patient, |state, now| {
            if value < self.critical {
                if !state.is_suspended {
                    let until = now.checked_add_signed(self.window).unwrap_or(DateTime::<Utc>::MAX_UTC);
                    state.is_suspended = true;
                    state.suspended_until = Some(until);
                    state.last_critical = Some(CriticalReading { value, at: now });
                    error!("SUSPENSION SET: patient={patient} glucose={value:.0}mg/dL until={until}");
                    self.audit.record(&AuditEvent::SuspensionStarted {
                        patient: patient.to_string(),
                        value,
                        until,
                    });
                }
            } else if state.is_suspended && value > self.recovery {
                state.is_suspended = false;
                state.suspended_until = None;
                info!("SUSPENSION LIFTED: patient={patient} glucose={value:.0}mg/dL");
                self.audit.record(&AuditEvent::SuspensionLifted {
                    patient: patient.to_string(),
                    value,
                });
            }
            state.is_suspended
        })
    }

    pub fn is_suspended(&self, patient: &str) -> bool {
        self.with_state(patient, |state, _| state.is_suspended)
    }

    /// Time until an active suspension lapses; zero when not suspended.
    pub fn time_remaining(&self, patient: &str) -> Duration {
        self.active_suspension(patient).unwrap_or(Duration::ZERO)
    }

    /// Remaining window of an active suspension, checked atomically.
    pub fn active_suspension(&self, patient: &str) -> Option<Duration> {
        self.with_state(patient, |state, now| {
            let until = state.suspended_until.filter(|_| state.is_suspended)?;
            Some((until - now).to_std().unwrap_or(Duration::ZERO))
        })
    }

    /// The reading that started the most recent suspension, if any.
    pub fn last_critical(&self, patient: &str) -> Option<CriticalReading> {
        self.with_state(patient, |state, _| state.last_critical)
    }

    pub fn snapshot(&self, patient: &str) -> SuspensionState {
        self.with_state(patient, |state, _| *state)
    }

    // ── Internal ──────────────────────────────────────────────────

    fn entry(&self, patient: &str) -> Arc<Mutex<SuspensionState>> {
        let mut states = self.states.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(states.entry(patient.to_string()).or_default())
    }

    /// Run `f` under the patient's lock after clearing an elapsed window.
    fn with_state<T>(&self, patient: &str, f: impl FnOnce(&mut SuspensionState, Timestamp) -> T) -> T {
        let entry = self.entry(patient);
        let mut state = entry.lock().unwrap_or_else(PoisonError::into_inner);
        let now = self.clock.now();
        if state.is_suspended && state.suspended_until.is_some_and(|until| now > until) {
            state.is_suspended = false;
            state.suspended_until = None;
            info!("SUSPENSION EXPIRED: patient={patient}");
            self.audit.record(&AuditEvent::SuspensionExpired {
                patient: patient.to_string(),
            });
        }
        f(&mut *state, now)
    }
}
