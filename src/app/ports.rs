//! Port traits: the hexagonal boundary between domain logic and the outside world.
//!
//! ```text
//!   Adapter ──▶ Port trait ──▶ DoseApprovalEngine / monitor (domain)
//! ```
//!
//! Driven adapters (clock, profile store, glucose feed, alert and audit
//! sinks) implement these traits.  The domain holds them as generics or
//! `Arc<dyn …>` so the core never touches files or wall clocks directly.
//!
//! Every port except [`FeedSource`] is shared between the interactive flow
//! and the per-patient watcher threads, so they take `&self` and are
//! `Send + Sync`.  Implementations do their own locking.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::events::{AuditEvent, GlucoseAlert};

/// Wall-clock instant used throughout the engine.
pub type Timestamp = DateTime<Utc>;

// ───────────────────────────────────────────────────────────────
// Clock port
// ───────────────────────────────────────────────────────────────

pub trait Clock: Send + Sync {
    fn now(&self) -> Timestamp;
}

// ───────────────────────────────────────────────────────────────
// Profile port (driven adapter: domain ↔ patient profile store)
// ───────────────────────────────────────────────────────────────

/// Per-patient dosing limits owned by the external profile store.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DoseLimits {
    /// Highest basal rate (U/h) the patient may set without a clinician.
    pub self_service_basal_max: f64,
    /// Basal rate (U/h) currently programmed.
    pub active_basal_rate: f64,
    /// Bolus units per trailing window that auto-approve.
    pub self_service_bolus_daily_cap: f64,
}

/// Reads and writes [`DoseLimits`].
///
/// The engine only writes through [`ProfileStore::save_limits`] after the
/// matching journal record is durable.
pub trait ProfileStore: Send + Sync {
    fn dose_limits(&self, patient: &str) -> Result<DoseLimits, ProfileError>;

    fn save_limits(&self, patient: &str, limits: &DoseLimits) -> Result<(), ProfileError>;

    /// Every patient the store knows about.  Used to assemble sessions.
    fn patients(&self) -> Vec<String>;
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProfileError {
    #[error("no profile for patient {0}")]
    UnknownPatient(String),
    #[error("profile store unavailable: {0}")]
    Unavailable(String),
}

// ───────────────────────────────────────────────────────────────
// Feed port (driven adapter: CGM feed → monitor)
// ───────────────────────────────────────────────────────────────

/// One feed record before the value is parsed.  The timestamp is the
/// feed's own label and is never interpreted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawReading {
    pub timestamp: String,
    pub raw_value: String,
}

/// Sequential source of glucose records for a single patient.
///
/// `None` means the feed is exhausted.  Owned by exactly one watcher.
pub trait FeedSource: Send {
    fn next_reading(&mut self) -> Option<RawReading>;
}

// ───────────────────────────────────────────────────────────────
// Alert ports (driven adapters: monitor → caretaker / patient)
// ───────────────────────────────────────────────────────────────

/// Real-time LOW/HIGH notification.
pub trait AlertSink: Send + Sync {
    fn notify(&self, alert: &GlucoseAlert);
}

/// Durable, append-only alert history per patient.
pub trait AlertLog: Send + Sync {
    fn append(&self, alert: &GlucoseAlert) -> Result<(), StorageError>;

    /// Alerts for `patient` in the order they were appended.
    fn history(&self, patient: &str) -> Result<Vec<GlucoseAlert>, StorageError>;
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("I/O: {0}")]
    Io(#[from] std::io::Error),
    #[error("encode: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("invalid key {0:?}")]
    InvalidKey(String),
}

// ───────────────────────────────────────────────────────────────
// Audit port (driven adapter: domain → logging / telemetry)
// ───────────────────────────────────────────────────────────────

/// The domain emits structured [`AuditEvent`]s through this port.
pub trait AuditSink: Send + Sync {
    fn record(&self, event: &AuditEvent);
}

/// Convenience for adapters that seed from a `patient → limits` map.
pub type ProfileMap = HashMap<String, DoseLimits>;
