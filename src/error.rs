//! Unified error types for the dosing engine.
//!
//! Each concern owns a typed error enum; request-level failures funnel into
//! [`DoseError`], and everything converts into the crate-wide [`Error`] so
//! outer layers can propagate with `?`.
//!
//! ```text
//!  ValidationError ─┐
//!  JournalError ────┤
//!  ProfileError ────┼──▶ DoseError ──▶ Error
//!  ReviewError ─────┘
//!  ConfigError · MonitorError · StorageError ──▶ Error
//! ```

use std::time::Duration;

use thiserror::Error;

use crate::app::ports::{ProfileError, StorageError};
use crate::journal::RecordRef;

/// Crate-wide result alias.
pub type Result<T> = core::result::Result<T, Error>;

// ---------------------------------------------------------------------------
// Top-level error
// ---------------------------------------------------------------------------

/// Every fallible operation in the crate converts into this type.
#[derive(Debug, Error)]
pub enum Error {
    #[error("dose: {0}")]
    Dose(#[from] DoseError),
    #[error("journal: {0}")]
    Journal(#[from] JournalError),
    #[error("config: {0}")]
    Config(#[from] ConfigError),
    #[error("monitor: {0}")]
    Monitor(#[from] MonitorError),
    #[error("profile: {0}")]
    Profile(#[from] ProfileError),
    #[error("storage: {0}")]
    Storage(#[from] StorageError),
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Bounds violations on doses, rates, limits, and feed values.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("{field} {value} is not a finite number")]
    NonFinite { field: &'static str, value: f64 },
    #[error("bolus {amount:.2}U is below the {min:.2}U minimum")]
    BelowMinimum { amount: f64, min: f64 },
    #[error("bolus {amount:.2}U exceeds the per-dose safety cap of {cap:.2}U")]
    AboveSafetyCap { amount: f64, cap: f64 },
    #[error("basal rate {rate:.2}U/h outside [{min:.2}, {max:.2}]")]
    RateOutOfBounds { rate: f64, min: f64, max: f64 },
    #[error("basal rate {rate:.2}U/h exceeds the {cap:.2}U/h step limit")]
    RateAboveStepCap { rate: f64, cap: f64 },
    #[error("{field} {value:.2} outside [{min:.2}, {max:.2}]")]
    LimitOutOfBounds {
        field: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },
    #[error("malformed glucose value {0:?}")]
    MalformedReading(String),
}

// ---------------------------------------------------------------------------
// Dose requests
// ---------------------------------------------------------------------------

/// Why a dose request, review, or limit change was not carried out.
///
/// Validation and safety variants are terminal for the request; nothing is
/// written to the journal.  [`DoseError::Persistence`] means the decision was
/// computed but could not be made durable, so it must not be treated as final.
#[derive(Debug, Error)]
pub enum DoseError {
    #[error("rejected: {0}")]
    Validation(#[from] ValidationError),
    #[error("insulin delivery suspended, {}s remaining", .remaining.as_secs())]
    SuspensionActive { remaining: Duration },
    #[error("caretaker cooldown active, {}s remaining", .remaining.as_secs())]
    CooldownActive { remaining: Duration },
    #[error("dose journal write failed: {0}")]
    Persistence(#[from] JournalError),
    #[error("patient profile unavailable: {0}")]
    ProfileUnavailable(#[from] ProfileError),
    #[error("review: {0}")]
    Review(#[from] ReviewError),
}

/// Clinician review against a record that cannot be resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ReviewError {
    #[error("no record {0} in the journal")]
    UnknownRecord(RecordRef),
    #[error("record {0} is not awaiting approval")]
    NotPending(RecordRef),
    #[error("record {0} has already been resolved")]
    AlreadyResolved(RecordRef),
}

// ---------------------------------------------------------------------------
// Journal
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum JournalError {
    #[error("I/O: {0}")]
    Io(#[from] std::io::Error),
    #[error("encode: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("invalid patient id {0:?}")]
    InvalidPatientId(String),
}

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("read failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("parse failed: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("validation failed: {0}")]
    ValidationFailed(&'static str),
}

// ---------------------------------------------------------------------------
// Monitor sessions
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("patient {0} is already being watched in this session")]
    AlreadyWatching(String),
    #[error("watcher thread spawn failed: {0}")]
    Spawn(#[from] std::io::Error),
}
