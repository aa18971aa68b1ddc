//! Append-only dose journal.
//!
//! One ledger per patient.  Records are never edited: a clinician's decision
//! on a pending request is a new record whose `resolves` field points back
//! at the original.  Everything the engine needs (approved total in the
//! trailing window, requests still awaiting review) is re-derived by
//! scanning the ledger.
//!
//! ```text
//!  #0 Bolus 3.0 AutoApproved
//!  #1 Bolus 3.0 PendingApproval ◀──┐
//!  #2 Bolus 3.0 Approved  resolves #1
//! ```

pub mod file;
pub mod memory;

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::app::ports::Timestamp;
use crate::error::JournalError;

pub use file::FileJournal;
pub use memory::MemoryJournal;

/// Slack applied when comparing unit totals against caps.
pub const DOSE_EPSILON: f64 = 1e-9;

/// True when `total` does not exceed `cap`; equality is within the cap.
pub fn within_cap(total: f64, cap: f64) -> bool {
    total <= cap + DOSE_EPSILON
}

// ── Identity ──────────────────────────────────────────────────

/// Position of a record in its patient's journal (0-based insertion order).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordRef(pub u64);

impl fmt::Display for RecordRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

// ── Record types ──────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DoseKind {
    /// Amount in units.
    Bolus,
    /// Amount is the requested rate in U/h.
    BasalChange,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DoseStatus {
    AutoApproved,
    PendingApproval,
    Approved,
    Denied,
}

impl DoseStatus {
    /// Whether a bolus with this status counts as delivered insulin.
    pub fn is_delivered(self) -> bool {
        matches!(self, Self::AutoApproved | Self::Approved)
    }
}

/// Who produced a record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "role", content = "id", rename_all = "snake_case")]
pub enum Actor {
    Patient,
    Caretaker(String),
    Clinician(String),
}

impl fmt::Display for Actor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Patient => write!(f, "patient"),
            Self::Caretaker(id) => write!(f, "caretaker:{id}"),
            Self::Clinician(id) => write!(f, "clinician:{id}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DoseRecord {
    pub timestamp: Timestamp,
    pub kind: DoseKind,
    pub amount: f64,
    pub status: DoseStatus,
    pub actor: Actor,
    /// The pending record this one resolves.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolves: Option<RecordRef>,
    /// When an auto-approved basal change is considered effective.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub effective_at: Option<Timestamp>,
    /// Basal rate in force when the change was recorded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_rate: Option<f64>,
}

impl DoseRecord {
    pub fn new(timestamp: Timestamp, kind: DoseKind, amount: f64, status: DoseStatus, actor: Actor) -> Self {
        Self {
            timestamp,
            kind,
            amount,
            status,
            actor,
            resolves: None,
            effective_at: None,
            previous_rate: None,
        }
    }

    pub fn resolving(mut self, original: RecordRef) -> Self {
        self.resolves = Some(original);
        self
    }

    pub fn effective_at(mut self, at: Timestamp) -> Self {
        self.effective_at = Some(at);
        self
    }

    pub fn previous_rate(mut self, rate: f64) -> Self {
        self.previous_rate = Some(rate);
        self
    }
}

/// A record together with its journal position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JournalEntry {
    pub seq: RecordRef,
    #[serde(flatten)]
    pub record: DoseRecord,
}

// ── Journal trait ─────────────────────────────────────────────

/// Append-only, per-patient ledger.
///
/// Appends for one patient are serialized; `replay` returns a consistent
/// snapshot in insertion order.  Records are never rewritten.
pub trait DoseJournal: Send + Sync {
    /// Durably append `record` and return its position.
    fn append(&self, patient: &str, record: DoseRecord) -> Result<RecordRef, JournalError>;

    /// Every record for `patient`, oldest first.  Empty for unknown patients.
    fn replay(&self, patient: &str) -> Result<Vec<JournalEntry>, JournalError>;

    /// Records strictly newer than `cutoff`.
    fn scan_since(&self, patient: &str, cutoff: Timestamp) -> Result<Vec<JournalEntry>, JournalError> {
        let mut entries = self.replay(patient)?;
        entries.retain(|e| e.record.timestamp > cutoff);
        Ok(entries)
    }

    /// Records with the given status.
    fn scan_by_status(&self, patient: &str, status: DoseStatus) -> Result<Vec<JournalEntry>, JournalError> {
        let mut entries = self.replay(patient)?;
        entries.retain(|e| e.record.status == status);
        Ok(entries)
    }
}

// ── Derived views ─────────────────────────────────────────────

/// Sum of delivered bolus units among `entries` newer than `cutoff`.
pub fn approved_bolus_total(entries: &[JournalEntry], cutoff: Timestamp) -> f64 {
    entries
        .iter()
        .map(|e| &e.record)
        .filter(|r| r.kind == DoseKind::Bolus && r.status.is_delivered() && r.timestamp > cutoff)
        .map(|r| r.amount)
        .sum()
}

/// Pending records that no later record resolves.
pub fn pending_requests(entries: &[JournalEntry]) -> Vec<JournalEntry> {
    let resolved: HashSet<RecordRef> = entries.iter().filter_map(|e| e.record.resolves).collect();
    entries
        .iter()
        .filter(|e| e.record.status == DoseStatus::PendingApproval && !resolved.contains(&e.seq))
        .cloned()
        .collect()
}

/// Whether any record in `entries` resolves `target`.
pub fn is_resolved(entries: &[JournalEntry], target: RecordRef) -> bool {
    entries.iter().any(|e| e.record.resolves == Some(target))
}
