//! Mock ports shared by the integration tests.
//!
//! Recording sinks capture every event so tests can assert on the full
//! history; failing adapters exercise the persistence error paths.

use std::sync::{Arc, Mutex};

use aidguard::adapters::profile::JsonProfileStore;
use aidguard::adapters::time::ManualClock;
use aidguard::app::events::{AuditEvent, GlucoseAlert};
use aidguard::app::ports::{
    AlertLog, AlertSink, AuditSink, DoseLimits, FeedSource, RawReading, StorageError,
};
use aidguard::app::service::DoseApprovalEngine;
use aidguard::config::EngineConfig;
use aidguard::error::JournalError;
use aidguard::journal::{DoseJournal, DoseRecord, JournalEntry, MemoryJournal, RecordRef};
use aidguard::safety::SuspensionRegistry;
use chrono::{TimeZone, Utc};

// ── RecordingAudit ────────────────────────────────────────────

#[derive(Default)]
pub struct RecordingAudit {
    pub events: Mutex<Vec<AuditEvent>>,
}

#[allow(dead_code)]
impl RecordingAudit {
    /// Short tag per event, in emission order.
    pub fn tags(&self) -> Vec<&'static str> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .map(|e| match e {
                AuditEvent::SuspensionStarted { .. } => "suspend",
                AuditEvent::SuspensionLifted { .. } => "lift",
                AuditEvent::SuspensionExpired { .. } => "expire",
                AuditEvent::Alert(_) => "alert",
                AuditEvent::BolusDecision { .. } => "bolus",
                AuditEvent::BasalDecision { .. } => "basal",
                AuditEvent::RequestResolved { .. } => "review",
                AuditEvent::LimitsAdjusted { .. } => "limits",
            })
            .collect()
    }
}

impl AuditSink for RecordingAudit {
    fn record(&self, event: &AuditEvent) {
        self.events.lock().unwrap().push(event.clone());
    }
}

// ── RecordingAlerts ───────────────────────────────────────────

#[derive(Default)]
pub struct RecordingAlerts {
    pub alerts: Mutex<Vec<GlucoseAlert>>,
}

impl AlertSink for RecordingAlerts {
    fn notify(&self, alert: &GlucoseAlert) {
        self.alerts.lock().unwrap().push(alert.clone());
    }
}

// ── Failing adapters ──────────────────────────────────────────

pub struct FailingAlertLog;

impl AlertLog for FailingAlertLog {
    fn append(&self, _alert: &GlucoseAlert) -> Result<(), StorageError> {
        Err(StorageError::Io(std::io::Error::other("disk full")))
    }

    fn history(&self, _patient: &str) -> Result<Vec<GlucoseAlert>, StorageError> {
        Ok(Vec::new())
    }
}

pub struct FailingJournal;

impl DoseJournal for FailingJournal {
    fn append(&self, _patient: &str, _record: DoseRecord) -> Result<RecordRef, JournalError> {
        Err(JournalError::Io(std::io::Error::other("read-only filesystem")))
    }

    fn replay(&self, _patient: &str) -> Result<Vec<JournalEntry>, JournalError> {
        Ok(Vec::new())
    }
}

/// A feed that never runs out.
pub struct EndlessFeed {
    n: u64,
}

#[allow(dead_code)]
impl EndlessFeed {
    pub fn new() -> Self {
        Self { n: 0 }
    }
}

impl FeedSource for EndlessFeed {
    fn next_reading(&mut self) -> Option<RawReading> {
        self.n += 1;
        Some(RawReading {
            timestamp: format!("t{}", self.n),
            raw_value: "120".to_string(),
        })
    }
}

// ── Harness ───────────────────────────────────────────────────

pub const PATIENT: &str = "p1";

pub fn limits(basal_max: f64, active: f64, bolus_cap: f64) -> DoseLimits {
    DoseLimits {
        self_service_basal_max: basal_max,
        active_basal_rate: active,
        self_service_bolus_daily_cap: bolus_cap,
    }
}

pub struct Harness<J: DoseJournal> {
    pub clock: Arc<ManualClock>,
    pub audit: Arc<RecordingAudit>,
    pub suspension: Arc<SuspensionRegistry>,
    pub engine: DoseApprovalEngine<J, JsonProfileStore>,
}

#[allow(dead_code)]
pub fn harness(dose_limits: DoseLimits) -> Harness<MemoryJournal> {
    harness_with(MemoryJournal::new(), dose_limits)
}

pub fn harness_with<J: DoseJournal>(journal: J, dose_limits: DoseLimits) -> Harness<J> {
    let config = EngineConfig::default();
    let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2026, 6, 15, 9, 0, 0).unwrap()));
    let audit = Arc::new(RecordingAudit::default());
    let suspension = Arc::new(SuspensionRegistry::new(&config, clock.clone(), audit.clone()));
    let profiles = JsonProfileStore::new();
    profiles.insert(PATIENT, dose_limits);
    let engine = DoseApprovalEngine::new(
        config,
        journal,
        profiles,
        Arc::clone(&suspension),
        clock.clone(),
        audit.clone(),
    );
    Harness {
        clock,
        audit,
        suspension,
        engine,
    }
}
