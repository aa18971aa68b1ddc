//! Outbound application events.
//!
//! The engine and the suspension registry emit [`AuditEvent`]s through the
//! [`AuditSink`](super::ports::AuditSink) port; feed monitors additionally
//! hand [`GlucoseAlert`]s to the alert ports.  Adapters on the other side
//! decide what to do with them.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::ports::{DoseLimits, Timestamp};
use crate::journal::{Actor, DoseStatus, RecordRef};

/// Which threshold a reading crossed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AlertLevel {
    Low,
    High,
}

impl fmt::Display for AlertLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Low => write!(f, "LOW"),
            Self::High => write!(f, "HIGH"),
        }
    }
}

/// A LOW/HIGH glucose alert as delivered and logged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GlucoseAlert {
    pub patient: String,
    /// Feed label of the triggering reading.
    pub timestamp: String,
    pub value: f64,
    pub level: AlertLevel,
}

/// Structured events emitted by the dosing core.
#[derive(Debug, Clone)]
pub enum AuditEvent {
    /// A critical reading suspended delivery.
    SuspensionStarted {
        patient: String,
        value: f64,
        until: Timestamp,
    },

    /// A recovery reading lifted the suspension early.
    SuspensionLifted { patient: String, value: f64 },

    /// The suspension window elapsed.
    SuspensionExpired { patient: String },

    /// A threshold alert was raised by a feed monitor.
    Alert(GlucoseAlert),

    /// A bolus request was recorded.
    BolusDecision {
        patient: String,
        actor: Actor,
        record: RecordRef,
        amount: f64,
        status: DoseStatus,
    },

    /// A basal change request was recorded.
    BasalDecision {
        patient: String,
        actor: Actor,
        record: RecordRef,
        rate: f64,
        previous_rate: f64,
        status: DoseStatus,
    },

    /// A clinician resolved a pending request.
    RequestResolved {
        patient: String,
        reviewer: String,
        record: RecordRef,
        resolves: RecordRef,
        status: DoseStatus,
    },

    /// A clinician changed self-service limits directly.
    LimitsAdjusted {
        patient: String,
        clinician: String,
        limits: DoseLimits,
    },
}
