//! Inbound commands to the dosing engine.
//!
//! These represent actions requested by the outside world (patient UI,
//! caretaker UI, clinician review, scripted simulation) that
//! [`DoseApprovalEngine::handle`](super::service::DoseApprovalEngine::handle)
//! interprets and acts upon.

use serde::{Deserialize, Serialize};

use crate::journal::{Actor, RecordRef};

/// Who is asking for a dose.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "role", content = "id", rename_all = "snake_case")]
pub enum Requester {
    /// The patient acting for themself; exempt from the caretaker cooldown.
    Patient,
    Caretaker(String),
}

impl Requester {
    pub fn caretaker_id(&self) -> Option<&str> {
        match self {
            Self::Patient => None,
            Self::Caretaker(id) => Some(id),
        }
    }
}

impl From<&Requester> for Actor {
    fn from(r: &Requester) -> Self {
        match r {
            Requester::Patient => Actor::Patient,
            Requester::Caretaker(id) => Actor::Caretaker(id.clone()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewAction {
    Approve,
    Deny,
}

/// Quick-pick bolus sizes, as fractions of the daily self-service cap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BolusPreset {
    Meal,
    Snack,
    Correction,
}

impl BolusPreset {
    pub fn fraction(self) -> f64 {
        match self {
            Self::Meal => 1.0,
            Self::Snack => 0.5,
            Self::Correction => 0.25,
        }
    }
}

/// Clinician-set limits.  `None` leaves a field unchanged.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct LimitAdjustment {
    #[serde(default)]
    pub self_service_basal_max: Option<f64>,
    #[serde(default)]
    pub bolus_daily_cap: Option<f64>,
}

/// Commands that external adapters can send into the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum DoseCommand {
    Bolus {
        patient: String,
        requester: Requester,
        amount: f64,
    },
    BolusPreset {
        patient: String,
        requester: Requester,
        preset: BolusPreset,
    },
    BasalChange {
        patient: String,
        requester: Requester,
        rate: f64,
    },
    Resolve {
        patient: String,
        record: RecordRef,
        action: ReviewAction,
        reviewer: String,
    },
    AdjustLimits {
        patient: String,
        clinician: String,
        adjustment: LimitAdjustment,
    },
}
