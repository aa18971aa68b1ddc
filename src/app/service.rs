//! Dose approval engine: the hexagonal core.
//!
//! [`DoseApprovalEngine`] decides whether a bolus or basal-rate request is
//! applied immediately (auto-approved) or queued for a clinician, records
//! the decision in the dose journal, and carries out clinician reviews.
//! All I/O flows through the journal and port traits, so the engine is
//! testable with in-memory adapters.
//!
//! ```text
//!  Requester ──▶ ┌──────────────────────────┐ ──▶ DoseJournal (append)
//!                │    DoseApprovalEngine     │ ──▶ AuditSink
//!  Clinician ──▶ │ bounds · suspension ·     │ ◀─▶ ProfileStore
//!                │ cooldown · 24h cap        │ ◀── SuspensionRegistry
//!                └──────────────────────────┘
//! ```
//!
//! ## Bolus checks, in order
//!
//! 1. Amount is finite and at least the minimum bolus.
//! 2. Delivery is not suspended.
//! 3. A caretaker is outside their cooldown for this patient.
//! 4. Amount is within the per-dose cap (daily cap × safety multiplier).
//!
//! Any failure rejects the request without a journal write.  A request
//! that passes is auto-approved when the delivered total for the trailing
//! window plus the amount stays within the daily cap, and pending otherwise.
//!
//! Checks and the append run under a per-patient lock, so two concurrent
//! requests cannot both fit under the same remaining allowance.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, TimeDelta, Utc};
use log::{info, warn};

use crate::config::EngineConfig;
use crate::cooldown::CooldownRegistry;
use crate::error::{DoseError, ReviewError, ValidationError};
use crate::journal::{
    self, Actor, DOSE_EPSILON, DoseJournal, DoseKind, DoseRecord, DoseStatus, JournalEntry, RecordRef,
    approved_bolus_total, is_resolved, within_cap,
};
use crate::safety::SuspensionRegistry;

use super::commands::{BolusPreset, DoseCommand, LimitAdjustment, Requester, ReviewAction};
use super::events::AuditEvent;
use super::ports::{AuditSink, Clock, DoseLimits, ProfileStore, Timestamp};

// ───────────────────────────────────────────────────────────────
// Results
// ───────────────────────────────────────────────────────────────

/// Outcome of a request that passed every check and was journaled.
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    AutoApproved(JournalEntry),
    Pending(JournalEntry),
}

impl Decision {
    fn from_entry(entry: JournalEntry) -> Self {
        if entry.record.status == DoseStatus::AutoApproved {
            Self::AutoApproved(entry)
        } else {
            Self::Pending(entry)
        }
    }

    pub fn entry(&self) -> &JournalEntry {
        match self {
            Self::AutoApproved(e) | Self::Pending(e) => e,
        }
    }

    pub fn record_ref(&self) -> RecordRef {
        self.entry().seq
    }

    pub fn is_auto_approved(&self) -> bool {
        matches!(self, Self::AutoApproved(_))
    }
}

/// What a patient may still take without review.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BolusAllowance {
    pub daily_cap: f64,
    pub approved_in_window: f64,
    pub remaining: f64,
    pub per_dose_cap: f64,
    pub min_dose: f64,
}

/// Result of [`DoseApprovalEngine::handle`].
#[derive(Debug, Clone, PartialEq)]
pub enum CommandOutcome {
    Decision(Decision),
    Resolved(JournalEntry),
    LimitsAdjusted(DoseLimits),
}

// ───────────────────────────────────────────────────────────────
// DoseApprovalEngine
// ───────────────────────────────────────────────────────────────

pub struct DoseApprovalEngine<J: DoseJournal, P: ProfileStore> {
    config: EngineConfig,
    journal: J,
    profiles: P,
    suspension: Arc<SuspensionRegistry>,
    cooldown: CooldownRegistry,
    clock: Arc<dyn Clock>,
    audit: Arc<dyn AuditSink>,
    /// Serializes check-then-append per patient.
    patient_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl<J: DoseJournal, P: ProfileStore> DoseApprovalEngine<J, P> {
    pub fn new(
        config: EngineConfig,
        journal: J,
        profiles: P,
        suspension: Arc<SuspensionRegistry>,
        clock: Arc<dyn Clock>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        let cooldown = CooldownRegistry::new(config.caretaker_cooldown());
        Self {
            config,
            journal,
            profiles,
            suspension,
            cooldown,
            clock,
            audit,
            patient_locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn journal(&self) -> &J {
        &self.journal
    }

    pub fn profiles(&self) -> &P {
        &self.profiles
    }

    pub fn suspension(&self) -> &Arc<SuspensionRegistry> {
        &self.suspension
    }

    // ── Bolus ─────────────────────────────────────────────────

    pub fn request_bolus(&self, patient: &str, requester: &Requester, amount: f64) -> Result<Decision, DoseError> {
        check_finite("bolus", amount)?;
        let min = self.config.min_bolus_units;
        if amount < min - DOSE_EPSILON {
            return Err(ValidationError::BelowMinimum { amount, min }.into());
        }

        let lock = self.patient_lock(patient);
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);
        let now = self.clock.now();

        if let Some(remaining) = self.suspension.active_suspension(patient) {
            warn!("Bolus {amount:.2}U for {patient} rejected: delivery suspended");
            return Err(DoseError::SuspensionActive { remaining });
        }
        if let Some(caretaker) = requester.caretaker_id() {
            if let Some(remaining) = self.cooldown.remaining(patient, caretaker, now) {
                warn!("Bolus for {patient} by {caretaker} rejected: cooldown");
                return Err(DoseError::CooldownActive { remaining });
            }
        }

        let limits = self.profiles.dose_limits(patient)?;
        let per_dose_cap = limits.self_service_bolus_daily_cap * self.config.bolus_safety_multiplier;
        if amount > per_dose_cap + DOSE_EPSILON {
            return Err(ValidationError::AboveSafetyCap {
                amount,
                cap: per_dose_cap,
            }
            .into());
        }

        let cutoff = window_start(now, self.config.bolus_window());
        let history = self.journal.scan_since(patient, cutoff)?;
        let approved = approved_bolus_total(&history, cutoff);
        let status = if within_cap(approved + amount, limits.self_service_bolus_daily_cap) {
            DoseStatus::AutoApproved
        } else {
            DoseStatus::PendingApproval
        };

        let actor = Actor::from(requester);
        let record = DoseRecord::new(now, DoseKind::Bolus, amount, status, actor.clone());
        let seq = self.journal.append(patient, record.clone())?;
        if let Some(caretaker) = requester.caretaker_id() {
            self.cooldown.record(patient, caretaker, now);
        }

        info!(
            "BOLUS | patient={patient} by={actor} amount={amount:.2}U window={approved:.2}/{:.2}U -> {status:?} {seq}",
            limits.self_service_bolus_daily_cap
        );
        self.audit.record(&AuditEvent::BolusDecision {
            patient: patient.to_string(),
            actor,
            record: seq,
            amount,
            status,
        });
        Ok(Decision::from_entry(JournalEntry { seq, record }))
    }

    /// Submit a preset-sized bolus through [`request_bolus`](Self::request_bolus).
    pub fn request_bolus_preset(
        &self,
        patient: &str,
        requester: &Requester,
        preset: BolusPreset,
    ) -> Result<Decision, DoseError> {
        let limits = self.profiles.dose_limits(patient)?;
        let amount = limits.self_service_bolus_daily_cap * preset.fraction();
        self.request_bolus(patient, requester, amount)
    }

    pub fn bolus_allowance(&self, patient: &str) -> Result<BolusAllowance, DoseError> {
        let limits = self.profiles.dose_limits(patient)?;
        let cutoff = window_start(self.clock.now(), self.config.bolus_window());
        let history = self.journal.scan_since(patient, cutoff)?;
        let approved = approved_bolus_total(&history, cutoff);
        let cap = limits.self_service_bolus_daily_cap;
        Ok(BolusAllowance {
            daily_cap: cap,
            approved_in_window: approved,
            remaining: (cap - approved).max(0.0),
            per_dose_cap: cap * self.config.bolus_safety_multiplier,
            min_dose: self.config.min_bolus_units,
        })
    }

    // ── Basal ─────────────────────────────────────────────────

    /// Basal changes that auto-approve take effect on the profile at once;
    /// the journal also records the informational activation time.
    pub fn request_basal_change(
        &self,
        patient: &str,
        requester: &Requester,
        new_rate: f64,
    ) -> Result<Decision, DoseError> {
        check_finite("basal rate", new_rate)?;
        let (min, max) = (self.config.min_basal_rate, self.config.max_basal_rate);
        if new_rate < min - DOSE_EPSILON || new_rate > max + DOSE_EPSILON {
            return Err(ValidationError::RateOutOfBounds {
                rate: new_rate,
                min,
                max,
            }
            .into());
        }

        let lock = self.patient_lock(patient);
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);

        let mut limits = self.profiles.dose_limits(patient)?;
        let previous = limits.active_basal_rate;
        let step_cap = previous * self.config.basal_step_multiplier;
        if new_rate > step_cap + DOSE_EPSILON {
            return Err(ValidationError::RateAboveStepCap {
                rate: new_rate,
                cap: step_cap,
            }
            .into());
        }

        let now = self.clock.now();
        let actor = Actor::from(requester);
        let auto = within_cap(new_rate, limits.self_service_basal_max);
        let status = if auto {
            DoseStatus::AutoApproved
        } else {
            DoseStatus::PendingApproval
        };
        let mut record =
            DoseRecord::new(now, DoseKind::BasalChange, new_rate, status, actor.clone()).previous_rate(previous);
        if auto {
            let effective = now
                .checked_add_signed(self.config.basal_activation_delay())
                .unwrap_or(DateTime::<Utc>::MAX_UTC);
            record = record.effective_at(effective);
        }

        let seq = self.journal.append(patient, record.clone())?;
        if auto {
            limits.active_basal_rate = new_rate;
            self.profiles.save_limits(patient, &limits)?;
        }

        info!(
            "BASAL | patient={patient} by={actor} rate={previous:.2}->{new_rate:.2}U/h ceiling={:.2} -> {status:?} {seq}",
            limits.self_service_basal_max
        );
        self.audit.record(&AuditEvent::BasalDecision {
            patient: patient.to_string(),
            actor,
            record: seq,
            rate: new_rate,
            previous_rate: previous,
            status,
        });
        Ok(Decision::from_entry(JournalEntry { seq, record }))
    }

    // ── Clinician review ──────────────────────────────────────

    /// Requests still awaiting a clinician, oldest first.
    pub fn pending_requests(&self, patient: &str) -> Result<Vec<JournalEntry>, DoseError> {
        Ok(journal::pending_requests(&self.journal.replay(patient)?))
    }

    /// Append an Approved or Denied record for a pending request.
    ///
    /// Approving a basal change makes it the active rate and raises the
    /// self-service ceiling to it if the ceiling was lower.  Approving a
    /// bolus counts it as delivered from the time of approval and is
    /// refused while delivery is suspended.
    pub fn resolve(
        &self,
        patient: &str,
        target: RecordRef,
        action: ReviewAction,
        reviewer: &str,
    ) -> Result<JournalEntry, DoseError> {
        let lock = self.patient_lock(patient);
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);

        let entries = self.journal.replay(patient)?;
        let original = entries
            .iter()
            .find(|e| e.seq == target)
            .ok_or(ReviewError::UnknownRecord(target))?;
        if original.record.status != DoseStatus::PendingApproval {
            return Err(ReviewError::NotPending(target).into());
        }
        if is_resolved(&entries, target) {
            return Err(ReviewError::AlreadyResolved(target).into());
        }
        let (kind, amount) = (original.record.kind, original.record.amount);

        let approve = action == ReviewAction::Approve;
        if approve && kind == DoseKind::Bolus {
            if let Some(remaining) = self.suspension.active_suspension(patient) {
                return Err(DoseError::SuspensionActive { remaining });
            }
        }
        let basal_limits = if approve && kind == DoseKind::BasalChange {
            Some(self.profiles.dose_limits(patient)?)
        } else {
            None
        };

        let status = if approve {
            DoseStatus::Approved
        } else {
            DoseStatus::Denied
        };
        let mut record = DoseRecord::new(
            self.clock.now(),
            kind,
            amount,
            status,
            Actor::Clinician(reviewer.to_string()),
        )
        .resolving(target);
        if let Some(limits) = &basal_limits {
            record = record.previous_rate(limits.active_basal_rate);
        }
        let seq = self.journal.append(patient, record.clone())?;

        if let Some(mut limits) = basal_limits {
            limits.active_basal_rate = amount;
            if amount > limits.self_service_basal_max {
                limits.self_service_basal_max = amount;
            }
            self.profiles.save_limits(patient, &limits)?;
        }

        info!("REVIEW | patient={patient} reviewer={reviewer} {target} -> {status:?} {seq}");
        self.audit.record(&AuditEvent::RequestResolved {
            patient: patient.to_string(),
            reviewer: reviewer.to_string(),
            record: seq,
            resolves: target,
            status,
        });
        Ok(JournalEntry { seq, record })
    }

    /// Set self-service limits directly.  No journal record is written.
    pub fn adjust_limits(
        &self,
        patient: &str,
        clinician: &str,
        adjustment: LimitAdjustment,
    ) -> Result<DoseLimits, DoseError> {
        if let Some(rate) = adjustment.self_service_basal_max {
            check_limit(
                "self_service_basal_max",
                rate,
                self.config.min_basal_rate,
                self.config.max_basal_rate,
            )?;
        }
        if let Some(cap) = adjustment.bolus_daily_cap {
            check_limit(
                "bolus_daily_cap",
                cap,
                self.config.min_bolus_units,
                self.config.max_bolus_daily_cap,
            )?;
        }

        let lock = self.patient_lock(patient);
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);

        let mut limits = self.profiles.dose_limits(patient)?;
        if let Some(rate) = adjustment.self_service_basal_max {
            limits.self_service_basal_max = rate;
        }
        if let Some(cap) = adjustment.bolus_daily_cap {
            limits.self_service_bolus_daily_cap = cap;
        }
        self.profiles.save_limits(patient, &limits)?;

        info!(
            "LIMITS | patient={patient} clinician={clinician} basal_max={:.2}U/h bolus_cap={:.2}U",
            limits.self_service_basal_max, limits.self_service_bolus_daily_cap
        );
        self.audit.record(&AuditEvent::LimitsAdjusted {
            patient: patient.to_string(),
            clinician: clinician.to_string(),
            limits,
        });
        Ok(limits)
    }

    /// Full journal for `patient`, oldest first.
    pub fn dose_history(&self, patient: &str) -> Result<Vec<JournalEntry>, DoseError> {
        Ok(self.journal.replay(patient)?)
    }

    // ── Command dispatch ──────────────────────────────────────

    pub fn handle(&self, cmd: &DoseCommand) -> Result<CommandOutcome, DoseError> {
        match cmd {
            DoseCommand::Bolus {
                patient,
                requester,
                amount,
            } => self
                .request_bolus(patient, requester, *amount)
                .map(CommandOutcome::Decision),
            DoseCommand::BolusPreset {
                patient,
                requester,
                preset,
            } => self
                .request_bolus_preset(patient, requester, *preset)
                .map(CommandOutcome::Decision),
            DoseCommand::BasalChange {
                patient,
                requester,
                rate,
            } => self
                .request_basal_change(patient, requester, *rate)
                .map(CommandOutcome::Decision),
            DoseCommand::Resolve {
                patient,
                record,
                action,
                reviewer,
            } => self
                .resolve(patient, *record, *action, reviewer)
                .map(CommandOutcome::Resolved),
            DoseCommand::AdjustLimits {
                patient,
                clinician,
                adjustment,
            } => self
                .adjust_limits(patient, clinician, *adjustment)
                .map(CommandOutcome::LimitsAdjusted),
        }
    }

    // ── Internal ──────────────────────────────────────────────

    fn patient_lock(&self, patient: &str) -> Arc<Mutex<()>> {
        let mut locks = self.patient_locks.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(locks.entry(patient.to_string()).or_default())
    }
}

fn window_start(now: Timestamp, window: TimeDelta) -> Timestamp {
    now.checked_sub_signed(window).unwrap_or(DateTime::<Utc>::MIN_UTC)
}

fn check_finite(field: &'static str, value: f64) -> Result<(), ValidationError> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(ValidationError::NonFinite { field, value })
    }
}

fn check_limit(field: &'static str, value: f64, min: f64, max: f64) -> Result<(), ValidationError> {
    check_finite(field, value)?;
    if value < min - DOSE_EPSILON || value > max + DOSE_EPSILON {
        return Err(ValidationError::LimitOutOfBounds { field, value, min, max });
    }
    Ok(())
}
