//! Log-based sink adapters.
//!
//! Implements [`AuditSink`] and [`AlertSink`] by writing structured events
//! to the `log` facade.  A notification or telemetry adapter would
//! implement the same traits.

use log::{info, warn};

use crate::app::events::{AlertLevel, AuditEvent, GlucoseAlert};
use crate::app::ports::{AlertSink, AuditSink};

/// Adapter that logs every [`AuditEvent`].
pub struct LogAuditSink;

impl LogAuditSink {
    pub fn new() -> Self {
        Self
    }
}

impl Default for LogAuditSink {
    fn default() -> Self {
        Self::new()
    }
}

impl AuditSink for LogAuditSink {
    fn record(&self, event: &AuditEvent) {
        match event {
            AuditEvent::SuspensionStarted { patient, value, until } => {
                info!("AUDIT | suspend | patient={patient} glucose={value:.0} until={until}");
            }
            AuditEvent::SuspensionLifted { patient, value } => {
                info!("AUDIT | resume | patient={patient} glucose={value:.0}");
            }
            AuditEvent::SuspensionExpired { patient } => {
                info!("AUDIT | resume | patient={patient} reason=expired");
            }
            AuditEvent::Alert(a) => {
                info!(
                    "AUDIT | alert | patient={} level={} glucose={:.0} at={}",
                    a.patient, a.level, a.value, a.timestamp
                );
            }
            AuditEvent::BolusDecision {
                patient,
                actor,
                record,
                amount,
                status,
            } => {
                info!("AUDIT | bolus | patient={patient} by={actor} {record} amount={amount:.2}U status={status:?}");
            }
            AuditEvent::BasalDecision {
                patient,
                actor,
                record,
                rate,
                previous_rate,
                status,
            } => {
                info!(
                    "AUDIT | basal | patient={patient} by={actor} {record} rate={previous_rate:.2}->{rate:.2}U/h status={status:?}"
                );
            }
            AuditEvent::RequestResolved {
                patient,
                reviewer,
                record,
                resolves,
                status,
            } => {
                info!("AUDIT | review | patient={patient} reviewer={reviewer} {record} resolves={resolves} status={status:?}");
            }
            AuditEvent::LimitsAdjusted {
                patient,
                clinician,
                limits,
            } => {
                info!(
                    "AUDIT | limits | patient={patient} clinician={clinician} basal_max={:.2} bolus_cap={:.2}",
                    limits.self_service_basal_max, limits.self_service_bolus_daily_cap
                );
            }
        }
    }
}

/// Adapter that surfaces glucose alerts on the console.
pub struct LogAlertSink;

impl LogAlertSink {
    pub fn new() -> Self {
        Self
    }
}

impl Default for LogAlertSink {
    fn default() -> Self {
        Self::new()
    }
}

impl AlertSink for LogAlertSink {
    fn notify(&self, alert: &GlucoseAlert) {
        let direction = match alert.level {
            AlertLevel::Low => "below",
            AlertLevel::High => "above",
        };
        warn!(
            "ALERT {} | patient={} glucose {:.0}mg/dL {direction} range at {}",
            alert.level, alert.patient, alert.value, alert.timestamp
        );
    }
}
