//! Glucose feed monitor.
//!
//! A watcher consumes one patient's feed record by record.  Each parsed
//! reading goes to the suspension state machine first, then through the
//! LOW/HIGH alert check.  Between records the watcher sleeps for the poll
//! interval, racing the sleep against its cancel signal so that a session
//! end is observed within one interval.
//!
//! ```text
//!  FeedSource ──▶ parse ──▶ SuspensionRegistry::update
//!                   │                 │
//!                   ✗ skip            ▼
//!                          LOW/HIGH? ──▶ AlertSink · AlertLog · AuditSink
//!                                     │
//!                  ◀── Timer(poll) ⟷ cancel.wait() ──┘
//! ```

pub mod session;

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::signal::Signal;
use futures_lite::future;
use log::{debug, warn};

use crate::app::events::{AlertLevel, AuditEvent, GlucoseAlert};
use crate::app::ports::{AlertLog, AlertSink, AuditSink, FeedSource, RawReading};
use crate::error::ValidationError;
use crate::safety::SuspensionRegistry;

pub use session::MonitorSession;

/// Per-watcher cancellation flag.
pub type CancelSignal = Signal<CriticalSectionRawMutex, ()>;

/// A parsed feed record.
#[derive(Debug, Clone, PartialEq)]
pub struct GlucoseReading {
    pub timestamp: String,
    pub value: f64,
}

/// Parse the value of a raw feed record.  Non-numeric, non-finite, and
/// negative values are malformed.
pub fn parse_reading(raw: &RawReading) -> Result<GlucoseReading, ValidationError> {
    let text = raw.raw_value.trim();
    match text.parse::<f64>() {
        Ok(value) if value.is_finite() && value >= 0.0 => Ok(GlucoseReading {
            timestamp: raw.timestamp.trim().to_string(),
            value,
        }),
        _ => Err(ValidationError::MalformedReading(text.to_string())),
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AlertThresholds {
    pub low: f64,
    pub high: f64,
}

impl AlertThresholds {
    pub fn classify(&self, value: f64) -> Option<AlertLevel> {
        if value < self.low {
            Some(AlertLevel::Low)
        } else if value > self.high {
            Some(AlertLevel::High)
        } else {
            None
        }
    }
}

/// How a watcher ended.  Neither outcome is an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchExit {
    Exhausted,
    Cancelled,
}

// ── Watch context ─────────────────────────────────────────────

/// Everything a watcher needs besides its feed.  Shared by all watchers of
/// a session.
pub struct WatchContext {
    pub suspension: Arc<SuspensionRegistry>,
    pub alert_sink: Arc<dyn AlertSink>,
    pub alert_log: Arc<dyn AlertLog>,
    pub audit: Arc<dyn AuditSink>,
    pub thresholds: AlertThresholds,
    /// patient → feed timestamp of the last alert raised.
    last_alert: Mutex<HashMap<String, String>>,
}

impl WatchContext {
    pub fn new(
        suspension: Arc<SuspensionRegistry>,
        alert_sink: Arc<dyn AlertSink>,
        alert_log: Arc<dyn AlertLog>,
        audit: Arc<dyn AuditSink>,
        thresholds: AlertThresholds,
    ) -> Self {
        Self {
            suspension,
            alert_sink,
            alert_log,
            audit,
            thresholds,
            last_alert: Mutex::new(HashMap::new()),
        }
    }

    /// Apply one reading: suspension first, then the alert check.
    /// Returns the alert raised, if any.
    pub fn process(&self, patient: &str, reading: &GlucoseReading) -> Option<GlucoseAlert> {
        self.suspension.update(patient, reading.value);

        let level = self.thresholds.classify(reading.value)?;
        {
            let mut last = self.last_alert.lock().unwrap_or_else(PoisonError::into_inner);
            if last.get(patient).is_some_and(|ts| *ts == reading.timestamp) {
                return None;
            }
            last.insert(patient.to_string(), reading.timestamp.clone());
        }

        let alert = GlucoseAlert {
            patient: patient.to_string(),
            timestamp: reading.timestamp.clone(),
            value: reading.value,
            level,
        };
        self.alert_sink.notify(&alert);
        if let Err(e) = self.alert_log.append(&alert) {
            warn!("Alert log write failed for {patient} at {}: {e}", alert.timestamp);
        }
        self.audit.record(&AuditEvent::Alert(alert.clone()));
        Some(alert)
    }
}

// ── Watch loop ────────────────────────────────────────────────

/// Consume `feed` until it is exhausted or `cancel` fires.
pub async fn watch(
    ctx: &WatchContext,
    patient: &str,
    feed: &mut dyn FeedSource,
    poll_interval: Duration,
    cancel: &CancelSignal,
) -> WatchExit {
    loop {
        if cancel.signaled() {
            return WatchExit::Cancelled;
        }
        let Some(raw) = feed.next_reading() else {
            return WatchExit::Exhausted;
        };
        let reading = match parse_reading(&raw) {
            Ok(reading) => reading,
            Err(e) => {
                debug!("Feed {patient}: skipping record at {:?}: {e}", raw.timestamp);
                continue;
            }
        };
        ctx.process(patient, &reading);

        let cancelled = future::or(
            async {
                cancel.wait().await;
                true
            },
            async {
                async_io_mini::Timer::after(poll_interval).await;
                false
            },
        )
        .await;
        if cancelled {
            return WatchExit::Cancelled;
        }
    }
}
