//! Feed monitor: suspension driving, LOW/HIGH alerts, deduplication, and
//! tolerance of malformed records and alert-log failures.

use std::sync::Arc;
use std::time::Duration;

use aidguard::adapters::alert_log::MemoryAlertLog;
use aidguard::adapters::feed::{CsvFeed, VecFeed, feed_path};
use aidguard::app::events::AlertLevel;
use aidguard::app::ports::{AlertLog, AlertSink};
use aidguard::config::EngineConfig;
use aidguard::monitor::{CancelSignal, GlucoseReading, WatchContext, WatchExit, watch};
use futures_lite::future::block_on;

use crate::mocks::{FailingAlertLog, PATIENT, RecordingAlerts, RecordingAudit, harness, limits};

struct Rig {
    ctx: WatchContext,
    alerts: Arc<RecordingAlerts>,
    audit: Arc<RecordingAudit>,
}

fn rig(alert_log: Arc<dyn AlertLog>) -> Rig {
    let h = harness(limits(1.2, 1.0, 5.0));
    let alerts = Arc::new(RecordingAlerts::default());
    let ctx = WatchContext::new(
        Arc::clone(&h.suspension),
        alerts.clone() as Arc<dyn AlertSink>,
        alert_log,
        h.audit.clone(),
        EngineConfig::default().alert_thresholds(),
    );
    Rig {
        ctx,
        alerts,
        audit: h.audit,
    }
}

fn reading(ts: &str, value: f64) -> GlucoseReading {
    GlucoseReading {
        timestamp: ts.to_string(),
        value,
    }
}

#[test]
fn reading_sequence_drives_suspension() {
    let r = rig(Arc::new(MemoryAlertLog::new()));
    let steps = [(80.0, false), (45.0, true), (60.0, true), (110.0, false)];
    for (i, (value, suspended)) in steps.into_iter().enumerate() {
        r.ctx.process(PATIENT, &reading(&format!("t{i}"), value));
        assert_eq!(r.ctx.suspension.is_suspended(PATIENT), suspended, "after {value}");
    }
    let crit = r.ctx.suspension.last_critical(PATIENT).unwrap();
    assert_eq!(crit.value, 45.0);
}

#[test]
fn alerts_fire_on_both_thresholds_and_are_logged() {
    let log = Arc::new(MemoryAlertLog::new());
    let r = rig(log.clone());
    for (ts, v) in [("a", 69.0), ("b", 70.0), ("c", 150.0), ("d", 181.0)] {
        r.ctx.process(PATIENT, &reading(ts, v));
    }
    let sent = r.alerts.alerts.lock().unwrap().clone();
    let levels: Vec<AlertLevel> = sent.iter().map(|a| a.level).collect();
    assert_eq!(levels, vec![AlertLevel::Low, AlertLevel::High]);
    assert_eq!(log.history(PATIENT).unwrap(), sent);
    assert_eq!(r.audit.tags(), vec!["alert", "alert"]);
}

#[test]
fn repeated_timestamp_raises_one_alert() {
    let r = rig(Arc::new(MemoryAlertLog::new()));
    assert!(r.ctx.process(PATIENT, &reading("08:00", 60.0)).is_some());
    assert!(r.ctx.process(PATIENT, &reading("08:00", 60.0)).is_none());
    assert!(r.ctx.process(PATIENT, &reading("08:05", 60.0)).is_some());
    // Dedup is per patient.
    assert!(r.ctx.process("p2", &reading("08:05", 60.0)).is_some());
}

#[test]
fn watch_skips_malformed_records_and_exhausts() {
    let r = rig(Arc::new(MemoryAlertLog::new()));
    let mut feed = VecFeed::from_pairs([("t1", "abc"), ("t2", ""), ("t3", "44"), ("t4", "NaN")]);
    let cancel = CancelSignal::new();
    let exit = block_on(watch(&r.ctx, PATIENT, &mut feed, Duration::ZERO, &cancel));
    assert_eq!(exit, WatchExit::Exhausted);
    assert!(r.ctx.suspension.is_suspended(PATIENT));
    assert_eq!(r.alerts.alerts.lock().unwrap().len(), 1);
}

#[test]
fn alert_log_failure_does_not_stop_the_watcher() {
    let r = rig(Arc::new(FailingAlertLog));
    let mut feed = VecFeed::from_pairs([("t1", "55"), ("t2", "250"), ("t3", "40")]);
    let cancel = CancelSignal::new();
    let exit = block_on(watch(&r.ctx, PATIENT, &mut feed, Duration::ZERO, &cancel));
    assert_eq!(exit, WatchExit::Exhausted);
    assert_eq!(r.alerts.alerts.lock().unwrap().len(), 3);
    assert!(r.ctx.suspension.is_suspended(PATIENT));
}

#[test]
fn pre_signalled_watch_consumes_nothing() {
    let r = rig(Arc::new(MemoryAlertLog::new()));
    let mut feed = VecFeed::from_pairs([("t1", "30")]);
    let cancel = CancelSignal::new();
    cancel.signal(());
    let exit = block_on(watch(&r.ctx, PATIENT, &mut feed, Duration::ZERO, &cancel));
    assert_eq!(exit, WatchExit::Cancelled);
    assert!(!r.ctx.suspension.is_suspended(PATIENT));
}

#[test]
fn undecodable_feed_line_does_not_hide_later_lows() {
    let dir = tempfile::tempdir().unwrap();
    let path = feed_path(dir.path(), PATIENT);
    std::fs::write(&path, b"08:00,80\n08:01,\xff\xfe\n08:02,45\n").unwrap();

    let r = rig(Arc::new(MemoryAlertLog::new()));
    let mut feed = CsvFeed::open(&path).unwrap();
    let cancel = CancelSignal::new();
    let exit = block_on(watch(&r.ctx, PATIENT, &mut feed, Duration::ZERO, &cancel));
    assert_eq!(exit, WatchExit::Exhausted);
    assert!(r.ctx.suspension.is_suspended(PATIENT));
}
