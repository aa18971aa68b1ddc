//! AidGuard: host simulation entry point.
//!
//! Hexagonal wiring of the dosing engine and the feed monitors.
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │                      Adapters (outer ring)                     │
//! │                                                                │
//! │  SystemClock   LogAuditSink   LogAlertSink   FileAlertLog      │
//! │  (Clock)       (AuditSink)    (AlertSink)    (AlertLog)        │
//! │  CsvFeed       JsonProfileStore              FileJournal       │
//! │  (FeedSource)  (ProfileStore)                (DoseJournal)     │
//! │                                                                │
//! │  ──────────────── Port Trait Boundary ───────────────────      │
//! │                                                                │
//! │  ┌────────────────────────────────────────────────────────┐    │
//! │  │  DoseApprovalEngine ◀── SuspensionRegistry ◀── watchers │    │
//! │  └────────────────────────────────────────────────────────┘    │
//! │                                                                │
//! │  MonitorSession (one thread per watched patient)               │
//! └────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Usage: `aidguard [config.json]`.  Under the configured data directory
//! the binary expects `profiles.json`, glucose feeds in
//! `glucose/glucose_readings_<id>.csv`, and an optional scripted command
//! list in `commands.json`.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use log::{info, warn};

use aidguard::adapters::alert_log::FileAlertLog;
use aidguard::adapters::feed::{CsvFeed, feed_path};
use aidguard::adapters::log_sink::{LogAlertSink, LogAuditSink};
use aidguard::adapters::profile::JsonProfileStore;
use aidguard::adapters::time::SystemClock;
use aidguard::app::commands::DoseCommand;
use aidguard::app::ports::{AuditSink, Clock, FeedSource, ProfileStore};
use aidguard::app::service::{CommandOutcome, DoseApprovalEngine};
use aidguard::config::EngineConfig;
use aidguard::journal::FileJournal;
use aidguard::monitor::{MonitorSession, WatchContext};
use aidguard::safety::SuspensionRegistry;

fn main() -> Result<()> {
    env_logger::init_from_env(env_logger::Env::default().default_filter_or("info"));

    let config = match std::env::args().nth(1) {
        Some(path) => EngineConfig::load(&path).with_context(|| format!("loading config {path}"))?,
        None => EngineConfig::default(),
    };
    info!("AidGuard starting, data dir {}", config.data_dir.display());

    // ── Adapters ──────────────────────────────────────────────
    let clock: Arc<dyn Clock> = Arc::new(SystemClock::new());
    let audit: Arc<dyn AuditSink> = Arc::new(LogAuditSink::new());
    let profiles = JsonProfileStore::load(config.data_dir.join("profiles.json")).context("loading profiles")?;
    let journal = FileJournal::open(config.journal_dir())?;
    let alert_log = Arc::new(FileAlertLog::open(config.alert_dir())?);
    let suspension = Arc::new(SuspensionRegistry::new(&config, Arc::clone(&clock), Arc::clone(&audit)));

    // ── Monitor session ───────────────────────────────────────
    let ctx = Arc::new(WatchContext::new(
        Arc::clone(&suspension),
        Arc::new(LogAlertSink::new()),
        alert_log,
        Arc::clone(&audit),
        config.alert_thresholds(),
    ));
    let mut session = MonitorSession::new(ctx, config.poll_interval());
    session.watch_patients(open_feeds(&config.feed_dir(), &profiles.patients()))?;

    // ── Interactive flow (scripted) ───────────────────────────
    let engine = DoseApprovalEngine::new(config.clone(), journal, profiles, suspension, clock, audit);
    for cmd in load_script(&config.data_dir.join("commands.json"))? {
        match engine.handle(&cmd) {
            Ok(CommandOutcome::Decision(d)) => info!("{cmd:?} -> {d:?}"),
            Ok(CommandOutcome::Resolved(entry)) => info!("{cmd:?} -> resolved as {entry:?}"),
            Ok(CommandOutcome::LimitsAdjusted(limits)) => info!("{cmd:?} -> {limits:?}"),
            Err(e) => warn!("{cmd:?} rejected: {e}"),
        }
    }

    for patient in engine.profiles().patients() {
        let pending = engine.pending_requests(&patient)?;
        let allowance = engine.bolus_allowance(&patient)?;
        info!(
            "SUMMARY | patient={patient} pending={} bolus_remaining={:.2}U suspended={}",
            pending.len(),
            allowance.remaining,
            engine.suspension().is_suspended(&patient)
        );
    }

    for (patient, exit) in session.drain() {
        info!("Feed for {patient} ended: {exit:?}");
    }
    Ok(())
}

/// Open every patient's feed that exists; missing feeds are logged and skipped.
fn open_feeds(dir: &Path, patients: &[String]) -> Vec<(String, Box<dyn FeedSource>)> {
    patients
        .iter()
        .filter_map(|patient| match CsvFeed::open(feed_path(dir, patient)) {
            Ok(feed) => Some((patient.clone(), Box::new(feed) as Box<dyn FeedSource>)),
            Err(e) => {
                warn!("No glucose feed for {patient}: {e}");
                None
            }
        })
        .collect()
}

fn load_script(path: &Path) -> Result<Vec<DoseCommand>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let text = std::fs::read_to_string(path)?;
    serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))
}
