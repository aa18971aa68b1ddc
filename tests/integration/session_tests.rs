//! Monitor sessions: concurrent watchers, duplicate watches, cancellation.

use std::sync::Arc;
use std::time::{Duration, Instant};

use aidguard::adapters::alert_log::MemoryAlertLog;
use aidguard::adapters::feed::VecFeed;
use aidguard::app::ports::FeedSource;
use aidguard::config::EngineConfig;
use aidguard::error::MonitorError;
use aidguard::monitor::{MonitorSession, WatchContext, WatchExit};
use aidguard::safety::SuspensionRegistry;

use crate::mocks::{EndlessFeed, RecordingAlerts, harness, limits};

fn context(suspension: Arc<SuspensionRegistry>) -> Arc<WatchContext> {
    let h = harness(limits(1.2, 1.0, 5.0));
    Arc::new(WatchContext::new(
        suspension,
        Arc::new(RecordingAlerts::default()),
        Arc::new(MemoryAlertLog::new()),
        h.audit,
        EngineConfig::default().alert_thresholds(),
    ))
}

fn suspension() -> Arc<SuspensionRegistry> {
    harness(limits(1.2, 1.0, 5.0)).suspension
}

fn feed(pairs: &[(&str, &str)]) -> Box<dyn FeedSource> {
    Box::new(VecFeed::from_pairs(pairs.iter().copied()))
}

#[test]
fn caretaker_session_watches_each_patient() {
    let registry = suspension();
    let mut session = MonitorSession::new(context(Arc::clone(&registry)), Duration::ZERO);
    session
        .watch_patients([
            ("p1".to_string(), feed(&[("t1", "90"), ("t2", "45")])),
            ("p2".to_string(), feed(&[("t1", "48"), ("t2", "x"), ("t3", "70")])),
        ])
        .unwrap();
    assert_eq!(session.watched_patients(), vec!["p1", "p2"]);

    let mut exits = session.drain();
    exits.sort_by(|a, b| a.0.cmp(&b.0));
    assert_eq!(
        exits,
        vec![("p1".to_string(), WatchExit::Exhausted), ("p2".to_string(), WatchExit::Exhausted)]
    );
    assert!(registry.is_suspended("p1"));
    assert!(registry.is_suspended("p2"));
    assert!(session.watched_patients().is_empty());
}

#[test]
fn second_live_watch_is_rejected() {
    let mut session = MonitorSession::new(context(suspension()), Duration::from_millis(10));
    session.start_watch("p1", Box::new(EndlessFeed::new())).unwrap();
    assert!(matches!(
        session.start_watch("p1", Box::new(EndlessFeed::new())),
        Err(MonitorError::AlreadyWatching(id)) if id == "p1"
    ));
    assert_eq!(session.cancel_watch("p1"), Some(WatchExit::Cancelled));
    assert_eq!(session.cancel_watch("p1"), None);
}

#[test]
fn cancel_interrupts_a_long_poll() {
    let mut session = MonitorSession::new(context(suspension()), Duration::from_secs(30));
    session.start_watch("p1", Box::new(EndlessFeed::new())).unwrap();
    std::thread::sleep(Duration::from_millis(50));

    let started = Instant::now();
    assert_eq!(session.cancel_watch("p1"), Some(WatchExit::Cancelled));
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[test]
fn shutdown_stops_every_watcher() {
    let mut session = MonitorSession::new(context(suspension()), Duration::from_secs(30));
    session.start_watch("p1", Box::new(EndlessFeed::new())).unwrap();
    session.start_watch("p2", Box::new(EndlessFeed::new())).unwrap();

    let exits = session.shutdown();
    assert_eq!(exits.len(), 2);
    assert!(exits.iter().all(|(_, exit)| *exit == WatchExit::Cancelled));
}

#[test]
fn dropping_the_session_joins_watchers() {
    let started = Instant::now();
    {
        let mut session = MonitorSession::new(context(suspension()), Duration::from_secs(30));
        session.start_watch("p1", Box::new(EndlessFeed::new())).unwrap();
    }
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[test]
fn finished_watcher_can_be_restarted() {
    let registry = suspension();
    let mut session = MonitorSession::new(context(Arc::clone(&registry)), Duration::ZERO);
    session.start_watch("p1", feed(&[("t1", "45")])).unwrap();

    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        match session.start_watch("p1", feed(&[("t2", "120")])) {
            Ok(()) => break,
            Err(MonitorError::AlreadyWatching(_)) if Instant::now() < deadline => {
                std::thread::sleep(Duration::from_millis(10));
            }
            Err(e) => panic!("restart failed: {e}"),
        }
    }
    let exits = session.drain();
    assert_eq!(exits, vec![("p1".to_string(), WatchExit::Exhausted)]);
    assert!(!registry.is_suspended("p1"));
}
