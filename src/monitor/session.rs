//! Monitor session: one watcher thread per observed patient.
//!
//! A patient session watches the patient's own feed; a caretaker session
//! watches every assigned patient.  Each watcher runs on a dedicated named
//! thread driving [`watch`](super::watch) with `futures_lite::future::block_on`
//! and owns its own cancel signal.
//!
//! ```text
//!  MonitorSession
//!   ├─ "watch-p1"  block_on(watch(p1)) ◀── Signal
//!   ├─ "watch-p2"  block_on(watch(p2)) ◀── Signal
//!   └─ shutdown(): signal all, then join all
//! ```
//!
//! Dropping the session performs the same shutdown.

use std::collections::HashMap;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use log::{info, warn};

use super::{CancelSignal, WatchContext, WatchExit, watch};
use crate::app::ports::FeedSource;
use crate::error::MonitorError;

struct Watcher {
    cancel: Arc<CancelSignal>,
    handle: JoinHandle<WatchExit>,
}

pub struct MonitorSession {
    ctx: Arc<WatchContext>,
    poll_interval: Duration,
    watchers: HashMap<String, Watcher>,
}

impl MonitorSession {
    pub fn new(ctx: Arc<WatchContext>, poll_interval: Duration) -> Self {
        Self {
            ctx,
            poll_interval,
            watchers: HashMap::new(),
        }
    }

    /// Start watching `patient`.  A watcher whose feed already ran out is
    /// replaced; a live one is an error.
    pub fn start_watch(&mut self, patient: &str, mut feed: Box<dyn FeedSource>) -> Result<(), MonitorError> {
        if let Some(existing) = self.watchers.get(patient) {
            if !existing.handle.is_finished() {
                return Err(MonitorError::AlreadyWatching(patient.to_string()));
            }
            if let Some(done) = self.watchers.remove(patient) {
                join_watcher(patient, done);
            }
        }

        let cancel = Arc::new(CancelSignal::new());
        let ctx = Arc::clone(&self.ctx);
        let thread_cancel = Arc::clone(&cancel);
        let poll = self.poll_interval;
        let id = patient.to_string();

        let handle = std::thread::Builder::new()
            .name(format!("watch-{patient}"))
            .spawn(move || {
                let exit = futures_lite::future::block_on(watch(&ctx, &id, feed.as_mut(), poll, &thread_cancel));
                info!("Watcher {id} finished: {exit:?}");
                exit
            })?;

        info!("Watching {patient} (poll {}ms)", poll.as_millis());
        self.watchers.insert(patient.to_string(), Watcher { cancel, handle });
        Ok(())
    }

    /// Start one watcher per `(patient, feed)` pair, as a caretaker session does.
    pub fn watch_patients(
        &mut self,
        feeds: impl IntoIterator<Item = (String, Box<dyn FeedSource>)>,
    ) -> Result<(), MonitorError> {
        for (patient, feed) in feeds {
            self.start_watch(&patient, feed)?;
        }
        Ok(())
    }

    /// Cancel and join one watcher.  `None` if it was not running.
    pub fn cancel_watch(&mut self, patient: &str) -> Option<WatchExit> {
        let watcher = self.watchers.remove(patient)?;
        watcher.cancel.signal(());
        join_watcher(patient, watcher)
    }

    /// Patients with a watcher that has not yet been joined.
    pub fn watched_patients(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.watchers.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Wait for every watcher to run its feed dry without cancelling it.
    pub fn drain(&mut self) -> Vec<(String, WatchExit)> {
        let watchers: Vec<(String, Watcher)> = self.watchers.drain().collect();
        watchers
            .into_iter()
            .filter_map(|(id, w)| join_watcher(&id, w).map(|exit| (id, exit)))
            .collect()
    }

    /// Broadcast cancellation to every watcher, then join them all.
    pub fn shutdown(&mut self) -> Vec<(String, WatchExit)> {
        for watcher in self.watchers.values() {
            watcher.cancel.signal(());
        }
        let exits = self.drain();
        if !exits.is_empty() {
            info!("Monitor session stopped ({} watchers)", exits.len());
        }
        exits
    }
}

impl Drop for MonitorSession {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn join_watcher(patient: &str, watcher: Watcher) -> Option<WatchExit> {
    match watcher.handle.join() {
        Ok(exit) => Some(exit),
        Err(_) => {
            warn!("Watcher {patient} panicked");
            None
        }
    }
}
