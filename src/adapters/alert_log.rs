//! Alert log adapters.
//!
//! [`FileAlertLog`] appends one JSON line per alert to
//! `<dir>/alerts_log_<patient>.jsonl`; [`MemoryAlertLog`] keeps them in a
//! vector.  Both replay a patient's alerts in append order.

use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, ErrorKind, Write};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};

use log::warn;

use crate::app::events::GlucoseAlert;
use crate::app::ports::{AlertLog, StorageError};
use crate::journal::file::is_valid_patient_id;

pub struct FileAlertLog {
    dir: PathBuf,
    /// Serializes writers per patient file.
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl FileAlertLog {
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            locks: Mutex::new(HashMap::new()),
        })
    }

    fn path_for(&self, patient: &str) -> Result<PathBuf, StorageError> {
        if !is_valid_patient_id(patient) {
            return Err(StorageError::InvalidKey(patient.to_string()));
        }
        Ok(self.dir.join(format!("alerts_log_{patient}.jsonl")))
    }

    fn lock_for(&self, patient: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(locks.entry(patient.to_string()).or_default())
    }
}

impl AlertLog for FileAlertLog {
    fn append(&self, alert: &GlucoseAlert) -> Result<(), StorageError> {
        let path = self.path_for(&alert.patient)?;
        let line = serde_json::to_string(alert)?;
        let lock = self.lock_for(&alert.patient);
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        writeln!(file, "{line}")?;
        file.flush()?;
        Ok(())
    }

    fn history(&self, patient: &str) -> Result<Vec<GlucoseAlert>, StorageError> {
        let path = self.path_for(patient)?;
        let lock = self.lock_for(patient);
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);
        let file = match File::open(&path) {
            Ok(f) => f,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut alerts = Vec::new();
        for line in BufReader::new(file).lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str(&line) {
                Ok(alert) => alerts.push(alert),
                Err(e) => warn!("Alert log {}: skipping unreadable line: {e}", path.display()),
            }
        }
        Ok(alerts)
    }
}

#[derive(Default)]
pub struct MemoryAlertLog {
    alerts: Mutex<Vec<GlucoseAlert>>,
}

impl MemoryAlertLog {
    pub fn new() -> Self {
        Self::default()
    }
}

impl AlertLog for MemoryAlertLog {
    fn append(&self, alert: &GlucoseAlert) -> Result<(), StorageError> {
        self.alerts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(alert.clone());
        Ok(())
    }

    fn history(&self, patient: &str) -> Result<Vec<GlucoseAlert>, StorageError> {
        Ok(self
            .alerts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|a| a.patient == patient)
            .cloned()
            .collect())
    }
}
