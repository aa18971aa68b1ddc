//! In-memory dose journal for simulation and tests.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use super::{DoseJournal, DoseRecord, JournalEntry, RecordRef};
use crate::error::JournalError;

#[derive(Default)]
pub struct MemoryJournal {
    ledgers: Mutex<HashMap<String, Vec<JournalEntry>>>,
}

impl MemoryJournal {
    pub fn new() -> Self {
        Self::default()
    }
}

impl DoseJournal for MemoryJournal {
    fn append(&self, patient: &str, record: DoseRecord) -> Result<RecordRef, JournalError> {
        let mut ledgers = self.ledgers.lock().unwrap_or_else(PoisonError::into_inner);
        let ledger = ledgers.entry(patient.to_string()).or_default();
        let seq = RecordRef(ledger.len() as u64);
        ledger.push(JournalEntry { seq, record });
        Ok(seq)
    }

    fn replay(&self, patient: &str) -> Result<Vec<JournalEntry>, JournalError> {
        let ledgers = self.ledgers.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(ledgers.get(patient).cloned().unwrap_or_default())
    }
}
