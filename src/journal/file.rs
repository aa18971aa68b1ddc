//! File-backed dose journal.
//!
//! One JSON line per record in `<root>/insulin_log_<patient>.jsonl`.
//! Appends hold the patient's ledger lock, write a full line, and
//! `sync_data` before the position is returned.
//!
//! ## Recovery
//!
//! - A trailing line that does not parse is a torn write from a crash; it
//!   is truncated away when the ledger is first opened.
//! - A valid final record missing its newline gets one before the next
//!   append, so the two records never share a line.
//! - An unparsable line followed by valid ones is corruption.  Replay
//!   fails closed rather than under-count delivered insulin.
//! - A failed write or sync truncates the file back to its length before
//!   the append, so a rejected record leaves no bytes behind.

use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use log::{error, info, warn};

use super::{DoseJournal, DoseRecord, JournalEntry, RecordRef};
use crate::error::JournalError;

/// Longest journal line accepted on replay.
const MAX_LINE_LEN: usize = 4096;

/// Patient ids become file names, so only `[A-Za-z0-9_-]` is allowed.
pub fn is_valid_patient_id(patient: &str) -> bool {
    !patient.is_empty()
        && patient.len() <= 64
        && patient
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

/// Decode one journal line.
pub fn decode_line(line: &str) -> Result<JournalEntry, serde_json::Error> {
    serde_json::from_str(line)
}

struct Ledger {
    file: File,
    path: PathBuf,
    next_seq: u64,
}

pub struct FileJournal {
    root: PathBuf,
    ledgers: Mutex<HashMap<String, Arc<Mutex<Ledger>>>>,
}

impl FileJournal {
    /// Create the journal directory if needed.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, JournalError> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        info!("Dose journal at {}", root.display());
        Ok(Self {
            root,
            ledgers: Mutex::new(HashMap::new()),
        })
    }

    pub fn path_for(&self, patient: &str) -> PathBuf {
        self.root.join(format!("insulin_log_{patient}.jsonl"))
    }

    fn ledger(&self, patient: &str) -> Result<Arc<Mutex<Ledger>>, JournalError> {
        if !is_valid_patient_id(patient) {
            return Err(JournalError::InvalidPatientId(patient.to_string()));
        }
        let mut ledgers = self.ledgers.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(ledger) = ledgers.get(patient) {
            return Ok(Arc::clone(ledger));
        }

        let path = self.path_for(patient);
        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&path)?;
        let scan = scan_file(&path)?;
        if let Some(offset) = scan.torn_tail_at {
            warn!("Journal {}: truncating torn trailing record at byte {offset}", path.display());
            file.set_len(offset)?;
            file.sync_data()?;
        } else if scan.unterminated_tail {
            warn!("Journal {}: terminating final record", path.display());
            file.write_all(b"\n")?;
            file.sync_data()?;
        }
        let next_seq = scan.entries.last().map_or(0, |e| e.seq.0 + 1);

        let ledger = Arc::new(Mutex::new(Ledger { file, path, next_seq }));
        ledgers.insert(patient.to_string(), Arc::clone(&ledger));
        Ok(ledger)
    }
}

impl DoseJournal for FileJournal {
    fn append(&self, patient: &str, record: DoseRecord) -> Result<RecordRef, JournalError> {
        let ledger = self.ledger(patient)?;
        let mut ledger = ledger.lock().unwrap_or_else(PoisonError::into_inner);

        let seq = RecordRef(ledger.next_seq);
        let line = serde_json::to_string(&JournalEntry { seq, record })?;
        append_line(&mut ledger.file, &line).inspect_err(|e| {
            warn!("Journal {}: append of {seq} failed: {e}", ledger.path.display());
        })?;
        ledger.next_seq += 1;
        Ok(seq)
    }

    fn replay(&self, patient: &str) -> Result<Vec<JournalEntry>, JournalError> {
        let ledger = self.ledger(patient)?;
        let ledger = ledger.lock().unwrap_or_else(PoisonError::into_inner);
        let scan = scan_file(&ledger.path)?;
        if scan.torn_tail_at.is_some() {
            warn!("Journal {}: ignoring incomplete trailing record", ledger.path.display());
        }
        Ok(scan.entries)
    }
}

// ── Durable append ────────────────────────────────────────────

/// The file operations an append needs.
trait LedgerFile: Write {
    fn size(&self) -> io::Result<u64>;
    fn sync(&self) -> io::Result<()>;
    fn truncate(&self, len: u64) -> io::Result<()>;
}

impl LedgerFile for File {
    fn size(&self) -> io::Result<u64> {
        Ok(self.metadata()?.len())
    }

    fn sync(&self) -> io::Result<()> {
        self.sync_data()
    }

    fn truncate(&self, len: u64) -> io::Result<()> {
        self.set_len(len)
    }
}

/// Write `line` plus newline and sync it.  On failure the file is cut back
/// to its prior length.
fn append_line(file: &mut impl LedgerFile, line: &str) -> io::Result<()> {
    let start = file.size()?;
    let written = write_synced(file, line);
    if written.is_err() {
        if let Err(e) = file.truncate(start).and_then(|()| file.sync()) {
            error!("Journal rollback to byte {start} failed: {e}");
        }
    }
    written
}

fn write_synced(file: &mut impl LedgerFile, line: &str) -> io::Result<()> {
    writeln!(file, "{line}")?;
    file.flush()?;
    file.sync()
}

// ── Replay ────────────────────────────────────────────────────

struct Scan {
    entries: Vec<JournalEntry>,
    /// Byte offset of an unparsable final line, if any.
    torn_tail_at: Option<u64>,
    /// The final line parsed but has no trailing newline.
    unterminated_tail: bool,
}

fn scan_file(path: &Path) -> Result<Scan, JournalError> {
    let mut reader = BufReader::new(File::open(path)?);
    let mut entries = Vec::new();
    let mut offset: u64 = 0;
    let mut line_no: usize = 0;
    let mut bad_line: Option<(usize, u64, String)> = None;
    let mut buf = Vec::new();
    let mut unterminated_tail = false;

    loop {
        buf.clear();
        let read = reader.read_until(b'\n', &mut buf)?;
        if read == 0 {
            break;
        }
        line_no += 1;
        unterminated_tail = buf.last() != Some(&b'\n');

        if let Some((line, _, reason)) = bad_line.take() {
            return Err(corrupt(path, line, &reason));
        }

        let parsed = if buf.len() > MAX_LINE_LEN {
            Err(format!("line exceeds {MAX_LINE_LEN} bytes"))
        } else {
            match std::str::from_utf8(&buf) {
                Ok(text) if text.trim().is_empty() => {
                    offset += read as u64;
                    continue;
                }
                Ok(text) => decode_line(text.trim()).map_err(|e| e.to_string()),
                Err(e) => Err(e.to_string()),
            }
        };

        match parsed {
            Ok(entry) => entries.push(entry),
            Err(reason) => bad_line = Some((line_no, offset, reason)),
        }
        offset += read as u64;
    }

    Ok(Scan {
        entries,
        torn_tail_at: bad_line.map(|(_, at, _)| at),
        unterminated_tail,
    })
}

fn corrupt(path: &Path, line: usize, reason: &str) -> JournalError {
    JournalError::Io(std::io::Error::new(
        std::io::ErrorKind::InvalidData,
        format!("{} line {line}: {reason}", path.display()),
    ))
}
