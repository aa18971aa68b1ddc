//! Glucose feed adapters.
//!
//! - [`CsvFeed`]: reads `timestamp,value` lines from a simulated CGM file,
//!   one record per call.  Lines without a comma are skipped here; value
//!   parsing is left to the monitor.
//! - [`VecFeed`]: a fixed list of records, for simulation and tests.

use std::collections::VecDeque;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use log::{debug, warn};

use crate::app::ports::{FeedSource, RawReading};

/// Split one feed line into its timestamp label and raw value.
pub fn parse_line(line: &str) -> Option<RawReading> {
    let (timestamp, raw_value) = line.trim_end_matches(['\r', '\n']).split_once(',')?;
    Some(RawReading {
        timestamp: timestamp.to_string(),
        raw_value: raw_value.to_string(),
    })
}

/// Conventional feed location for a patient under `dir`.
pub fn feed_path(dir: &Path, patient: &str) -> PathBuf {
    dir.join(format!("glucose_readings_{patient}.csv"))
}

pub struct CsvFeed {
    reader: BufReader<File>,
    path: PathBuf,
    buf: Vec<u8>,
}

impl CsvFeed {
    pub fn open(path: impl Into<PathBuf>) -> std::io::Result<Self> {
        let path = path.into();
        let reader = BufReader::new(File::open(&path)?);
        Ok(Self {
            reader,
            path,
            buf: Vec::new(),
        })
    }
}

impl FeedSource for CsvFeed {
    fn next_reading(&mut self) -> Option<RawReading> {
        loop {
            self.buf.clear();
            match self.reader.read_until(b'\n', &mut self.buf) {
                Ok(0) => return None,
                Ok(_) => {
                    let Ok(line) = std::str::from_utf8(&self.buf) else {
                        debug!("Feed {}: skipping line that is not UTF-8", self.path.display());
                        continue;
                    };
                    if let Some(reading) = parse_line(line) {
                        return Some(reading);
                    }
                    if !line.trim().is_empty() {
                        debug!("Feed {}: skipping line without a value: {:?}", self.path.display(), line.trim());
                    }
                }
                Err(e) => {
                    warn!("Feed {}: read failed, treating as exhausted: {e}", self.path.display());
                    return None;
                }
            }
        }
    }
}

pub struct VecFeed {
    records: VecDeque<RawReading>,
}

impl VecFeed {
    pub fn new(records: impl IntoIterator<Item = RawReading>) -> Self {
        Self {
            records: records.into_iter().collect(),
        }
    }

    /// Build from `(timestamp, raw value)` pairs.
    pub fn from_pairs<'a>(pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        Self::new(pairs.into_iter().map(|(ts, v)| RawReading {
            timestamp: ts.to_string(),
            raw_value: v.to_string(),
        }))
    }
}

impl FeedSource for VecFeed {
    fn next_reading(&mut self) -> Option<RawReading> {
        self.records.pop_front()
    }
}
