//! JSON-backed patient profile store.
//!
//! Implements [`ProfileStore`] over a locked map.  The host binary loads it
//! from a JSON object of `patient id → DoseLimits` and every approved change
//! is written back to that file before it becomes visible.  Stores built
//! with [`JsonProfileStore::new`] have no backing file and live in memory.

use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use log::{info, warn};

use crate::app::ports::{DoseLimits, ProfileError, ProfileMap, ProfileStore, StorageError};

#[derive(Default)]
pub struct JsonProfileStore {
    profiles: Mutex<HashMap<String, DoseLimits>>,
    backing: Option<PathBuf>,
}

impl JsonProfileStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_map(profiles: ProfileMap) -> Self {
        Self {
            profiles: Mutex::new(profiles),
            backing: None,
        }
    }

    /// Load a JSON profile file and keep it as the write-back target.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let profiles: ProfileMap = serde_json::from_str(&text)?;
        info!("Loaded {} patient profiles from {}", profiles.len(), path.display());
        Ok(Self {
            profiles: Mutex::new(profiles),
            backing: Some(path.to_path_buf()),
        })
    }

    pub fn insert(&self, patient: &str, limits: DoseLimits) {
        self.profiles
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(patient.to_string(), limits);
    }
}

impl ProfileStore for JsonProfileStore {
    fn dose_limits(&self, patient: &str) -> Result<DoseLimits, ProfileError> {
        self.profiles
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(patient)
            .copied()
            .ok_or_else(|| ProfileError::UnknownPatient(patient.to_string()))
    }

    fn save_limits(&self, patient: &str, limits: &DoseLimits) -> Result<(), ProfileError> {
        let mut profiles = self.profiles.lock().unwrap_or_else(PoisonError::into_inner);
        if !profiles.contains_key(patient) {
            return Err(ProfileError::UnknownPatient(patient.to_string()));
        }
        if let Some(path) = &self.backing {
            let mut updated: BTreeMap<&str, &DoseLimits> =
                profiles.iter().map(|(id, l)| (id.as_str(), l)).collect();
            updated.insert(patient, limits);
            write_profiles(path, &updated).map_err(|e| {
                warn!("Profiles {}: write-back for {patient} failed: {e}", path.display());
                ProfileError::Unavailable(e.to_string())
            })?;
        }
        profiles.insert(patient.to_string(), *limits);
        Ok(())
    }

    fn patients(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .profiles
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        ids.sort();
        ids
    }
}

/// Replace the profile file through a synced sibling and a rename, so a
/// crash leaves either the old or the new file.
fn write_profiles(path: &Path, profiles: &BTreeMap<&str, &DoseLimits>) -> Result<(), StorageError> {
    let tmp = path.with_extension("json.tmp");
    let json = serde_json::to_vec_pretty(profiles)?;
    let mut file = File::create(&tmp)?;
    file.write_all(&json)?;
    file.sync_all()?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}
