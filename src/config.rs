//! Engine configuration parameters
//!
//! All tunable safety thresholds and timing for the dosing engine.
//! Defaults are the clinical constants the engine ships with; a JSON file
//! may override any subset of them via [`EngineConfig::load`].

use std::ops::RangeInclusive;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::TimeDelta;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::monitor::AlertThresholds;

/// Permitted range for the LOW glucose alert threshold (mg/dL).
pub const LOW_ALERT_RANGE: RangeInclusive<f64> = 40.0..=70.0;
/// Permitted range for the HIGH glucose alert threshold (mg/dL).
pub const HIGH_ALERT_RANGE: RangeInclusive<f64> = 180.0..=300.0;

/// Core engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    // --- Suspension ---
    /// Glucose below this value (mg/dL) suspends insulin delivery
    pub critical_glucose_mg_dl: f64,
    /// Glucose above this value (mg/dL) lifts an active suspension early
    pub recovery_glucose_mg_dl: f64,
    /// How long a suspension lasts without an early recovery (seconds)
    pub suspension_duration_secs: u64,

    // --- Alerts ---
    /// Readings below this raise a LOW alert (mg/dL)
    pub low_alert_mg_dl: f64,
    /// Readings above this raise a HIGH alert (mg/dL)
    pub high_alert_mg_dl: f64,

    // --- Bolus ---
    /// Smallest bolus the engine will accept (units)
    pub min_bolus_units: f64,
    /// Per-dose hard cap as a multiple of the daily self-service cap
    pub bolus_safety_multiplier: f64,
    /// Trailing window for the approved-bolus sum (seconds)
    pub bolus_window_secs: u64,
    /// Minimum spacing between one caretaker's bolus requests (seconds)
    pub caretaker_cooldown_secs: u64,
    /// Largest daily self-service cap a clinician may assign (units)
    pub max_bolus_daily_cap: f64,

    // --- Basal ---
    /// Lowest programmable basal rate (U/h)
    pub min_basal_rate: f64,
    /// Highest programmable basal rate (U/h)
    pub max_basal_rate: f64,
    /// A requested rate may not exceed the active rate times this factor
    pub basal_step_multiplier: f64,
    /// Informational delay recorded on auto-approved basal changes (seconds)
    pub basal_activation_delay_secs: u64,

    // --- Monitor ---
    /// Pause between consecutive feed records (milliseconds)
    pub poll_interval_ms: u64,

    // --- Storage ---
    /// Root directory for journals, alert logs, and glucose feeds
    pub data_dir: PathBuf,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            // Suspension
            critical_glucose_mg_dl: 50.0,
            recovery_glucose_mg_dl: 100.0,
            suspension_duration_secs: 30 * 60,

            // Alerts
            low_alert_mg_dl: 70.0,
            high_alert_mg_dl: 180.0,

            // Bolus
            min_bolus_units: 0.1,
            bolus_safety_multiplier: 1.5,
            bolus_window_secs: 24 * 60 * 60,
            caretaker_cooldown_secs: 4 * 60 * 60,
            max_bolus_daily_cap: 15.0,

            // Basal
            min_basal_rate: 0.1,
            max_basal_rate: 10.0,
            basal_step_multiplier: 1.5,
            basal_activation_delay_secs: 24 * 60 * 60,

            // Monitor
            poll_interval_ms: 5000,

            // Storage
            data_dir: PathBuf::from("data"),
        }
    }
}

impl EngineConfig {
    /// Read a JSON config file and validate it.  Missing fields take defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values that would weaken a safety limit.  Never clamps.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let all_finite = [
            self.critical_glucose_mg_dl,
            self.recovery_glucose_mg_dl,
            self.low_alert_mg_dl,
            self.high_alert_mg_dl,
            self.min_bolus_units,
            self.bolus_safety_multiplier,
            self.max_bolus_daily_cap,
            self.min_basal_rate,
            self.max_basal_rate,
            self.basal_step_multiplier,
        ]
        .iter()
        .all(|v| v.is_finite());
        if !all_finite {
            return Err(ConfigError::ValidationFailed("thresholds must be finite"));
        }
        if self.critical_glucose_mg_dl <= 0.0
            || self.recovery_glucose_mg_dl <= self.critical_glucose_mg_dl
        {
            return Err(ConfigError::ValidationFailed(
                "recovery threshold must be above a positive critical threshold",
            ));
        }
        if self.suspension_duration_secs == 0 {
            return Err(ConfigError::ValidationFailed("suspension duration must be non-zero"));
        }
        if !LOW_ALERT_RANGE.contains(&self.low_alert_mg_dl) {
            return Err(ConfigError::ValidationFailed("LOW alert threshold outside 40-70 mg/dL"));
        }
        if !HIGH_ALERT_RANGE.contains(&self.high_alert_mg_dl) {
            return Err(ConfigError::ValidationFailed("HIGH alert threshold outside 180-300 mg/dL"));
        }
        if self.min_bolus_units <= 0.0 || self.max_bolus_daily_cap < self.min_bolus_units {
            return Err(ConfigError::ValidationFailed("bolus bounds are inconsistent"));
        }
        if self.bolus_safety_multiplier < 1.0 || self.basal_step_multiplier < 1.0 {
            return Err(ConfigError::ValidationFailed("safety multipliers must be at least 1.0"));
        }
        if self.bolus_window_secs == 0 {
            return Err(ConfigError::ValidationFailed("bolus window must be non-zero"));
        }
        if self.min_basal_rate <= 0.0 || self.max_basal_rate <= self.min_basal_rate {
            return Err(ConfigError::ValidationFailed("basal bounds are inconsistent"));
        }
        Ok(())
    }

    pub fn suspension_duration(&self) -> TimeDelta {
        secs_delta(self.suspension_duration_secs)
    }

    pub fn bolus_window(&self) -> TimeDelta {
        secs_delta(self.bolus_window_secs)
    }

    pub fn caretaker_cooldown(&self) -> TimeDelta {
        secs_delta(self.caretaker_cooldown_secs)
    }

    pub fn basal_activation_delay(&self) -> TimeDelta {
        secs_delta(self.basal_activation_delay_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn alert_thresholds(&self) -> AlertThresholds {
        AlertThresholds {
            low: self.low_alert_mg_dl,
            high: self.high_alert_mg_dl,
        }
    }

    pub fn journal_dir(&self) -> PathBuf {
        self.data_dir.join("insulinlogs")
    }

    pub fn alert_dir(&self) -> PathBuf {
        self.data_dir.join("alerts")
    }

    pub fn feed_dir(&self) -> PathBuf {
        self.data_dir.join("glucose")
    }
}

fn secs_delta(secs: u64) -> TimeDelta {
    TimeDelta::try_seconds(i64::try_from(secs).unwrap_or(i64::MAX)).unwrap_or(TimeDelta::MAX)
}
