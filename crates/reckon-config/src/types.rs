use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Orientation and dead-reckoning parameters.
    pub estimator: EstimatorConfig,
    /// Where samples come from.
    pub source: SourceConfig,
    /// CSV recording and console echo.
    pub record: RecordConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EstimatorConfig {
    /// Single rotational axis to keep; the other two are forced to zero.
    pub locked_axis: LockedAxis,
    /// Gravity removed from world-frame Z (m/s^2).
    pub gravity: f64,
    /// Timesteps above this many seconds are rejected.
    pub max_valid_dt: f64,
    /// Negate relative yaw so the reported direction matches the physical rotation.
    pub yaw_sign_flip: bool,
    /// Units the sensor reports acceleration in.
    pub accel_unit: AccelUnit,
}

impl Default for EstimatorConfig {
    fn default() -> Self {
        Self {
            locked_axis: LockedAxis::None,
            gravity: 9.81,
            max_valid_dt: 0.5,
            yaw_sign_flip: true,
            accel_unit: AccelUnit::MetersPerSecondSquared,
        }
    }
}

impl EstimatorConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.gravity.is_finite() || self.gravity < 0.0 {
            return Err(ConfigError::InvalidGravity(self.gravity));
        }
        if !self.max_valid_dt.is_finite() || self.max_valid_dt <= 0.0 {
            return Err(ConfigError::InvalidMaxDt(self.max_valid_dt));
        }
        Ok(())
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("gravity must be a finite, non-negative value (got {0})")]
    InvalidGravity(f64),
    #[error("max_valid_dt must be a finite, positive number of seconds (got {0})")]
    InvalidMaxDt(f64),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LockedAxis {
    /// All three axes are active.
    #[default]
    None,
    Roll,
    Pitch,
    Yaw,
}

impl LockedAxis {
    /// Zero every axis except the locked one. Returns the angles unchanged when no axis is locked.
    pub fn apply(self, roll: f64, pitch: f64, yaw: f64) -> (f64, f64, f64) {
        match self {
            LockedAxis::None => (roll, pitch, yaw),
            LockedAxis::Roll => (roll, 0.0, 0.0),
            LockedAxis::Pitch => (0.0, pitch, 0.0),
            LockedAxis::Yaw => (0.0, 0.0, yaw),
        }
    }
}

impl std::str::FromStr for LockedAxis {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "none" => Ok(LockedAxis::None),
            "roll" => Ok(LockedAxis::Roll),
            "pitch" => Ok(LockedAxis::Pitch),
            "yaw" => Ok(LockedAxis::Yaw),
            other => Err(format!("unknown axis '{other}' (expected none, roll, pitch or yaw)")),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccelUnit {
    #[default]
    MetersPerSecondSquared,
    /// Multiples of gravity.
    StandardGravity,
    /// Thousandths of gravity, as the ICM-20948 library reports.
    MilliG,
}

impl AccelUnit {
    /// Factor converting a reading in this unit to m/s^2.
    ///
    /// g-based units scale by the same `gravity` the integrator removes, so a
    /// level reading of exactly 1 g cancels.
    pub fn to_meters_per_second_squared(self, gravity: f64) -> f64 {
        match self {
            AccelUnit::MetersPerSecondSquared => 1.0,
            AccelUnit::StandardGravity => gravity,
            AccelUnit::MilliG => gravity / 1000.0,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    /// Line feed served over TCP (e.g. a serial-to-network bridge).
    #[default]
    Tcp,
    /// Replay of a previously captured line log.
    File,
    Stdin,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    pub kind: SourceKind,
    /// TCP endpoint, used when `kind = "tcp"`.
    pub addr: String,
    /// Capture file, used when `kind = "file"`.
    pub path: Option<PathBuf>,
    /// Sample period assumed when replaying a file (milliseconds).
    pub period_ms: u64,
    /// Only process the newest complete line of each read.
    pub drain_to_latest: bool,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            kind: SourceKind::Tcp,
            addr: "127.0.0.1:5760".into(),
            path: None,
            period_ms: 30,
            drain_to_latest: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecordConfig {
    /// Write a CSV row per estimate.
    pub enabled: bool,
    /// Directory the CSV file is created in.
    pub directory: PathBuf,
    /// File name prefix; a `_YYYYmmdd_HHMMSS.csv` suffix is appended.
    pub file_prefix: String,
    /// Echo relative orientation to the log.
    pub echo: bool,
}

impl Default for RecordConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            directory: PathBuf::from("."),
            file_prefix: "imu_all_data".into(),
            echo: true,
        }
    }
}
