//! Session recording for the IMU estimator.

pub mod csv;

pub use csv::CsvRecorder;

use std::path::PathBuf;

/// File name for a recording started now: `<prefix>_YYYYmmdd_HHMMSS.csv`.
pub fn timestamped_file_name(prefix: &str) -> PathBuf {
    let stamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
    PathBuf::from(format!("{prefix}_{stamp}.csv"))
}
