use crate::timestamped_file_name;
use anyhow::{Context, Result};
use reckon_imu::{Estimate, EstimateSink, ReferenceFrame};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

const HEADER: &str = "time,roll,pitch,yaw,ax,ay,az,px,py,pz,vx,vy,vz";

/// Writes one CSV row per estimate.
///
/// Rows are flushed as they are written so a capture survives an abrupt exit.
/// Write errors never reach the estimator; they are logged and counted.
pub struct CsvRecorder<W: Write> {
    writer: W,
    path: Option<PathBuf>,
    rows: u64,
    failures: u64,
}

impl CsvRecorder<BufWriter<File>> {
    /// Create `<prefix>_<timestamp>.csv` inside `directory`, creating the directory if needed.
    pub fn create(directory: &Path, prefix: &str) -> Result<Self> {
        std::fs::create_dir_all(directory)
            .with_context(|| format!("Failed to create {}", directory.display()))?;
        let path = directory.join(timestamped_file_name(prefix));
        let file =
            File::create(&path).with_context(|| format!("Failed to create {}", path.display()))?;

        let mut recorder = Self::new(BufWriter::new(file))?;
        tracing::info!(path = %path.display(), "Recording session");
        recorder.path = Some(path);
        Ok(recorder)
    }
}

impl<W: Write> CsvRecorder<W> {
    /// Wrap a writer and emit the header row.
    pub fn new(mut writer: W) -> Result<Self> {
        writeln!(writer, "{HEADER}")?;
        writer.flush()?;
        Ok(Self {
            writer,
            path: None,
            rows: 0,
            failures: 0,
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn rows(&self) -> u64 {
        self.rows
    }

    pub fn failures(&self) -> u64 {
        self.failures
    }

    pub fn into_inner(self) -> W {
        self.writer
    }

    fn write_row(&mut self, estimate: &Estimate) -> std::io::Result<()> {
        let o = &estimate.orientation;
        write!(
            self.writer,
            "{:.4},{},{},{}",
            estimate.elapsed.as_secs_f64(),
            o.roll_deg,
            o.pitch_deg,
            o.yaw_deg
        )?;

        match estimate.sample.accel() {
            Some(a) => write!(self.writer, ",{},{},{}", a.x, a.y, a.z)?,
            None => write!(self.writer, ",,,")?,
        }

        match &estimate.kinematics {
            Some(k) => write!(
                self.writer,
                ",{},{},{},{},{},{}",
                k.position.x,
                k.position.y,
                k.position.z,
                k.velocity.x,
                k.velocity.y,
                k.velocity.z
            )?,
            None => write!(self.writer, ",,,,,,")?,
        }

        writeln!(self.writer)?;
        self.writer.flush()
    }
}

impl<W: Write> EstimateSink for CsvRecorder<W> {
    fn on_reference(&mut self, reference: &ReferenceFrame) {
        tracing::debug!(yaw0 = reference.yaw0, rows = self.rows, "Recording from new reference");
    }

    fn on_estimate(&mut self, estimate: &Estimate) {
        match self.write_row(estimate) {
            Ok(()) => self.rows += 1,
            Err(e) => {
                self.failures += 1;
                // Log the first failure loudly, then only periodically.
                if self.failures == 1 || self.failures % 100 == 0 {
                    tracing::warn!(?e, failures = self.failures, "Failed to write CSV row");
                }
            }
        }
    }
}
