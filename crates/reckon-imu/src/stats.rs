use crate::types::{Estimate, Sample};
use std::time::Duration;

/// Streaming mean/variance/extrema (Welford).
#[derive(Debug, Clone, Copy, Default)]
pub struct RunningStats {
    count: u64,
    mean: f64,
    m2: f64,
    min: f64,
    max: f64,
}

impl RunningStats {
    pub fn push(&mut self, value: f64) {
        if self.count == 0 {
            self.min = value;
            self.max = value;
        } else {
            self.min = self.min.min(value);
            self.max = self.max.max(value);
        }
        self.count += 1;
        let delta = value - self.mean;
        self.mean += delta / self.count as f64;
        self.m2 += delta * (value - self.mean);
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn mean(&self) -> Option<f64> {
        (self.count > 0).then_some(self.mean)
    }

    /// Sample standard deviation (n - 1 denominator).
    pub fn std_dev(&self) -> Option<f64> {
        (self.count > 1).then(|| (self.m2 / (self.count - 1) as f64).sqrt())
    }

    pub fn min(&self) -> Option<f64> {
        (self.count > 0).then_some(self.min)
    }

    pub fn max(&self) -> Option<f64> {
        (self.count > 0).then_some(self.max)
    }
}

/// Per-session counters and summary statistics.
#[derive(Debug, Clone, Default)]
pub struct SessionStats {
    /// Samples handed to the session.
    pub samples: u64,
    /// Samples that produced an estimate.
    pub estimates: u64,
    /// Motion samples dropped for an out-of-range timestep.
    pub rejected_steps: u64,
    /// Time between the first and the latest sample.
    pub duration: Duration,
    yaw: RunningStats,
    accel_magnitude: RunningStats,
}

impl SessionStats {
    pub(crate) fn record_sample(&mut self, sample: &Sample, elapsed: Duration) {
        self.samples += 1;
        self.duration = elapsed;
        if let Some(accel) = sample.accel() {
            self.accel_magnitude.push(accel.length());
        }
    }

    pub(crate) fn record_estimate(&mut self, estimate: &Estimate) {
        self.estimates += 1;
        self.yaw.push(estimate.orientation.yaw_deg);
    }

    pub(crate) fn record_rejection(&mut self) {
        self.rejected_steps += 1;
    }

    /// Reported relative yaw (degrees).
    pub fn yaw(&self) -> &RunningStats {
        &self.yaw
    }

    /// Magnitude of the raw acceleration vector (m/s^2).
    pub fn accel_magnitude(&self) -> &RunningStats {
        &self.accel_magnitude
    }

    pub fn sample_rate_hz(&self) -> Option<f64> {
        let secs = self.duration.as_secs_f64();
        (secs > 0.0 && self.samples > 1).then(|| (self.samples - 1) as f64 / secs)
    }

    pub fn log_summary(&self) {
        tracing::info!(
            samples = self.samples,
            estimates = self.estimates,
            rejected_steps = self.rejected_steps,
            duration_s = self.duration.as_secs_f64(),
            sample_rate_hz = self.sample_rate_hz(),
            "Session summary"
        );
        if let (Some(min), Some(max), Some(mean)) = (self.yaw.min(), self.yaw.max(), self.yaw.mean())
        {
            tracing::info!(min, max, mean, std_dev = self.yaw.std_dev(), "Relative yaw (deg)");
        }
        if let Some(mean) = self.accel_magnitude.mean() {
            tracing::info!(
                mean,
                std_dev = self.accel_magnitude.std_dev(),
                "Acceleration magnitude (m/s^2)"
            );
        }
    }
}
