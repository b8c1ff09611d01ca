use crate::integrator::{IntegrationOutcome, MotionIntegrator};
use crate::stats::SessionStats;
use crate::types::{
    AngleSample, Estimate, KinematicState, MotionSample, ReferenceFrame, Sample,
};
use reckon_config::EstimatorConfig;
use std::cell::Cell;
use std::time::{Duration, Instant};

/// Source of sample timestamps. Values must be non-decreasing.
pub trait Clock: Send {
    fn now(&self) -> Instant;
}

/// Wall-clock time at the moment a sample is processed.
pub struct MonotonicClock;

impl Clock for MonotonicClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Advances by a fixed period on every call, for replaying captures whose
/// sample period is known but whose timestamps were not recorded.
pub struct FixedRateClock {
    next: Cell<Instant>,
    period: Duration,
}

impl FixedRateClock {
    pub fn new(period: Duration) -> Self {
        Self::starting_at(Instant::now(), period)
    }

    pub fn starting_at(start: Instant, period: Duration) -> Self {
        Self {
            next: Cell::new(start),
            period,
        }
    }
}

impl Clock for FixedRateClock {
    fn now(&self) -> Instant {
        let now = self.next.get();
        self.next.set(now + self.period);
        now
    }
}

/// Receives estimator output. Rendering, recording and console echo live behind this.
pub trait EstimateSink {
    /// Called once per session when the reference orientation is captured.
    fn on_reference(&mut self, _reference: &ReferenceFrame) {}

    fn on_estimate(&mut self, estimate: &Estimate);
}

impl<S: EstimateSink + ?Sized> EstimateSink for Box<S> {
    fn on_reference(&mut self, reference: &ReferenceFrame) {
        (**self).on_reference(reference);
    }

    fn on_estimate(&mut self, estimate: &Estimate) {
        (**self).on_estimate(estimate);
    }
}

impl<S: EstimateSink + ?Sized> EstimateSink for &mut S {
    fn on_reference(&mut self, reference: &ReferenceFrame) {
        (**self).on_reference(reference);
    }

    fn on_estimate(&mut self, estimate: &Estimate) {
        (**self).on_estimate(estimate);
    }
}

impl<S: EstimateSink> EstimateSink for Vec<S> {
    fn on_reference(&mut self, reference: &ReferenceFrame) {
        for sink in self.iter_mut() {
            sink.on_reference(reference);
        }
    }

    fn on_estimate(&mut self, estimate: &Estimate) {
        for sink in self.iter_mut() {
            sink.on_estimate(estimate);
        }
    }
}

/// Echoes estimates to the log.
pub struct LogSink;

impl EstimateSink for LogSink {
    fn on_reference(&mut self, reference: &ReferenceFrame) {
        tracing::info!(
            roll0 = reference.roll0,
            pitch0 = reference.pitch0,
            yaw0 = reference.yaw0,
            "Reference set"
        );
    }

    fn on_estimate(&mut self, estimate: &Estimate) {
        let o = &estimate.orientation;
        match &estimate.kinematics {
            Some(k) => tracing::debug!(
                roll = o.roll_deg,
                pitch = o.pitch_deg,
                yaw = o.yaw_deg,
                px = k.position.x,
                py = k.position.y,
                pz = k.position.z,
                "Relative orientation"
            ),
            None => tracing::debug!(
                roll = o.roll_deg,
                pitch = o.pitch_deg,
                yaw = o.yaw_deg,
                "Relative orientation"
            ),
        }
    }
}

/// One logging session: a reference, its kinematic state, and running stats.
///
/// Construct a fresh session per capture; `reset()` is the boundary between
/// two captures on the same stream.
pub struct Session {
    config: EstimatorConfig,
    integrator: MotionIntegrator,
    clock: Box<dyn Clock>,
    started: Option<Instant>,
    stats: SessionStats,
}

impl Session {
    pub fn new(config: EstimatorConfig, clock: Box<dyn Clock>) -> Self {
        Self {
            integrator: MotionIntegrator::new(&config),
            config,
            clock,
            started: None,
            stats: SessionStats::default(),
        }
    }

    /// Process a sample stamped by the session clock.
    pub fn process<S>(&mut self, sample: Sample, sink: &mut S) -> Option<Estimate>
    where
        S: EstimateSink + ?Sized,
    {
        let now = self.clock.now();
        self.process_at(sample, now, sink)
    }

    /// Process a sample taken at `now`.
    pub fn process_at<S>(&mut self, sample: Sample, now: Instant, sink: &mut S) -> Option<Estimate>
    where
        S: EstimateSink + ?Sized,
    {
        let sample = self.condition(sample);
        let started = *self.started.get_or_insert(now);
        let elapsed = now.saturating_duration_since(started);
        self.stats.record_sample(&sample, elapsed);

        let (orientation, kinematics) = match &sample {
            Sample::Angles(angles) => match self.integrator.orient(angles) {
                Some(orientation) => (orientation, None),
                None => {
                    sink.on_reference(&ReferenceFrame::from(angles));
                    return None;
                }
            },
            Sample::Motion(motion) => match self.integrator.step(motion, now) {
                IntegrationOutcome::Calibrated(reference) => {
                    sink.on_reference(&reference);
                    return None;
                }
                IntegrationOutcome::Armed => return None,
                IntegrationOutcome::Rejected { .. } => {
                    self.stats.record_rejection();
                    return None;
                }
                IntegrationOutcome::Updated(update) => {
                    (update.orientation, Some(update.kinematics))
                }
            },
        };

        let estimate = Estimate {
            orientation,
            kinematics,
            sample,
            elapsed,
        };
        self.stats.record_estimate(&estimate);
        sink.on_estimate(&estimate);
        Some(estimate)
    }

    /// Apply the axis lock and acceleration unit before the sample reaches the core.
    fn condition(&self, sample: Sample) -> Sample {
        let lock = |a: &AngleSample| {
            let (roll, pitch, yaw) = self
                .config
                .locked_axis
                .apply(a.roll_deg, a.pitch_deg, a.yaw_deg);
            AngleSample::new(roll, pitch, yaw)
        };
        match sample {
            Sample::Angles(angles) => Sample::Angles(lock(&angles)),
            Sample::Motion(motion) => Sample::Motion(MotionSample {
                angles: lock(&motion.angles),
                accel: motion.accel
                    * self
                        .config
                        .accel_unit
                        .to_meters_per_second_squared(self.config.gravity),
            }),
        }
    }

    /// End the current capture: the next sample becomes a new reference.
    pub fn reset(&mut self) {
        self.stats.log_summary();
        self.integrator.reset();
        self.started = None;
        self.stats = SessionStats::default();
        tracing::info!("Session reset, awaiting new reference");
    }

    pub fn is_calibrated(&self) -> bool {
        self.integrator.is_calibrated()
    }

    pub fn reference(&self) -> Option<&ReferenceFrame> {
        self.integrator.reference()
    }

    pub fn kinematics(&self) -> &KinematicState {
        self.integrator.state()
    }

    pub fn stats(&self) -> &SessionStats {
        &self.stats
    }

    pub fn config(&self) -> &EstimatorConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use reckon_config::{AccelUnit, LockedAxis};

    #[derive(Default)]
    struct Collect {
        references: Vec<ReferenceFrame>,
        estimates: Vec<Estimate>,
    }

    impl EstimateSink for Collect {
        fn on_reference(&mut self, reference: &ReferenceFrame) {
            self.references.push(*reference);
        }

        fn on_estimate(&mut self, estimate: &Estimate) {
            self.estimates.push(*estimate);
        }
    }

    fn motion(roll: f64, pitch: f64, yaw: f64, ax: f64, ay: f64, az: f64) -> Sample {
        Sample::Motion(MotionSample::new(AngleSample::new(roll, pitch, yaw), ax, ay, az))
    }

    fn session(config: EstimatorConfig) -> Session {
        Session::new(
            config,
            Box::new(FixedRateClock::starting_at(
                Instant::now(),
                Duration::from_millis(100),
            )),
        )
    }

    #[test]
    fn reference_goes_to_sink_but_no_estimate() {
        let mut session = session(EstimatorConfig::default());
        let mut sink = Collect::default();

        assert!(session.process(motion(0.0, 0.0, 90.0, 0.0, 0.0, 9.81), &mut sink).is_none());
        assert_eq!(sink.references.len(), 1);
        assert_eq!(sink.references[0].yaw0, 90.0);
        assert!(sink.estimates.is_empty());
    }

    #[test]
    fn identical_second_sample_is_all_zero() {
        let mut session = session(EstimatorConfig::default());
        let mut sink = Collect::default();
        let sample = motion(0.0, 0.0, 123.0, 0.0, 0.0, 9.81);

        session.process(sample, &mut sink);
        let estimate = session.process(sample, &mut sink).unwrap();

        assert_eq!(estimate.orientation.roll_deg, 0.0);
        assert_eq!(estimate.orientation.pitch_deg, 0.0);
        assert_eq!(estimate.orientation.yaw_deg, 0.0);
        let kinematics = estimate.kinematics.unwrap();
        assert_abs_diff_eq!(kinematics.position.length(), 0.0, epsilon = 1e-12);
        assert_abs_diff_eq!(kinematics.velocity.length(), 0.0, epsilon = 1e-12);
        assert_eq!(estimate.elapsed, Duration::from_millis(100));
        assert_eq!(sink.estimates.len(), 1);
    }

    #[test]
    fn yaw_lock_zeroes_roll_and_pitch() {
        let config = EstimatorConfig {
            locked_axis: LockedAxis::Yaw,
            ..Default::default()
        };
        let mut session = session(config);
        let mut sink = Collect::default();

        session.process(Sample::Angles(AngleSample::new(10.0, 20.0, 90.0)), &mut sink);
        let estimate = session
            .process(Sample::Angles(AngleSample::new(30.0, -40.0, 100.0)), &mut sink)
            .unwrap();

        assert_eq!(estimate.orientation.roll_deg, 0.0);
        assert_eq!(estimate.orientation.pitch_deg, 0.0);
        assert_abs_diff_eq!(estimate.orientation.yaw_deg, -10.0, epsilon = 1e-12);
        assert_eq!(sink.references[0].roll0, 0.0);
        assert!(estimate.kinematics.is_none());
    }

    #[test]
    fn level_one_g_cancels_with_default_gravity() {
        let config = EstimatorConfig {
            accel_unit: AccelUnit::StandardGravity,
            ..Default::default()
        };
        let mut session = session(config);
        let mut sink = Collect::default();

        let mut last = None;
        for _ in 0..2001 {
            last = session.process(motion(0.0, 0.0, 0.0, 0.0, 0.0, 1.0), &mut sink);
        }
        let kinematics = last.unwrap().kinematics.unwrap();
        assert_eq!(kinematics.velocity.z, 0.0);
        assert_eq!(kinematics.position.z, 0.0);
    }

    #[test]
    fn milli_g_input_is_scaled_before_integration() {
        let config = EstimatorConfig {
            accel_unit: AccelUnit::MilliG,
            gravity: 9.80665,
            ..Default::default()
        };
        let mut session = session(config);
        let mut sink = Collect::default();

        session.process(motion(0.0, 0.0, 0.0, 0.0, 0.0, 1000.0), &mut sink);
        let estimate = session
            .process(motion(0.0, 0.0, 0.0, 0.0, 0.0, 1000.0), &mut sink)
            .unwrap();
        assert_abs_diff_eq!(estimate.kinematics.unwrap().velocity.z, 0.0, epsilon = 1e-9);
        assert_abs_diff_eq!(
            estimate.sample.accel().unwrap().z,
            9.80665,
            epsilon = 1e-9
        );
    }

    #[test]
    fn stalled_sample_counts_as_rejection() {
        let mut session = session(EstimatorConfig::default());
        let mut sink = Collect::default();
        let t0 = Instant::now();

        session.process_at(motion(0.0, 0.0, 0.0, 1.0, 0.0, 9.81), t0, &mut sink);
        session.process_at(
            motion(0.0, 0.0, 0.0, 1.0, 0.0, 9.81),
            t0 + Duration::from_millis(100),
            &mut sink,
        );
        let stalled = session.process_at(
            motion(0.0, 0.0, 0.0, 1.0, 0.0, 9.81),
            t0 + Duration::from_millis(700),
            &mut sink,
        );

        assert!(stalled.is_none());
        assert_eq!(session.stats().samples, 3);
        assert_eq!(session.stats().estimates, 1);
        assert_eq!(session.stats().rejected_steps, 1);
        assert_abs_diff_eq!(session.kinematics().velocity.x, 0.1, epsilon = 1e-9);
    }

    #[test]
    fn reset_recalibrates_and_clears_stats() {
        let mut session = session(EstimatorConfig::default());
        let mut sink = Collect::default();

        session.process(motion(0.0, 0.0, 10.0, 0.0, 0.0, 9.81), &mut sink);
        session.process(motion(0.0, 0.0, 20.0, 0.0, 0.0, 9.81), &mut sink);
        session.reset();

        assert!(!session.is_calibrated());
        assert_eq!(session.stats().samples, 0);
        assert!(session.process(motion(0.0, 0.0, 50.0, 0.0, 0.0, 9.81), &mut sink).is_none());
        assert_eq!(session.reference().map(|r| r.yaw0), Some(50.0));
        assert_eq!(sink.references.len(), 2);
    }

    #[test]
    fn fan_out_reaches_every_sink() {
        let mut session = session(EstimatorConfig::default());
        let mut first = Collect::default();
        let mut second = Collect::default();
        {
            let mut sinks: Vec<&mut Collect> = vec![&mut first, &mut second];
            session.process(motion(0.0, 0.0, 0.0, 0.0, 0.0, 9.81), &mut sinks);
            session.process(motion(0.0, 0.0, 5.0, 0.0, 0.0, 9.81), &mut sinks);
        }
        assert_eq!(first.estimates.len(), 1);
        assert_eq!(second.estimates.len(), 1);
        assert_eq!(first.references.len(), 1);
    }

    #[test]
    fn fixed_rate_clock_ticks_by_period() {
        let start = Instant::now();
        let clock = FixedRateClock::starting_at(start, Duration::from_millis(30));
        assert_eq!(clock.now(), start);
        assert_eq!(clock.now(), start + Duration::from_millis(30));
        assert_eq!(clock.now(), start + Duration::from_millis(60));
    }
}
