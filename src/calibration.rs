//! Magnetometer calibration
//!
//! Raw compass counts carry a hard-iron offset (nearby magnetized metal
//! shifts every reading by a constant) and a soft-iron distortion (the
//! response sphere is squashed into an ellipsoid). Both are estimated from
//! a bounded collection pass while the operator waves the device through a
//! figure eight: per-axis extremes give the offset, the spread of per-axis
//! radii gives the scale.

use crate::engine::MotionEngine;
use crate::error::Result;
use crate::transport::delay_ms;

/// Settling time after a compass rate change, in milliseconds.
const SETTLE_MS: u64 = 1000;

/// Correction applied to raw magnetometer counts.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CompassCalibration {
    /// Hard-iron offset per axis, in raw counts.
    pub bias: [f32; 3],
    /// Soft-iron scale per axis, dimensionless.
    pub scale: [f32; 3],
}

impl CompassCalibration {
    /// The no-op correction: zero bias, unit scale.
    pub fn identity() -> Self {
        Self {
            bias: [0.0; 3],
            scale: [1.0; 3],
        }
    }

    /// Corrects one raw reading: `(raw - bias) * scale` per axis.
    pub fn apply(&self, raw: [i16; 3]) -> [f32; 3] {
        let mut out = [0.0f32; 3];
        for axis in 0..3 {
            out[axis] = (f32::from(raw[axis]) - self.bias[axis]) * self.scale[axis];
        }
        out
    }
}

impl Default for CompassCalibration {
    fn default() -> Self {
        Self::identity()
    }
}

/// Accumulates raw compass readings into per-axis extremes.
///
/// Feed readings with [`add_sample`](Self::add_sample) until it reports
/// ready, then call [`finalize`](Self::finalize) for the correction.
#[derive(Debug, Clone)]
pub struct CompassCalibrator {
    target_samples: usize,
    count: usize,
    min: [i16; 3],
    max: [i16; 3],
}

impl CompassCalibrator {
    /// Creates a calibrator that is ready after `target_samples` readings.
    pub fn new(target_samples: usize) -> Self {
        Self {
            target_samples,
            count: 0,
            min: [i16::MAX; 3],
            max: [i16::MIN; 3],
        }
    }

    /// Tracks one raw reading. Returns true once enough have been seen.
    ///
    /// Readings past the target count are ignored.
    pub fn add_sample(&mut self, raw: [i16; 3]) -> bool {
        if self.count < self.target_samples {
            for axis in 0..3 {
                self.min[axis] = self.min[axis].min(raw[axis]);
                self.max[axis] = self.max[axis].max(raw[axis]);
            }
            self.count += 1;
        }
        self.is_ready()
    }

    /// True once the target number of readings has been tracked.
    pub fn is_ready(&self) -> bool {
        self.count >= self.target_samples
    }

    /// Number of readings tracked so far.
    pub fn sample_count(&self) -> usize {
        self.count
    }

    /// Discards all tracked extremes.
    pub fn reset(&mut self) {
        self.count = 0;
        self.min = [i16::MAX; 3];
        self.max = [i16::MIN; 3];
    }

    /// Estimates the correction from the tracked extremes.
    ///
    /// With no readings this is the identity. An axis whose reading never
    /// moved has no usable chord and keeps unit scale.
    pub fn finalize(&self) -> CompassCalibration {
        if self.count == 0 {
            return CompassCalibration::identity();
        }

        let mut bias = [0.0f32; 3];
        let mut chord = [0.0f32; 3];
        for axis in 0..3 {
            // Integer midpoint, matching how offsets land in trim registers.
            bias[axis] = ((i32::from(self.max[axis]) + i32::from(self.min[axis])) / 2) as f32;
            chord[axis] = (f32::from(self.max[axis]) - f32::from(self.min[axis])) / 2.0;
        }

        let avg_radius = (chord[0] + chord[1] + chord[2]) / 3.0;
        let mut scale = [1.0f32; 3];
        for axis in 0..3 {
            if chord[axis] > 0.0 {
                scale[axis] = avg_radius / chord[axis];
            }
        }

        CompassCalibration { bias, scale }
    }
}

/// Runs the interactive calibration pass against a live engine.
///
/// Raises the compass rate to `rate_hz`, waits for it to settle, collects
/// `samples` readings while the operator waves the device, then restores
/// `restore_rate_hz` (when nonzero). Individual read failures are skipped;
/// the pass always runs its full length. When the engine has no compass,
/// or nothing could be read at all, the identity correction is returned
/// with a warning so the caller keeps streaming either way.
pub fn calibrate_compass(
    engine: &mut dyn MotionEngine,
    samples: usize,
    rate_hz: u16,
    restore_rate_hz: u16,
) -> Result<CompassCalibration> {
    if !engine.has_compass() {
        log::warn!("No compass present; using identity calibration");
        return Ok(CompassCalibration::identity());
    }

    engine.set_compass_sample_rate(rate_hz)?;
    delay_ms(SETTLE_MS);

    log::info!("Compass calibration: wave the device in a figure eight until done");

    let mut calibrator = CompassCalibrator::new(samples);
    let interval_ms = (1000 / u64::from(rate_hz.max(1))).max(1);
    for _ in 0..samples {
        match engine.read_compass() {
            Ok(raw) => {
                calibrator.add_sample(raw);
            }
            Err(e) => log::debug!("Compass read skipped during calibration: {e}"),
        }
        delay_ms(interval_ms);
    }

    if restore_rate_hz > 0 {
        engine.set_compass_sample_rate(restore_rate_hz)?;
    }

    if calibrator.sample_count() == 0 {
        log::warn!("Compass produced no readings; using identity calibration");
        return Ok(CompassCalibration::identity());
    }

    let calibration = calibrator.finalize();
    log::info!(
        "Compass calibrated: bias [{:.1}, {:.1}, {:.1}], scale [{:.3}, {:.3}, {:.3}]",
        calibration.bias[0],
        calibration.bias[1],
        calibration.bias[2],
        calibration.scale[0],
        calibration.scale[1],
        calibration.scale[2],
    );
    Ok(calibration)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_identity_leaves_readings_untouched() {
        let cal = CompassCalibration::identity();
        assert_eq!(
            cal.apply([120, -340, i16::MAX]),
            [120.0, -340.0, f32::from(i16::MAX)]
        );
    }

    #[test]
    fn test_apply_subtracts_bias_then_scales() {
        let cal = CompassCalibration {
            bias: [100.0, 0.0, 0.0],
            scale: [2.0, 1.0, 1.0],
        };
        assert_eq!(cal.apply([150, 5, -5]), [100.0, 5.0, -5.0]);
    }

    #[test]
    fn test_calibrator_reports_ready_at_target() {
        let mut calibrator = CompassCalibrator::new(3);
        assert!(!calibrator.is_ready());
        assert!(!calibrator.add_sample([1, 2, 3]));
        assert!(!calibrator.add_sample([4, 5, 6]));
        assert!(calibrator.add_sample([7, 8, 9]));
        assert!(calibrator.is_ready());
        assert_eq!(calibrator.sample_count(), 3);
    }

    #[test]
    fn test_finalize_recovers_bias_and_scale_from_extremes() {
        let mut calibrator = CompassCalibrator::new(2);
        calibrator.add_sample([-100, -200, 0]);
        calibrator.add_sample([300, 200, 0]);
        let cal = calibrator.finalize();

        assert_relative_eq!(cal.bias[0], 100.0);
        assert_relative_eq!(cal.bias[1], 0.0);
        assert_relative_eq!(cal.bias[2], 0.0);
        // Chords are [200, 200, 0]; the flat z axis keeps unit scale.
        assert_relative_eq!(cal.scale[0], 400.0 / 3.0 / 200.0, epsilon = 1e-5);
        assert_relative_eq!(cal.scale[1], 400.0 / 3.0 / 200.0, epsilon = 1e-5);
        assert_relative_eq!(cal.scale[2], 1.0);
    }

    #[test]
    fn test_finalize_truncates_odd_midpoints() {
        let mut calibrator = CompassCalibrator::new(2);
        calibrator.add_sample([-3, -3, -3]);
        calibrator.add_sample([10, 10, 10]);
        let cal = calibrator.finalize();

        // (10 + -3) / 2 truncates to 3 in integer counts.
        assert_eq!(cal.bias, [3.0, 3.0, 3.0]);
        assert_relative_eq!(cal.scale[0], 1.0);
        assert_relative_eq!(cal.scale[1], 1.0);
        assert_relative_eq!(cal.scale[2], 1.0);
    }

    #[test]
    fn test_finalize_without_samples_is_identity() {
        let calibrator = CompassCalibrator::new(10);
        assert_eq!(calibrator.finalize(), CompassCalibration::identity());
    }

    #[test]
    fn test_samples_past_target_are_ignored() {
        let mut calibrator = CompassCalibrator::new(2);
        calibrator.add_sample([-50, -50, -50]);
        calibrator.add_sample([50, 50, 50]);
        let before = calibrator.finalize();

        assert!(calibrator.add_sample([i16::MAX, i16::MAX, i16::MAX]));
        assert_eq!(calibrator.sample_count(), 2);
        assert_eq!(calibrator.finalize(), before);
    }

    #[test]
    fn test_reset_discards_extremes() {
        let mut calibrator = CompassCalibrator::new(1);
        calibrator.add_sample([500, -500, 123]);
        calibrator.reset();

        assert_eq!(calibrator.sample_count(), 0);
        assert!(!calibrator.is_ready());
        assert_eq!(calibrator.finalize(), CompassCalibration::identity());
    }

    #[cfg(feature = "mock")]
    mod with_sim {
        use super::*;
        use crate::config::EngineConfig;
        use crate::engine::{create_engine, SENSOR_ACCEL, SENSOR_COMPASS, SENSOR_GYRO};
        use crate::transport::MockBus;

        fn sim_engine(sensors: u8) -> Box<dyn MotionEngine> {
            let config = EngineConfig {
                kind: "sim".to_string(),
                seed: 11,
            };
            let mut engine = create_engine(&config, Box::new(MockBus::new())).unwrap();
            engine.init().unwrap();
            engine.set_sensors(sensors).unwrap();
            engine
        }

        #[test]
        fn test_calibration_pass_restores_steady_rate() {
            let mut engine = sim_engine(SENSOR_GYRO | SENSOR_ACCEL | SENSOR_COMPASS);
            let cal = calibrate_compass(engine.as_mut(), 20, 100, 5).unwrap();

            assert_eq!(engine.compass_sample_rate().unwrap(), 5);
            for axis in 0..3 {
                assert!(cal.scale[axis].is_finite() && cal.scale[axis] > 0.0);
                assert!(cal.bias[axis].is_finite());
            }
        }

        #[test]
        fn test_powered_down_compass_falls_back_to_identity() {
            let mut engine = sim_engine(SENSOR_GYRO | SENSOR_ACCEL);
            let cal = calibrate_compass(engine.as_mut(), 3, 100, 5).unwrap();
            assert_eq!(cal, CompassCalibration::identity());
        }
    }
}
