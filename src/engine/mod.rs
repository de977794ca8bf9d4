//! Motion engine abstraction
//!
//! The sensor's fused motion processor is programmed over the register bus
//! and streams packets through an on-chip FIFO. [`MotionEngine`] is the seam
//! the daemon drives; `bring_up` runs the start sequence shared by every
//! implementation. The simulated engine (feature `mock`, default on) lives
//! behind the same trait for hardware-free runs.

use crate::config::{AppConfig, EngineConfig};
use crate::error::{Error, Result};
use crate::transport::RegisterBus;

pub mod events;
#[cfg(feature = "mock")]
mod noise;
#[cfg(feature = "mock")]
pub mod sim;

pub use events::{GestureEvent, TapDirection};

/// Gyro X/Y/Z sensor group
pub const SENSOR_GYRO: u8 = 1 << 0;
/// Accelerometer sensor group
pub const SENSOR_ACCEL: u8 = 1 << 1;
/// Magnetometer sensor group
pub const SENSOR_COMPASS: u8 = 1 << 2;

/// Gyro+accel quaternion fusion on the engine
pub const FEATURE_6X_LP_QUAT: u16 = 1 << 0;
/// Tap detection
pub const FEATURE_TAP: u16 = 1 << 1;
/// Screen-rotation detection
pub const FEATURE_ANDROID_ORIENT: u16 = 1 << 2;
/// Stream raw accelerometer data in FIFO packets
pub const FEATURE_SEND_RAW_ACCEL: u16 = 1 << 3;
/// Stream bias-corrected gyro data in FIFO packets
pub const FEATURE_SEND_CAL_GYRO: u16 = 1 << 4;
/// Track gyro bias after eight seconds of stillness
pub const FEATURE_GYRO_CAL: u16 = 1 << 5;

/// Feature set the daemon always enables
///
/// Tap stays on even where gestures go unused: with it off, the engine
/// interrupts at its internal rate instead of the configured FIFO rate.
pub const DEFAULT_FEATURES: u16 = FEATURE_6X_LP_QUAT
    | FEATURE_TAP
    | FEATURE_ANDROID_ORIENT
    | FEATURE_SEND_RAW_ACCEL
    | FEATURE_SEND_CAL_GYRO
    | FEATURE_GYRO_CAL;

/// Tap detector threshold, engine units; lower fires easier
pub const TAP_THRESHOLD: u16 = 1;
/// Window for grouping rapid taps into one multi-tap, milliseconds
pub const TAP_TIME_MULTI_MS: u16 = 500;

/// One packet popped from the engine FIFO
///
/// `valid` is a mask of `sample::FLAG_*` bits naming the groups that carry
/// data; a gesture-only packet has `valid == 0`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FifoPacket {
    /// Raw gyro counts
    pub gyro: [i16; 3],
    /// Raw accel counts
    pub accel: [i16; 3],
    /// Q30 quaternion (w, x, y, z)
    pub quat: [i32; 4],
    /// Capture time in wall-clock milliseconds
    pub timestamp_ms: u64,
    /// Validity mask of `sample::FLAG_*` bits
    pub valid: u32,
}

/// Result of one FIFO pop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FifoRead {
    /// The popped packet, or `None` if the FIFO was empty
    pub packet: Option<FifoPacket>,
    /// More packets are already pending
    pub more: bool,
}

/// Factory self-test outcome
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SelfTestReport {
    pub passed: bool,
    /// Gyro bias in deg/s per axis
    pub gyro_bias: [f32; 3],
    /// Accel bias in g per axis
    pub accel_bias: [f32; 3],
}

/// Contract between the daemon and a fused motion processor
///
/// Configuration calls may be rejected until `init` has run. Setters take
/// requested values; the matching getters report what the hardware actually
/// applied, which may have been clamped.
pub trait MotionEngine: Send {
    /// Wake the device; must precede every other call
    fn init(&mut self) -> Result<()>;

    /// Power sensor groups on or off; groups absent from the mask turn off
    fn set_sensors(&mut self, mask: u8) -> Result<()>;

    /// Select which sensor groups feed the FIFO
    fn configure_fifo(&mut self, mask: u8) -> Result<()>;

    /// Set the engine output rate in Hz
    fn set_sample_rate(&mut self, hz: u16) -> Result<()>;

    /// Effective engine output rate in Hz
    fn sample_rate(&self) -> Result<u16>;

    /// Set the gyro full-scale range in deg/s (250, 500, 1000, 2000)
    fn set_gyro_fsr(&mut self, dps: u16) -> Result<()>;

    /// Effective gyro full-scale range in deg/s
    fn gyro_fsr(&self) -> Result<u16>;

    /// Effective accel full-scale range in g
    fn accel_fsr(&self) -> Result<u8>;

    /// Push the fusion firmware image to the engine
    fn load_firmware(&mut self) -> Result<()>;

    /// Apply the packed mounting-matrix scalar
    fn set_orientation(&mut self, scalar: u16) -> Result<()>;

    /// Tune the tap detector on all three axes
    fn configure_tap(&mut self, threshold: u16, multi_window_ms: u16) -> Result<()>;

    /// Enable engine features by `FEATURE_*` mask
    fn enable_features(&mut self, mask: u16) -> Result<()>;

    /// Set the FIFO output rate in Hz
    fn set_fifo_rate(&mut self, hz: u16) -> Result<()>;

    /// Start or stop the fusion processor
    fn set_dmp_enabled(&mut self, on: bool) -> Result<()>;

    /// Enable motion-triggered gyro bias tracking
    fn set_gyro_auto_calibration(&mut self, on: bool) -> Result<()>;

    /// Run the factory self test
    fn self_test(&mut self) -> Result<SelfTestReport>;

    /// Pop at most one packet from the FIFO
    fn pop_fifo(&mut self) -> Result<FifoRead>;

    /// Drain one queued gesture event, oldest first
    fn poll_gesture(&mut self) -> Option<GestureEvent>;

    /// Whether a magnetometer is present
    fn has_compass(&self) -> bool;

    /// Read raw magnetometer counts
    fn read_compass(&mut self) -> Result<[i16; 3]>;

    /// Set the magnetometer sample rate in Hz
    fn set_compass_sample_rate(&mut self, hz: u16) -> Result<()>;

    /// Effective magnetometer sample rate in Hz
    fn compass_sample_rate(&self) -> Result<u16>;
}

/// Mounting matrix: board flat, component side up
pub const ORIENTATION_HORIZONTAL: [i8; 9] = [-1, 0, 0, 0, -1, 0, 0, 0, 1];
/// Mounting matrix: board standing on its long edge
pub const ORIENTATION_VERTICAL: [i8; 9] = [0, 0, -1, -1, 0, 0, 0, 1, 0];
/// Mounting matrix: board standing on its short edge
pub const ORIENTATION_EDGE: [i8; 9] = [0, -1, 0, 0, 0, -1, 1, 0, 0];

/// Look up a mounting preset by its configuration name
pub fn orientation_preset(name: &str) -> Result<[i8; 9]> {
    match name {
        "horizontal" => Ok(ORIENTATION_HORIZONTAL),
        "vertical" => Ok(ORIENTATION_VERTICAL),
        "edge" => Ok(ORIENTATION_EDGE),
        other => Err(Error::InvalidParameter(format!(
            "unknown orientation preset: {other}"
        ))),
    }
}

/// Reduce one matrix row to its 3-bit axis/sign code
fn row_to_scale(row: &[i8]) -> u16 {
    if row[0] > 0 {
        0
    } else if row[0] < 0 {
        4
    } else if row[1] > 0 {
        1
    } else if row[1] < 0 {
        5
    } else if row[2] > 0 {
        2
    } else if row[2] < 0 {
        6
    } else {
        7 // degenerate row
    }
}

/// Pack a 3x3 mounting matrix into the engine's orientation scalar
///
/// Rows must each select a single signed axis; the scalar packs three
/// 3-bit row codes, identity being 0x88.
pub fn orientation_matrix_to_scalar(matrix: &[i8; 9]) -> u16 {
    let mut scalar = row_to_scale(&matrix[0..3]);
    scalar |= row_to_scale(&matrix[3..6]) << 3;
    scalar |= row_to_scale(&matrix[6..9]) << 6;
    scalar
}

/// Create a motion engine from configuration
///
/// The engine owns the bus handle from construction onward.
pub fn create_engine(
    config: &EngineConfig,
    bus: Box<dyn RegisterBus>,
) -> Result<Box<dyn MotionEngine>> {
    match config.kind.as_str() {
        #[cfg(feature = "mock")]
        "sim" => Ok(Box::new(sim::SimulatedEngine::new(config.seed, bus))),
        other => {
            drop(bus);
            Err(Error::UnknownEngine(other.to_string()))
        }
    }
}

/// Run the shared engine start sequence
///
/// Wakes the sensors, routes gyro and accel into the FIFO, applies the
/// configured rates and ranges, loads firmware, and starts the fusion
/// processor. Effective values are logged after read-back since hardware
/// may clamp what it was asked for.
pub fn bring_up(engine: &mut dyn MotionEngine, config: &AppConfig) -> Result<()> {
    let sampling = &config.sampling;

    engine.init()?;

    engine.set_sensors(SENSOR_GYRO | SENSOR_ACCEL | SENSOR_COMPASS)?;
    engine.configure_fifo(SENSOR_GYRO | SENSOR_ACCEL)?;
    engine.set_sample_rate(sampling.sample_rate_hz)?;
    engine.set_gyro_fsr(sampling.gyro_fsr_dps)?;
    if config.compass.sample_rate_hz > 0 {
        engine.set_compass_sample_rate(config.compass.sample_rate_hz)?;
    }

    let sample_rate = engine.sample_rate()?;
    let gyro_fsr = engine.gyro_fsr()?;
    let accel_fsr = engine.accel_fsr()?;
    let compass_rate = engine.compass_sample_rate()?;
    log::info!(
        "Engine configured: {} Hz, gyro ±{} dps, accel ±{} g, compass {} Hz",
        sample_rate,
        gyro_fsr,
        accel_fsr,
        compass_rate
    );

    log::info!("Loading motion firmware...");
    engine.load_firmware()?;

    let matrix = orientation_preset(&sampling.orientation)?;
    engine.set_orientation(orientation_matrix_to_scalar(&matrix))?;

    engine.configure_tap(TAP_THRESHOLD, TAP_TIME_MULTI_MS)?;

    engine.enable_features(DEFAULT_FEATURES)?;
    engine.set_fifo_rate(sampling.fifo_rate_hz)?;
    engine.set_dmp_enabled(true)?;

    // Power transition: the sensor mask must be reasserted once the
    // fusion processor is running.
    engine.set_sensors(SENSOR_GYRO | SENSOR_ACCEL | SENSOR_COMPASS)?;
    engine.set_gyro_auto_calibration(true)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MockBus;

    #[test]
    fn test_orientation_scalar_identity() {
        let identity: [i8; 9] = [1, 0, 0, 0, 1, 0, 0, 0, 1];
        assert_eq!(orientation_matrix_to_scalar(&identity), 0x88);
    }

    #[test]
    fn test_orientation_scalar_presets() {
        // Horizontal: x and y flipped, z up.
        // Rows pack as 4, 5, 2 -> 4 | 5<<3 | 2<<6.
        assert_eq!(
            orientation_matrix_to_scalar(&ORIENTATION_HORIZONTAL),
            4 | (5 << 3) | (2 << 6)
        );

        let degenerate: [i8; 9] = [0; 9];
        assert_eq!(orientation_matrix_to_scalar(&degenerate), 7 | (7 << 3) | (7 << 6));
    }

    #[test]
    fn test_orientation_preset_lookup() {
        assert_eq!(orientation_preset("horizontal").unwrap(), ORIENTATION_HORIZONTAL);
        assert_eq!(orientation_preset("vertical").unwrap(), ORIENTATION_VERTICAL);
        assert_eq!(orientation_preset("edge").unwrap(), ORIENTATION_EDGE);
        assert!(matches!(
            orientation_preset("upside-down"),
            Err(Error::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_create_engine_rejects_unknown_kind() {
        let config = EngineConfig {
            kind: "warp-drive".to_string(),
            seed: 0,
        };
        let err = create_engine(&config, Box::new(MockBus::new())).err().unwrap();
        assert!(matches!(err, Error::UnknownEngine(kind) if kind == "warp-drive"));
    }

    #[cfg(feature = "mock")]
    #[test]
    fn test_create_engine_builds_simulator() {
        let config = EngineConfig {
            kind: "sim".to_string(),
            seed: 7,
        };
        let mut engine = create_engine(&config, Box::new(MockBus::new())).unwrap();
        assert!(engine.has_compass());
        // Streaming before init is a protocol violation.
        assert!(matches!(engine.pop_fifo(), Err(Error::NotInitialized)));
    }

    #[cfg(feature = "mock")]
    #[test]
    fn test_bring_up_sequences_simulator() {
        let mut config = AppConfig::mpu9250_defaults();
        config.engine.seed = 7;

        let mut engine = create_engine(&config.engine, Box::new(MockBus::new())).unwrap();
        bring_up(engine.as_mut(), &config).unwrap();

        assert_eq!(engine.sample_rate().unwrap(), 200);
        assert_eq!(engine.gyro_fsr().unwrap(), 1000);
        assert_eq!(engine.compass_sample_rate().unwrap(), 5);
        // Streaming is legal once the fusion processor is on.
        engine.pop_fifo().unwrap();
    }
}
