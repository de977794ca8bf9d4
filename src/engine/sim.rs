//! Simulated motion engine
//!
//! Runs the full daemon without hardware: a synthetic FIFO paced by wall
//! time, a simple motion model, and occasional gesture events. A nonzero
//! seed makes the noise sequence reproducible.
//!
//! ## Motion model
//!
//! - **Accelerometer**: stationary and level, +1g on Z plus Gaussian noise
//! - **Gyroscope**: constant slow yaw rotation on Z plus noise
//! - **Quaternion**: tracks the same yaw, so gyro and quat agree
//! - **Compass**: heading follows the yaw, displaced by a fixed hard-iron
//!   offset so a calibration pass has something real to recover

use super::events::GESTURE_QUEUE_CAPACITY;
use super::noise::NoiseSource;
use super::{
    FifoPacket, FifoRead, GestureEvent, MotionEngine, SelfTestReport, TapDirection,
    FEATURE_6X_LP_QUAT, FEATURE_ANDROID_ORIENT, FEATURE_SEND_CAL_GYRO, FEATURE_SEND_RAW_ACCEL,
    FEATURE_TAP, SENSOR_COMPASS,
};
use crate::error::{Error, Result};
use crate::sample::{FLAG_ACCEL, FLAG_GYRO, FLAG_QUAT};
use crate::transport::{now_ms, RegisterBus};
use crossbeam_queue::ArrayQueue;
use std::collections::VecDeque;

/// Synthetic FIFO depth in packets; mirrors a 1 KB hardware FIFO
const FIFO_DEPTH: usize = 48;

/// Yaw rate of the simulated motion in deg/s (full turn every 12 s)
const YAW_RATE_DPS: f32 = 30.0;

/// Gyro noise in raw counts
const GYRO_NOISE_RAW: f32 = 8.0;
/// Accel noise in raw counts
const ACCEL_NOISE_RAW: f32 = 60.0;
/// Compass noise in raw counts
const COMPASS_NOISE_RAW: f32 = 4.0;

/// Geomagnetic field magnitude in raw compass counts
const COMPASS_FIELD_RAW: f32 = 220.0;
/// Hard-iron offset baked into the simulated compass, raw counts
const COMPASS_HARD_IRON: [f32; 3] = [120.0, -80.0, 40.0];

/// Per-packet probability of a tap event
const TAP_CHANCE: f32 = 0.001;
/// Per-packet probability of a screen-rotation event
const ORIENT_CHANCE: f32 = 0.0005;

/// Q30 fixed-point scale
const Q30: f32 = (1u64 << 30) as f32;

/// Simulated fused motion processor
///
/// Enforces the same call protocol a hardware engine would: nothing before
/// `init`, no firmware-dependent calls before `load_firmware`, no streaming
/// until the processor is on.
pub struct SimulatedEngine {
    noise: NoiseSource,
    gestures: ArrayQueue<GestureEvent>,
    pending: VecDeque<FifoPacket>,
    /// Keeps the bus handle alive for the engine's lifetime
    _bus: Box<dyn RegisterBus>,

    initialized: bool,
    firmware_loaded: bool,
    dmp_on: bool,
    sensor_mask: u8,
    features: u16,
    sample_rate_hz: u16,
    fifo_rate_hz: u16,
    gyro_fsr_dps: u16,
    accel_fsr_g: u8,
    compass_rate_hz: u16,

    /// Wall-clock ms at `init`; the yaw angle is measured from here
    epoch_ms: u64,
    /// Timestamp the next synthesized packet is due
    next_packet_ms: u64,
    orient_code: u8,
}

impl SimulatedEngine {
    /// Create a simulated engine; seed 0 draws from entropy
    pub fn new(seed: u64, bus: Box<dyn RegisterBus>) -> Self {
        Self {
            noise: NoiseSource::new(seed),
            gestures: ArrayQueue::new(GESTURE_QUEUE_CAPACITY),
            pending: VecDeque::new(),
            _bus: bus,
            initialized: false,
            firmware_loaded: false,
            dmp_on: false,
            sensor_mask: 0,
            features: 0,
            sample_rate_hz: 200,
            fifo_rate_hz: 200,
            // Power-on hardware defaults before configuration.
            gyro_fsr_dps: 2000,
            accel_fsr_g: 2,
            compass_rate_hz: 10,
            epoch_ms: 0,
            next_packet_ms: 0,
            orient_code: 0,
        }
    }

    fn ensure_init(&self) -> Result<()> {
        if self.initialized {
            Ok(())
        } else {
            Err(Error::NotInitialized)
        }
    }

    /// Yaw angle in radians at the given wall-clock time
    fn yaw_at(&self, at_ms: u64) -> f32 {
        let elapsed_s = at_ms.saturating_sub(self.epoch_ms) as f32 * 0.001;
        YAW_RATE_DPS.to_radians() * elapsed_s
    }

    /// Synthesize every packet whose due time has passed
    fn synthesize_pending(&mut self) {
        let now = now_ms();
        let interval = (1000 / u64::from(self.fifo_rate_hz.max(1))).max(1);

        // A long stall overflows the FIFO; anything older is already gone.
        let horizon = interval * FIFO_DEPTH as u64;
        if now.saturating_sub(self.next_packet_ms) > horizon {
            self.next_packet_ms = now - horizon;
        }

        while self.next_packet_ms <= now {
            let packet = self.generate_packet(self.next_packet_ms);
            if self.pending.len() == FIFO_DEPTH {
                self.pending.pop_front();
            }
            self.pending.push_back(packet);
            self.maybe_emit_gestures();
            self.next_packet_ms += interval;
        }
    }

    fn generate_packet(&mut self, at_ms: u64) -> FifoPacket {
        let gyro_scale = 32768.0 / f32::from(self.gyro_fsr_dps);
        let accel_scale = 32768.0 / f32::from(self.accel_fsr_g);

        let gyro = [
            clamp_i16(self.noise.gaussian(GYRO_NOISE_RAW)),
            clamp_i16(self.noise.gaussian(GYRO_NOISE_RAW)),
            clamp_i16(YAW_RATE_DPS * gyro_scale + self.noise.gaussian(GYRO_NOISE_RAW)),
        ];
        let accel = [
            clamp_i16(self.noise.gaussian(ACCEL_NOISE_RAW)),
            clamp_i16(self.noise.gaussian(ACCEL_NOISE_RAW)),
            // +1g opposing gravity when level.
            clamp_i16(accel_scale + self.noise.gaussian(ACCEL_NOISE_RAW)),
        ];

        let half_yaw = self.yaw_at(at_ms) / 2.0;
        let quat = [to_q30(half_yaw.cos()), 0, 0, to_q30(half_yaw.sin())];

        let mut valid = 0;
        if self.features & FEATURE_SEND_CAL_GYRO != 0 {
            valid |= FLAG_GYRO;
        }
        if self.features & FEATURE_SEND_RAW_ACCEL != 0 {
            valid |= FLAG_ACCEL;
        }
        if self.features & FEATURE_6X_LP_QUAT != 0 {
            valid |= FLAG_QUAT;
        }

        FifoPacket {
            gyro,
            accel,
            quat,
            timestamp_ms: at_ms,
            valid,
        }
    }

    fn maybe_emit_gestures(&mut self) {
        if self.features & FEATURE_TAP != 0 && self.noise.chance(TAP_CHANCE) {
            let direction = TapDirection::from_code(1 + self.noise.pick(6) as u8)
                .unwrap_or(TapDirection::ZUp);
            let count = 1 + self.noise.pick(3) as u8;
            let event = GestureEvent::Tap { direction, count };
            if self.gestures.push(event).is_err() {
                log::debug!("Gesture queue full, dropping {event:?}");
            }
        }

        if self.features & FEATURE_ANDROID_ORIENT != 0 && self.noise.chance(ORIENT_CHANCE) {
            self.orient_code = (self.orient_code + 1) % 4;
            let event = GestureEvent::Orientation(self.orient_code);
            if self.gestures.push(event).is_err() {
                log::debug!("Gesture queue full, dropping {event:?}");
            }
        }
    }
}

impl MotionEngine for SimulatedEngine {
    fn init(&mut self) -> Result<()> {
        self.initialized = true;
        self.epoch_ms = now_ms();
        log::debug!("Simulated engine awake");
        Ok(())
    }

    fn set_sensors(&mut self, mask: u8) -> Result<()> {
        self.ensure_init()?;
        self.sensor_mask = mask;
        Ok(())
    }

    fn configure_fifo(&mut self, _mask: u8) -> Result<()> {
        // Every packet carries all groups; validity is feature-driven.
        self.ensure_init()
    }

    fn set_sample_rate(&mut self, hz: u16) -> Result<()> {
        self.ensure_init()?;
        validate_rate(hz)?;
        self.sample_rate_hz = hz;
        Ok(())
    }

    fn sample_rate(&self) -> Result<u16> {
        self.ensure_init()?;
        Ok(self.sample_rate_hz)
    }

    fn set_gyro_fsr(&mut self, dps: u16) -> Result<()> {
        self.ensure_init()?;
        if !matches!(dps, 250 | 500 | 1000 | 2000) {
            return Err(Error::InvalidParameter(format!(
                "unsupported gyro FSR: {dps} dps"
            )));
        }
        self.gyro_fsr_dps = dps;
        Ok(())
    }

    fn gyro_fsr(&self) -> Result<u16> {
        self.ensure_init()?;
        Ok(self.gyro_fsr_dps)
    }

    fn accel_fsr(&self) -> Result<u8> {
        self.ensure_init()?;
        Ok(self.accel_fsr_g)
    }

    fn load_firmware(&mut self) -> Result<()> {
        self.ensure_init()?;
        self.firmware_loaded = true;
        Ok(())
    }

    fn set_orientation(&mut self, _scalar: u16) -> Result<()> {
        // The simulated frame is already world-aligned.
        self.ensure_init()
    }

    fn configure_tap(&mut self, _threshold: u16, _multi_window_ms: u16) -> Result<()> {
        // Simulated taps fire by chance, not by threshold.
        self.ensure_init()
    }

    fn enable_features(&mut self, mask: u16) -> Result<()> {
        self.ensure_init()?;
        if !self.firmware_loaded {
            return Err(Error::InitializationFailed(
                "features require loaded firmware".to_string(),
            ));
        }
        self.features = mask;
        Ok(())
    }

    fn set_fifo_rate(&mut self, hz: u16) -> Result<()> {
        self.ensure_init()?;
        validate_rate(hz)?;
        self.fifo_rate_hz = hz;
        Ok(())
    }

    fn set_dmp_enabled(&mut self, on: bool) -> Result<()> {
        self.ensure_init()?;
        if on && !self.firmware_loaded {
            return Err(Error::InitializationFailed(
                "fusion firmware not loaded".to_string(),
            ));
        }
        self.dmp_on = on;
        if on {
            self.pending.clear();
            self.next_packet_ms = now_ms() + u64::from(1000 / self.fifo_rate_hz.max(1));
        }
        Ok(())
    }

    fn set_gyro_auto_calibration(&mut self, _on: bool) -> Result<()> {
        // The simulated gyro carries no slow bias to track.
        self.ensure_init()
    }

    fn self_test(&mut self) -> Result<SelfTestReport> {
        self.ensure_init()?;
        Ok(SelfTestReport {
            passed: true,
            gyro_bias: [
                self.noise.gaussian(0.4),
                self.noise.gaussian(0.4),
                self.noise.gaussian(0.4),
            ],
            accel_bias: [
                self.noise.gaussian(0.02),
                self.noise.gaussian(0.02),
                self.noise.gaussian(0.02),
            ],
        })
    }

    fn pop_fifo(&mut self) -> Result<FifoRead> {
        if !self.initialized || !self.dmp_on {
            return Err(Error::NotInitialized);
        }
        self.synthesize_pending();
        Ok(FifoRead {
            packet: self.pending.pop_front(),
            more: !self.pending.is_empty(),
        })
    }

    fn poll_gesture(&mut self) -> Option<GestureEvent> {
        self.gestures.pop()
    }

    fn has_compass(&self) -> bool {
        true
    }

    fn read_compass(&mut self) -> Result<[i16; 3]> {
        self.ensure_init()?;
        if self.sensor_mask & SENSOR_COMPASS == 0 {
            return Err(Error::NotSupported("compass is powered down".to_string()));
        }

        // Heading follows the simulated yaw; the hard-iron offset shifts
        // the whole response circle off center.
        let yaw = self.yaw_at(now_ms());
        let field = [
            yaw.cos() * COMPASS_FIELD_RAW + COMPASS_HARD_IRON[0],
            yaw.sin() * COMPASS_FIELD_RAW + COMPASS_HARD_IRON[1],
            -0.4 * COMPASS_FIELD_RAW + COMPASS_HARD_IRON[2],
        ];
        Ok([
            clamp_i16(field[0] + self.noise.gaussian(COMPASS_NOISE_RAW)),
            clamp_i16(field[1] + self.noise.gaussian(COMPASS_NOISE_RAW)),
            clamp_i16(field[2] + self.noise.gaussian(COMPASS_NOISE_RAW)),
        ])
    }

    fn set_compass_sample_rate(&mut self, hz: u16) -> Result<()> {
        self.ensure_init()?;
        if hz == 0 || hz > 100 {
            return Err(Error::InvalidParameter(format!(
                "compass rate out of range: {hz} Hz"
            )));
        }
        self.compass_rate_hz = hz;
        Ok(())
    }

    fn compass_sample_rate(&self) -> Result<u16> {
        self.ensure_init()?;
        Ok(self.compass_rate_hz)
    }
}

/// Engine rates are valid from 4 Hz to 1 kHz
fn validate_rate(hz: u16) -> Result<()> {
    if (4..=1000).contains(&hz) {
        Ok(())
    } else {
        Err(Error::InvalidParameter(format!("rate out of range: {hz} Hz")))
    }
}

/// Clamp f32 to i16 range
#[inline]
fn clamp_i16(value: f32) -> i16 {
    value.clamp(i16::MIN as f32, i16::MAX as f32) as i16
}

/// Unit-scale float to q30 fixed point
#[inline]
fn to_q30(value: f32) -> i32 {
    (value * Q30) as i32
}
