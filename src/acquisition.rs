//! Acquisition loop
//!
//! [`Streamer`] owns the engine and the history region and moves data from
//! one to the other on a millisecond cadence. Each iteration drains the
//! engine FIFO down to the newest packet (the history holds fused samples,
//! so an iteration that fell behind publishes the freshest state rather
//! than replaying the backlog), applies any queued gesture events to the
//! header, polls the compass on its divided cadence, and publishes.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::calibration::CompassCalibration;
use crate::config::AppConfig;
use crate::engine::{FifoPacket, GestureEvent, MotionEngine};
use crate::error::Result;
use crate::history::HistoryWriter;
use crate::sample::Sample;
use crate::transport::{delay_ms, now_ms};

/// Idle time between iterations, in milliseconds.
const LOOP_SLEEP_MS: u64 = 1;

/// Interval between progress log lines, in milliseconds.
const HEARTBEAT_MS: u64 = 5000;

/// Pumps FIFO packets from a motion engine into the sample history.
pub struct Streamer {
    engine: Box<dyn MotionEngine>,
    writer: HistoryWriter,
    calibration: CompassCalibration,
    gyro_fsr_dps: u16,
    accel_fsr_g: u8,
    /// Published samples between compass polls; 0 disables polling.
    compass_divisor: u64,
    samples_produced: u64,
    running: Arc<AtomicBool>,
    last_heartbeat_ms: u64,
}

impl Streamer {
    /// Builds a streamer over an already brought-up engine.
    ///
    /// Scale factors come from engine read-back, so conversions track what
    /// the hardware actually applied. The compass cadence divides the
    /// effective sample rate by the configured compass rate.
    pub fn new(
        engine: Box<dyn MotionEngine>,
        writer: HistoryWriter,
        calibration: CompassCalibration,
        config: &AppConfig,
        running: Arc<AtomicBool>,
    ) -> Result<Self> {
        let sample_rate = engine.sample_rate()?;
        let gyro_fsr_dps = engine.gyro_fsr()?;
        let accel_fsr_g = engine.accel_fsr()?;

        let compass_rate = config.compass.sample_rate_hz;
        let compass_divisor = if compass_rate == 0 || !engine.has_compass() {
            0
        } else {
            u64::from((sample_rate / compass_rate).max(1))
        };

        Ok(Self {
            engine,
            writer,
            calibration,
            gyro_fsr_dps,
            accel_fsr_g,
            compass_divisor,
            samples_produced: 0,
            running,
            last_heartbeat_ms: now_ms(),
        })
    }

    /// Runs until the shared running flag clears.
    pub fn run(&mut self) {
        log::info!(
            "Streaming into {} history slots (compass divisor {})",
            self.writer.capacity(),
            self.compass_divisor
        );

        while self.running.load(Ordering::SeqCst) {
            delay_ms(LOOP_SLEEP_MS);
            self.tick();
            self.heartbeat();
        }

        log::info!("Streaming stopped after {} samples", self.samples_produced);
    }

    /// One acquisition iteration.
    fn tick(&mut self) {
        // Drain everything pending; later packets supersede earlier ones.
        let mut newest: Option<FifoPacket> = None;
        loop {
            match self.engine.pop_fifo() {
                Ok(read) => {
                    if let Some(packet) = read.packet {
                        newest = Some(packet);
                    }
                    if !read.more {
                        break;
                    }
                }
                Err(e) => {
                    // Keep what was already drained; retry the rest next tick.
                    log::warn!("FIFO read failed mid-drain: {e}");
                    break;
                }
            }
        }

        while let Some(event) = self.engine.poll_gesture() {
            match event {
                GestureEvent::Tap { direction, count } => {
                    log::debug!("Tap: {direction:?} x{count}");
                    self.writer.set_tap(direction, count);
                }
                GestureEvent::Orientation(code) => {
                    log::debug!("Orientation changed: {code}");
                    self.writer.set_orientation(code);
                }
            }
        }

        let Some(packet) = newest else { return };
        if packet.valid == 0 {
            // Gesture-only packet; the header fields above are the payload.
            return;
        }

        // The compass cadence counts published samples, checked before the
        // count moves so the very first sample polls too.
        if self.compass_divisor > 0 && self.samples_produced % self.compass_divisor == 0 {
            match self.engine.read_compass() {
                Ok(raw) => self.writer.set_mag(self.calibration.apply(raw)),
                Err(e) => log::debug!("Compass read skipped: {e}"),
            }
        }

        let sample = Sample::from_fifo(&packet, self.gyro_fsr_dps, self.accel_fsr_g);
        let published = self.writer.publish(&sample);
        self.samples_produced += 1;

        log::trace!(
            "Sample {}: t={} flags={:#05b} gyro=[{:.2}, {:.2}, {:.2}]",
            published,
            sample.timestamp_ms,
            sample.flags,
            sample.gyro[0],
            sample.gyro[1],
            sample.gyro[2]
        );
    }

    fn heartbeat(&mut self) {
        let now = now_ms();
        if now.saturating_sub(self.last_heartbeat_ms) >= HEARTBEAT_MS {
            self.last_heartbeat_ms = now;
            log::debug!(
                "{} samples published (history counter {})",
                self.samples_produced,
                self.writer.counter()
            );
        }
    }

    /// Samples published since the streamer started.
    pub fn samples_produced(&self) -> u64 {
        self.samples_produced
    }
}
