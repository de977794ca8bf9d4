//! MotionIO - IMU streaming daemon
//!
//! ## Data path
//!
//! The daemon brings up a fused motion processor, drains its FIFO on a
//! millisecond cadence, and publishes scaled samples into a memory-mapped
//! ring (`[history]` in the config). Reader processes map the same file and
//! follow the ring without any syscall or lock on the hot path; gesture
//! events and calibrated compass readings ride along in the region header.

mod acquisition;
mod calibration;
mod config;
mod engine;
mod error;
mod history;
mod sample;
mod transport;

use crate::acquisition::Streamer;
use crate::calibration::{calibrate_compass, CompassCalibration};
use crate::config::AppConfig;
use crate::engine::{bring_up, create_engine};
use crate::error::Result;
use crate::history::HistoryWriter;
use crate::transport::{I2cBus, MockBus, RegisterBus};
use std::env;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Parse config path from command line arguments.
///
/// Supports:
/// - `motion-io <path>` (positional)
/// - `motion-io --config <path>` (flag-based)
/// - `motion-io -c <path>` (short flag)
///
/// Defaults to `/etc/motionio.toml` if not specified.
fn parse_config_path() -> String {
    let args: Vec<String> = env::args().collect();

    // Look for --config or -c flag
    for i in 1..args.len() {
        if (args[i] == "--config" || args[i] == "-c") && i + 1 < args.len() {
            return args[i + 1].clone();
        }
    }

    // Fall back to first positional argument (if it doesn't start with -)
    if args.len() > 1 && !args[1].starts_with('-') {
        return args[1].clone();
    }

    // Default path
    "/etc/motionio.toml".to_string()
}

fn main() -> Result<()> {
    // Initialize logger
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    log::info!("MotionIO v0.1.0 starting...");

    // Get config path from args or default
    // Supports: motion-io <path> OR motion-io --config <path>
    let config_path = parse_config_path();

    // Load configuration
    log::info!("Using config: {}", config_path);
    let config = AppConfig::from_file(&config_path)?;

    log::info!(
        "Engine: {} (bus {} at {:#04x})",
        config.engine.kind,
        config.transport.bus,
        config.transport.address
    );

    // The simulated engine takes a loopback bus; everything else opens the
    // configured I2C device node.
    let bus: Box<dyn RegisterBus> = if config.engine.kind == "sim" {
        Box::new(MockBus::new())
    } else {
        Box::new(I2cBus::open(&config.transport.bus, config.transport.address)?)
    };

    let mut engine = create_engine(&config.engine, bus)?;
    bring_up(engine.as_mut(), &config)?;

    // The factory self test costs a few hundred milliseconds, so it only
    // runs when someone is watching debug output.
    if log::log_enabled!(log::Level::Debug) {
        let report = engine.self_test()?;
        log::debug!(
            "Self test {}: gyro bias [{:.2}, {:.2}, {:.2}] dps, accel bias [{:.3}, {:.3}, {:.3}] g",
            if report.passed { "passed" } else { "FAILED" },
            report.gyro_bias[0],
            report.gyro_bias[1],
            report.gyro_bias[2],
            report.accel_bias[0],
            report.accel_bias[1],
            report.accel_bias[2]
        );
    }

    let calibration = if config.compass.calibrate_on_start {
        calibrate_compass(
            engine.as_mut(),
            config.compass.calibration_samples,
            config.compass.calibration_rate_hz,
            config.compass.sample_rate_hz,
        )?
    } else {
        CompassCalibration::identity()
    };

    let writer = HistoryWriter::create(&config.history.path, config.history.capacity)?;

    // Set up shutdown signal handler
    let running = Arc::new(AtomicBool::new(true));
    let r = Arc::clone(&running);

    ctrlc::set_handler(move || {
        log::info!("Received shutdown signal");
        r.store(false, Ordering::SeqCst);
    })
    .map_err(|e| error::Error::Other(format!("Error setting Ctrl-C handler: {}", e)))?;

    log::info!("MotionIO running. Press Ctrl-C to stop.");

    let mut streamer = Streamer::new(engine, writer, calibration, &config, running)?;
    streamer.run();

    log::info!("Shutting down...");
    log::info!("MotionIO stopped");
    Ok(())
}
