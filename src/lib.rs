//! MotionIO - IMU streaming daemon with a shared-memory sample history
//!
//! This library drives a fused motion processor (gyro, accelerometer,
//! magnetometer, on-chip quaternion) and publishes scaled samples into a
//! lock-free memory-mapped ring that any number of reader processes can
//! map alongside it.
//!
//! ## Features
//!
//! - `mock`: Enable the simulated engine for hardware-free runs (default)

pub mod acquisition;
pub mod calibration;
pub mod config;
pub mod engine;
pub mod error;
pub mod history;
pub mod sample;
pub mod transport;

// Re-export commonly used types
pub use config::AppConfig;
pub use error::{Error, Result};
