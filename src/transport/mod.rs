//! Transport layer for register-level device access
//!
//! The motion engine reaches its sensor through the [`RegisterBus`] trait.
//! A transaction frame is the register address byte followed by the payload;
//! transfers are all-or-nothing (a transfer that moves fewer bytes than
//! requested surfaces as `Error::ShortTransfer`, never as partial data).
//!
//! The module also carries the two platform services setup sequences need:
//! a blocking millisecond delay and wall-clock milliseconds.

use crate::error::Result;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

mod i2c;
mod mock;

pub use i2c::I2cBus;
pub use mock::MockBus;

/// Register-level bus access for the motion sensor
///
/// Implementations own their bus handle for the life of the value and
/// re-select the device address before every transaction; other processes
/// may address other devices on the same bus between our calls. Retry
/// policy belongs to callers.
pub trait RegisterBus: Send {
    /// Write `data` to the device register at `reg`
    fn write_registers(&mut self, reg: u8, data: &[u8]) -> Result<()>;

    /// Read exactly `buf.len()` bytes starting at register `reg`
    fn read_registers(&mut self, reg: u8, buf: &mut [u8]) -> Result<()>;
}

/// Wall-clock milliseconds since the Unix epoch
///
/// Timestamps only order samples relative to each other; a pre-epoch
/// clock reads as 0.
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Block the calling thread for `ms` milliseconds
pub fn delay_ms(ms: u64) {
    std::thread::sleep(Duration::from_millis(ms));
}
