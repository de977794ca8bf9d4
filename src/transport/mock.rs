//! Mock register bus for testing

use super::RegisterBus;
use crate::error::{Error, Result};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Mock register bus for unit testing
///
/// Clones share state, so a test can keep a handle while the code under
/// test owns the bus.
#[derive(Clone)]
pub struct MockBus {
    inner: Arc<Mutex<MockBusInner>>,
}

struct MockBusInner {
    registers: HashMap<u8, Vec<u8>>,
    written: Vec<(u8, Vec<u8>)>,
    write_limit: Option<usize>,
}

impl MockBus {
    /// Create a new mock bus
    pub fn new() -> Self {
        MockBus {
            inner: Arc::new(Mutex::new(MockBusInner {
                registers: HashMap::new(),
                written: Vec::new(),
                write_limit: None,
            })),
        }
    }

    /// Set the bytes served from a register address
    pub fn set_register(&self, reg: u8, data: &[u8]) {
        let mut inner = self.inner.lock().unwrap();
        inner.registers.insert(reg, data.to_vec());
    }

    /// All frames written so far, as (register, payload) pairs
    pub fn written(&self) -> Vec<(u8, Vec<u8>)> {
        let inner = self.inner.lock().unwrap();
        inner.written.clone()
    }

    /// Clear the write log
    pub fn clear_written(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.written.clear();
    }

    /// Cap how many bytes a write transaction can move
    ///
    /// Frames longer than `limit` fail as short transfers, leaving no
    /// trace in the register store or the write log.
    pub fn limit_write(&self, limit: usize) {
        let mut inner = self.inner.lock().unwrap();
        inner.write_limit = Some(limit);
    }
}

impl RegisterBus for MockBus {
    fn write_registers(&mut self, reg: u8, data: &[u8]) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();

        // Frame on the wire is the register byte plus the payload.
        let frame_len = 1 + data.len();
        if let Some(limit) = inner.write_limit {
            if frame_len > limit {
                return Err(Error::ShortTransfer {
                    expected: frame_len,
                    actual: limit,
                });
            }
        }

        inner.written.push((reg, data.to_vec()));
        inner.registers.insert(reg, data.to_vec());
        Ok(())
    }

    fn read_registers(&mut self, reg: u8, buf: &mut [u8]) -> Result<()> {
        let inner = self.inner.lock().unwrap();

        let stored = inner.registers.get(&reg).map(Vec::as_slice).unwrap_or(&[]);
        if stored.len() < buf.len() {
            // Short reads fail whole; no partial data reaches the caller.
            return Err(Error::ShortTransfer {
                expected: buf.len(),
                actual: stored.len(),
            });
        }

        buf.copy_from_slice(&stored[..buf.len()]);
        Ok(())
    }
}

impl Default for MockBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_logs_frames() {
        let bus = MockBus::new();
        let mut handle = bus.clone();

        handle.write_registers(0x6B, &[0x00]).unwrap();
        handle.write_registers(0x19, &[0x04, 0x03]).unwrap();

        let written = bus.written();
        assert_eq!(written.len(), 2);
        assert_eq!(written[0], (0x6B, vec![0x00]));
        assert_eq!(written[1], (0x19, vec![0x04, 0x03]));
    }

    #[test]
    fn test_read_returns_stored_bytes() {
        let bus = MockBus::new();
        bus.set_register(0x3B, &[0x12, 0x34, 0x56, 0x78]);

        let mut handle = bus.clone();
        let mut buf = [0u8; 4];
        handle.read_registers(0x3B, &mut buf).unwrap();
        assert_eq!(buf, [0x12, 0x34, 0x56, 0x78]);
    }

    #[test]
    fn test_short_read_fails_without_partial_data() {
        let bus = MockBus::new();
        bus.set_register(0x3B, &[0xAA, 0xBB, 0xCC]);

        let mut handle = bus.clone();
        let mut buf = [0u8; 6];
        let err = handle.read_registers(0x3B, &mut buf).unwrap_err();

        match err {
            Error::ShortTransfer { expected, actual } => {
                assert_eq!(expected, 6);
                assert_eq!(actual, 3);
            }
            other => panic!("expected ShortTransfer, got {other:?}"),
        }
        // Untouched buffer: failure delivered no bytes.
        assert_eq!(buf, [0u8; 6]);
    }

    #[test]
    fn test_short_write_fails() {
        let bus = MockBus::new();
        bus.limit_write(2);

        let mut handle = bus.clone();
        let err = handle.write_registers(0x70, &[1, 2, 3]).unwrap_err();
        assert!(matches!(
            err,
            Error::ShortTransfer {
                expected: 4,
                actual: 2
            }
        ));
        assert!(bus.written().is_empty());
    }
}
