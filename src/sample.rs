//! The published motion sample and its unit conversions.
//!
//! Key types for consumers:
//! - [`Sample`]: One converted motion record, laid out for the shared region
//! - `FLAG_*`: Validity bits naming which sensor groups carry data
//!
//! Raw sensor counts convert as `raw / (32768 / full_scale)`; quaternion
//! components are q30 fixed point, `raw / 2^30`.

use crate::engine::FifoPacket;

/// Gyro fields carry data
pub const FLAG_GYRO: u32 = 1 << 0;
/// Accel fields carry data
pub const FLAG_ACCEL: u32 = 1 << 1;
/// Quaternion fields carry data
pub const FLAG_QUAT: u32 = 1 << 2;

/// Size of one history slot in bytes
pub const SAMPLE_SIZE: usize = 56;

/// Q30 fixed-point scale for quaternion components
const QUAT_SCALE: f32 = (1u64 << 30) as f32;

/// One converted motion record
///
/// The layout is part of the shared-region contract: external consumers
/// map this struct byte for byte, so the field order, `#[repr(C)]`, and
/// total size are all load-bearing. `flags` names the sensor groups that
/// carried data in the originating FIFO packet; unnamed groups read as
/// zero.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[repr(C)]
pub struct Sample {
    /// Wall-clock capture time in milliseconds
    pub timestamp_ms: u64,
    /// Acceleration in g
    pub accel: [f32; 3],
    /// Angular rate in deg/s
    pub gyro: [f32; 3],
    /// Orientation quaternion (w, x, y, z), unit scale
    pub quat: [f32; 4],
    /// Validity mask of `FLAG_*` bits
    pub flags: u32,
    /// Reserved, written as zero
    pub reserved: u32,
}

const _: () = assert!(
    std::mem::size_of::<Sample>() == SAMPLE_SIZE,
    "Sample layout is shared with external consumers and must stay 56 bytes"
);

/// Convert a raw gyro count to deg/s at the given full-scale range
#[inline]
pub fn scale_gyro(raw: i16, fsr_dps: u16) -> f32 {
    f32::from(raw) / (32768.0 / f32::from(fsr_dps))
}

/// Convert a raw accel count to g at the given full-scale range
#[inline]
pub fn scale_accel(raw: i16, fsr_g: u8) -> f32 {
    f32::from(raw) / (32768.0 / f32::from(fsr_g))
}

/// Convert a q30 quaternion component to unit scale
#[inline]
pub fn scale_quat(raw: i32) -> f32 {
    raw as f32 / QUAT_SCALE
}

impl Sample {
    /// Convert a FIFO packet at the given full-scale ranges
    ///
    /// Only the groups named by the packet's validity mask are converted;
    /// the rest stay zero. The mask itself is published in `flags`.
    pub fn from_fifo(packet: &FifoPacket, gyro_fsr_dps: u16, accel_fsr_g: u8) -> Self {
        let mut sample = Sample {
            timestamp_ms: packet.timestamp_ms,
            flags: packet.valid,
            ..Sample::default()
        };

        if packet.valid & FLAG_GYRO != 0 {
            for (out, raw) in sample.gyro.iter_mut().zip(packet.gyro) {
                *out = scale_gyro(raw, gyro_fsr_dps);
            }
        }
        if packet.valid & FLAG_ACCEL != 0 {
            for (out, raw) in sample.accel.iter_mut().zip(packet.accel) {
                *out = scale_accel(raw, accel_fsr_g);
            }
        }
        if packet.valid & FLAG_QUAT != 0 {
            for (out, raw) in sample.quat.iter_mut().zip(packet.quat) {
                *out = scale_quat(raw);
            }
        }

        sample
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_layout() {
        assert_eq!(std::mem::size_of::<Sample>(), 56);
        assert_eq!(std::mem::align_of::<Sample>(), 8);
    }

    #[test]
    fn test_gyro_scaling() {
        // Half scale at 1000 dps is 500 deg/s.
        let dps = scale_gyro(16384, 1000);
        assert!((dps - 500.0).abs() < 1e-3, "got {dps}");

        let full = scale_gyro(i16::MIN, 2000);
        assert!((full + 2000.0).abs() < 1e-3, "got {full}");
    }

    #[test]
    fn test_accel_scaling() {
        // Powers of two divide exactly.
        assert_eq!(scale_accel(i16::MIN, 2), -2.0);
        assert_eq!(scale_accel(16384, 2), 1.0);
        assert_eq!(scale_accel(8192, 4), 1.0);
    }

    #[test]
    fn test_quat_scaling() {
        assert_eq!(scale_quat(1 << 30), 1.0);
        assert_eq!(scale_quat(-(1 << 29)), -0.5);
        assert_eq!(scale_quat(0), 0.0);
    }

    #[test]
    fn test_from_fifo_converts_only_valid_groups() {
        let packet = FifoPacket {
            gyro: [16384, 0, -16384],
            accel: [16384, -16384, 0],
            quat: [1 << 30, 0, 0, 0],
            timestamp_ms: 1234,
            valid: FLAG_GYRO,
        };

        let sample = Sample::from_fifo(&packet, 1000, 2);
        assert_eq!(sample.timestamp_ms, 1234);
        assert_eq!(sample.flags, FLAG_GYRO);
        assert!((sample.gyro[0] - 500.0).abs() < 1e-3);
        assert!((sample.gyro[2] + 500.0).abs() < 1e-3);
        // Accel and quat were not flagged valid and stay zero.
        assert_eq!(sample.accel, [0.0; 3]);
        assert_eq!(sample.quat, [0.0; 4]);
    }

    #[test]
    fn test_from_fifo_full_mask() {
        let packet = FifoPacket {
            gyro: [0, 8192, 0],
            accel: [0, 0, 16384],
            quat: [1 << 30, 0, -(1 << 29), 0],
            timestamp_ms: 99,
            valid: FLAG_GYRO | FLAG_ACCEL | FLAG_QUAT,
        };

        let sample = Sample::from_fifo(&packet, 1000, 2);
        assert_eq!(sample.flags, FLAG_GYRO | FLAG_ACCEL | FLAG_QUAT);
        assert!((sample.gyro[1] - 250.0).abs() < 1e-3);
        assert_eq!(sample.accel[2], 1.0);
        assert_eq!(sample.quat[0], 1.0);
        assert_eq!(sample.quat[2], -0.5);
    }
}
