//! Typed gesture events
//!
//! The engine's gesture detectors (tap, screen rotation) report through a
//! bounded queue instead of callbacks: engines push while parsing FIFO
//! packets, the acquisition loop drains once per iteration. When the queue
//! is full the newest event is dropped with a debug log; gestures are
//! advisory and a full queue means nobody is draining.

/// Capacity of an engine's gesture queue
pub const GESTURE_QUEUE_CAPACITY: usize = 16;

/// Tap direction wire codes
///
/// The codes are published as-is in the history header, so consumers in
/// other languages can match on the numbers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum TapDirection {
    XUp = 1,
    XDown = 2,
    YUp = 3,
    YDown = 4,
    ZUp = 5,
    ZDown = 6,
}

impl TapDirection {
    /// Wire code for the history header
    pub fn as_code(self) -> u8 {
        self as u8
    }

    /// Decode a wire code
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(TapDirection::XUp),
            2 => Some(TapDirection::XDown),
            3 => Some(TapDirection::YUp),
            4 => Some(TapDirection::YDown),
            5 => Some(TapDirection::ZUp),
            6 => Some(TapDirection::ZDown),
            _ => None,
        }
    }
}

/// One gesture notification from the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GestureEvent {
    /// Tap detected along an axis; `count` groups rapid multi-taps
    Tap {
        direction: TapDirection,
        count: u8,
    },
    /// Screen-rotation code (0..=3)
    Orientation(u8),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tap_direction_codes_round_trip() {
        for code in 1..=6 {
            let direction = TapDirection::from_code(code).unwrap();
            assert_eq!(direction.as_code(), code);
        }
    }

    #[test]
    fn test_tap_direction_rejects_unknown_codes() {
        assert_eq!(TapDirection::from_code(0), None);
        assert_eq!(TapDirection::from_code(7), None);
        assert_eq!(TapDirection::from_code(0xFF), None);
    }
}
