//! History region reader (consumer side)

use super::{region_size, HistoryHeader, HEADER_SIZE, MAGIC, SLOT_SIZE};
use crate::engine::events::TapDirection;
use crate::error::{Error, Result};
use crate::sample::Sample;
use memmap2::Mmap;
use std::fs::OpenOptions;
use std::path::Path;
use std::sync::atomic::{fence, Ordering};

/// Attempts before a persistently torn read reports `Error::Timeout`
const MAX_RETRIES: usize = 3;

/// Read-only view of a shared history region
///
/// Any number of readers may attach to a live region. Reads follow the
/// counter re-check protocol documented on the module: copy, then prove
/// the writer lapped fewer than `capacity` publishes in the meantime.
pub struct HistoryReader {
    mmap: Mmap,
    header: *const HistoryHeader,
    capacity: u32,
}

// SAFETY: read-only view over a shared mapping; the raw pointer targets
// memory owned by `mmap`, which lives as long as self.
unsafe impl Send for HistoryReader {}
// SAFETY: all methods take &self and touch writer-mutable state only
// through atomics plus the retry protocol.
unsafe impl Sync for HistoryReader {}

impl HistoryReader {
    /// Map an existing region read-only, validating its header
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = OpenOptions::new().read(true).open(path.as_ref())?;
        let len = file.metadata()?.len() as usize;
        if len < HEADER_SIZE {
            return Err(Error::InvalidRegion(format!(
                "file holds {len} bytes, the header alone needs {HEADER_SIZE}"
            )));
        }

        // SAFETY: shared read-only mapping, kept alive by self.
        let mmap = unsafe { Mmap::map(&file)? };
        let header = mmap.as_ptr() as *const HistoryHeader;

        // SAFETY: the mapping is at least HEADER_SIZE bytes.
        let (magic, capacity, slot_size) =
            unsafe { ((*header).magic, (*header).capacity, (*header).slot_size) };

        if magic != MAGIC {
            return Err(Error::InvalidRegion(format!(
                "bad magic {magic:#018x}, expected {MAGIC:#018x}"
            )));
        }
        if slot_size as usize != SLOT_SIZE {
            return Err(Error::InvalidRegion(format!(
                "slot size {slot_size}, this build expects {SLOT_SIZE}"
            )));
        }
        if capacity == 0 || len < region_size(capacity) {
            return Err(Error::InvalidRegion(format!(
                "{len} bytes cannot hold {capacity} slots"
            )));
        }

        Ok(HistoryReader {
            mmap,
            header,
            capacity,
        })
    }

    /// Copy one slot
    ///
    /// # Safety
    /// `idx` must be below capacity. The copy may race the writer; callers
    /// must validate it with the counter re-check before trusting it.
    unsafe fn read_slot(&self, idx: u32) -> Sample {
        let offset = HEADER_SIZE + idx as usize * SLOT_SIZE;
        std::ptr::read_volatile(self.mmap.as_ptr().add(offset) as *const Sample)
    }

    /// Copy the newest sample; `None` while nothing has been published
    pub fn latest(&self) -> Result<Option<Sample>> {
        // SAFETY: the header pointer is valid for the mapping's lifetime.
        let header = unsafe { &*self.header };

        for _ in 0..MAX_RETRIES {
            let c1 = header.counter.load(Ordering::Acquire);
            if c1 == 0 {
                return Ok(None);
            }
            let idx = header.latest.load(Ordering::Acquire);
            if idx >= self.capacity {
                return Err(Error::InvalidRegion(format!(
                    "latest index {idx} outside capacity {}",
                    self.capacity
                )));
            }
            // SAFETY: idx bounds-checked above.
            let sample = unsafe { self.read_slot(idx) };

            // Order the slot copy before the counter re-load.
            fence(Ordering::SeqCst);
            let c2 = header.counter.load(Ordering::Acquire);

            // The copied slot is reused only after `capacity` further
            // publishes, so a smaller delta proves the copy was stable.
            if c2.wrapping_sub(c1) < u64::from(self.capacity) {
                return Ok(Some(sample));
            }
            std::hint::spin_loop();
        }

        Err(Error::Timeout)
    }

    /// Copy the retained window, oldest first
    ///
    /// Entries the writer overwrote during the copy are trimmed from the
    /// front, so everything returned is a stable sample in publish order.
    pub fn recent(&self) -> Result<Vec<Sample>> {
        // SAFETY: the header pointer is valid for the mapping's lifetime.
        let header = unsafe { &*self.header };

        for _ in 0..MAX_RETRIES {
            let c1 = header.counter.load(Ordering::Acquire);
            if c1 == 0 {
                return Ok(Vec::new());
            }
            let oldest = header.oldest.load(Ordering::Acquire);
            if oldest >= self.capacity {
                return Err(Error::InvalidRegion(format!(
                    "oldest index {oldest} outside capacity {}",
                    self.capacity
                )));
            }

            let filled = c1.min(u64::from(self.capacity)) as u32;
            let mut window = Vec::with_capacity(filled as usize);
            for k in 0..filled {
                let idx = (oldest + k) % self.capacity;
                // SAFETY: idx is reduced modulo capacity.
                window.push(unsafe { self.read_slot(idx) });
            }

            fence(Ordering::SeqCst);
            let c2 = header.counter.load(Ordering::Acquire);
            let lapped = c2.wrapping_sub(c1);

            if lapped >= u64::from(self.capacity) {
                // The whole window churned under us.
                std::hint::spin_loop();
                continue;
            }

            // Each publish during the copy reclaimed the then-oldest slot.
            window.drain(..(lapped as usize).min(window.len()));
            return Ok(window);
        }

        Err(Error::Timeout)
    }

    /// Total samples published; unchanged counters across polls mean the
    /// producer has stalled
    pub fn counter(&self) -> u64 {
        // SAFETY: the header pointer is valid for the mapping's lifetime.
        let header = unsafe { &*self.header };
        header.counter.load(Ordering::Acquire)
    }

    /// Slot index of the newest sample
    pub fn latest_index(&self) -> u32 {
        // SAFETY: as above.
        let header = unsafe { &*self.header };
        header.latest.load(Ordering::Acquire)
    }

    /// Slot index of the oldest retained sample
    pub fn oldest_index(&self) -> u32 {
        // SAFETY: as above.
        let header = unsafe { &*self.header };
        header.oldest.load(Ordering::Acquire)
    }

    /// Last published screen-rotation code
    pub fn orientation(&self) -> u8 {
        // SAFETY: as above.
        let header = unsafe { &*self.header };
        header.orientation.load(Ordering::Relaxed)
    }

    /// Last published tap gesture, if any
    pub fn tap(&self) -> (Option<TapDirection>, u8) {
        // SAFETY: as above.
        let header = unsafe { &*self.header };
        let direction = TapDirection::from_code(header.tap_direction.load(Ordering::Relaxed));
        (direction, header.tap_count.load(Ordering::Relaxed))
    }

    /// Last published calibrated magnetometer vector
    pub fn mag(&self) -> [f32; 3] {
        // SAFETY: as above.
        let header = unsafe { &*self.header };
        let mut out = [0.0; 3];
        for (value, slot) in out.iter_mut().zip(&header.mag) {
            *value = f32::from_bits(slot.load(Ordering::Relaxed));
        }
        out
    }

    /// Slot count fixed when the region was created
    pub fn capacity(&self) -> u32 {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::super::HistoryWriter;
    use super::*;
    use std::io::{Seek, SeekFrom, Write};
    use tempfile::tempdir;

    fn numbered(n: u64) -> Sample {
        Sample {
            timestamp_ms: n,
            gyro: [n as f32, 0.0, 0.0],
            flags: 0b111,
            ..Sample::default()
        }
    }

    #[test]
    fn test_open_rejects_truncated_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("tiny.shm");
        std::fs::write(&path, [0u8; 10]).unwrap();

        assert!(matches!(
            HistoryReader::open(&path),
            Err(Error::InvalidRegion(_))
        ));
    }

    #[test]
    fn test_open_rejects_bad_magic() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("zeros.shm");
        std::fs::write(&path, [0u8; 256]).unwrap();

        assert!(matches!(
            HistoryReader::open(&path),
            Err(Error::InvalidRegion(_))
        ));
    }

    #[test]
    fn test_open_rejects_foreign_slot_size() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("foreign.shm");
        drop(HistoryWriter::create(&path, 4).unwrap());

        // Rewrite slot_size as if another build with a different record
        // layout had produced the file.
        let mut file = OpenOptions::new().write(true).open(&path).unwrap();
        file.seek(SeekFrom::Start(12)).unwrap();
        file.write_all(&28u32.to_le_bytes()).unwrap();
        drop(file);

        assert!(matches!(
            HistoryReader::open(&path),
            Err(Error::InvalidRegion(_))
        ));
    }

    #[test]
    fn test_empty_region_reads_as_nothing() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("empty.shm");
        let _writer = HistoryWriter::create(&path, 8).unwrap();

        let reader = HistoryReader::open(&path).unwrap();
        assert_eq!(reader.counter(), 0);
        assert_eq!(reader.latest().unwrap(), None);
        assert!(reader.recent().unwrap().is_empty());
    }

    #[test]
    fn test_latest_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("latest.shm");
        let mut writer = HistoryWriter::create(&path, 8).unwrap();
        let reader = HistoryReader::open(&path).unwrap();

        let sample = Sample {
            timestamp_ms: 1234,
            accel: [0.0, 0.0, 1.0],
            gyro: [0.5, -0.5, 12.25],
            quat: [1.0, 0.0, 0.0, 0.0],
            flags: 0b111,
            reserved: 0,
        };
        writer.publish(&sample);

        assert_eq!(reader.counter(), 1);
        assert_eq!(reader.latest().unwrap(), Some(sample));
        assert_eq!(reader.latest_index(), 0);
        assert_eq!(reader.oldest_index(), 0);
    }

    #[test]
    fn test_recent_preserves_publish_order_across_wrap() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("window.shm");
        let mut writer = HistoryWriter::create(&path, 4).unwrap();
        let reader = HistoryReader::open(&path).unwrap();

        for n in 1..=6 {
            writer.publish(&numbered(n));
        }

        let window = reader.recent().unwrap();
        let stamps: Vec<u64> = window.iter().map(|s| s.timestamp_ms).collect();
        assert_eq!(stamps, vec![3, 4, 5, 6]);
    }

    #[test]
    fn test_counter_advances_with_publishes() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("stale.shm");
        let mut writer = HistoryWriter::create(&path, 4).unwrap();
        let reader = HistoryReader::open(&path).unwrap();

        writer.publish(&numbered(1));
        let before = reader.counter();
        // No publishes in between: a poller sees the same counter and
        // can conclude the producer is stalled.
        assert_eq!(reader.counter(), before);

        writer.publish(&numbered(2));
        assert_eq!(reader.counter(), before + 1);
    }

    #[test]
    fn test_aux_fields_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("aux.shm");
        let mut writer = HistoryWriter::create(&path, 2).unwrap();
        let reader = HistoryReader::open(&path).unwrap();

        assert_eq!(reader.tap(), (None, 0));

        writer.set_orientation(2);
        writer.set_tap(TapDirection::XDown, 3);
        writer.set_mag([12.5, -7.25, 33.0]);

        assert_eq!(reader.orientation(), 2);
        assert_eq!(reader.tap(), (Some(TapDirection::XDown), 3));
        assert_eq!(reader.mag(), [12.5, -7.25, 33.0]);
    }
}
