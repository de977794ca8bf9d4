//! History region writer (producer side)

use super::{region_size, HistoryHeader, HEADER_SIZE, MAGIC, SLOT_SIZE};
use crate::engine::events::TapDirection;
use crate::error::{Error, Result};
use crate::sample::Sample;
use memmap2::MmapMut;
use std::fs::OpenOptions;
use std::path::Path;
use std::ptr;
use std::sync::atomic::{AtomicU32, AtomicU64, AtomicU8, Ordering};

/// Owner of a shared history region
///
/// Exactly one writer owns a region; the `&mut self` publishing methods
/// encode that discipline. Readers attach concurrently from other threads
/// or processes through `HistoryReader` or their own mapping.
pub struct HistoryWriter {
    mmap: MmapMut,
    header: *mut HistoryHeader,
    capacity: u32,
}

// SAFETY: the raw header pointer targets memory owned by `mmap`, which
// lives exactly as long as the writer; all mutation of reader-visible
// fields goes through atomics.
unsafe impl Send for HistoryWriter {}

impl HistoryWriter {
    /// Create (or truncate) a region with the given slot count
    pub fn create<P: AsRef<Path>>(path: P, capacity: u32) -> Result<Self> {
        if capacity == 0 {
            return Err(Error::InvalidParameter(
                "history capacity must be nonzero".to_string(),
            ));
        }

        let path = path.as_ref();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        file.set_len(region_size(capacity) as u64)?;

        // SAFETY: the file is sized for the whole region and stays mapped
        // for the lifetime of self.
        let mut mmap = unsafe { MmapMut::map_mut(&file)? };

        let header = mmap.as_mut_ptr() as *mut HistoryHeader;
        // SAFETY: the mapping is at least HEADER_SIZE bytes and exclusively
        // ours until this constructor returns.
        unsafe {
            (*header).magic = MAGIC;
            (*header).capacity = capacity;
            (*header).slot_size = SLOT_SIZE as u32;
            (*header).counter = AtomicU64::new(0);
            (*header).latest = AtomicU32::new(0);
            (*header).oldest = AtomicU32::new(0);
            (*header).orientation = AtomicU8::new(0);
            (*header).tap_direction = AtomicU8::new(0);
            (*header).tap_count = AtomicU8::new(0);
            (*header)._pad0 = 0;
            (*header).mag = [AtomicU32::new(0), AtomicU32::new(0), AtomicU32::new(0)];
            (*header)._pad1 = [0; 16];
        }

        log::info!(
            "Created history region: {} ({} slots)",
            path.display(),
            capacity
        );

        Ok(HistoryWriter {
            mmap,
            header,
            capacity,
        })
    }

    fn header(&self) -> &HistoryHeader {
        // SAFETY: the header pointer is valid for the lifetime of the
        // mapping held by self.
        unsafe { &*self.header }
    }

    /// Publish one sample, returning the new publish count
    ///
    /// Ordering is the cross-process contract: payload into the slot
    /// first, then the indices, then the counter. See the module docs.
    pub fn publish(&mut self, sample: &Sample) -> u64 {
        // SAFETY: the header pointer is valid for the lifetime of the
        // mapping held by self. Deref'd raw rather than through header()
        // so the slot write below can borrow the mapping mutably.
        let header = unsafe { &*self.header };
        let count = header.counter.load(Ordering::Relaxed);
        let capacity = u64::from(self.capacity);

        // Slot 0 seeds an empty region; afterwards advance past the newest.
        let next = if count == 0 {
            0
        } else {
            (header.latest.load(Ordering::Relaxed) + 1) % self.capacity
        };

        let offset = HEADER_SIZE + next as usize * SLOT_SIZE;
        // SAFETY: next < capacity keeps the slot inside the mapping, and
        // single-writer ownership means no concurrent mutator. Readers may
        // observe the slot mid-write; the counter protocol below lets them
        // detect and discard such copies.
        unsafe {
            let slot = self.mmap.as_mut_ptr().add(offset) as *mut Sample;
            ptr::write(slot, *sample);
        }

        let filled = (count + 1).min(capacity);
        let oldest = ((u64::from(next) + capacity + 1 - filled) % capacity) as u32;

        header.latest.store(next, Ordering::Release);
        header.oldest.store(oldest, Ordering::Release);
        // The counter moves last; readers key their torn-copy check on it.
        header.counter.store(count + 1, Ordering::Release);

        count + 1
    }

    /// Store the screen-rotation code
    pub fn set_orientation(&mut self, code: u8) {
        self.header().orientation.store(code, Ordering::Relaxed);
    }

    /// Store the most recent tap gesture
    pub fn set_tap(&mut self, direction: TapDirection, count: u8) {
        let header = self.header();
        header
            .tap_direction
            .store(direction.as_code(), Ordering::Relaxed);
        header.tap_count.store(count, Ordering::Relaxed);
    }

    /// Store the calibrated magnetometer vector
    ///
    /// Axes are three independent atomics; a reader racing this store can
    /// see a mix of old and new axes, which consumers accept.
    pub fn set_mag(&mut self, mag: [f32; 3]) {
        let header = self.header();
        for (slot, value) in header.mag.iter().zip(mag) {
            slot.store(value.to_bits(), Ordering::Relaxed);
        }
    }

    /// Total samples published into this region
    pub fn counter(&self) -> u64 {
        self.header().counter.load(Ordering::Relaxed)
    }

    /// Slot count fixed at creation
    pub fn capacity(&self) -> u32 {
        self.capacity
    }
}
