//! Shared-memory sample history
//!
//! A single-writer, multi-reader circular history of `Sample` records in a
//! memory-mapped file, designed so unrelated processes (including non-Rust
//! consumers) can follow the stream by mapping the same file. The writer
//! never blocks and takes no locks; readers detect overwrites and retry.
//!
//! ## Region layout (little-endian, version 1)
//!
//! A 64-byte header followed by `capacity` fixed-size sample slots:
//!
//! | offset | field         | type         |
//! |-------:|---------------|--------------|
//! |      0 | magic         | `u64` `"MOTHIST1"` |
//! |      8 | capacity      | `u32`        |
//! |     12 | slot_size     | `u32` (= 56) |
//! |     16 | counter       | `u64` atomic |
//! |     24 | latest        | `u32` atomic |
//! |     28 | oldest        | `u32` atomic |
//! |     32 | orientation   | `u8` atomic  |
//! |     33 | tap_direction | `u8` atomic  |
//! |     34 | tap_count     | `u8` atomic  |
//! |     35 | (pad)         | `u8`         |
//! |     36 | mag           | `[u32; 3]` atomic, f32 bit patterns |
//! |     48 | (pad)         | `[u8; 16]`   |
//!
//! `counter` is the total number of samples ever published and never
//! resets; `latest` and `oldest` are slot indices bounding the retained
//! window, related by `latest == (oldest + min(counter, capacity) - 1) %
//! capacity` after every publish.
//!
//! ## Publish protocol
//!
//! The writer publishes a sample in a fixed order that readers depend on:
//!
//! 1. copy the payload into the target slot;
//! 2. store `latest`, then `oldest` (release);
//! 3. store the incremented `counter` (release), always last.
//!
//! Because the counter moves only after the payload and indices are in
//! place, a reader that brackets its copy with two counter loads can prove
//! the copy was stable: a slot is reused only after `capacity` further
//! publishes, so the copy is valid iff `c2 - c1 < capacity`.
//!
//! ## Consumer pattern
//!
//! ```text
//! loop {
//!     c1 = load counter (acquire);   // 0 means nothing published yet
//!     idx = load latest (acquire);
//!     copy slot[idx];
//!     fence; c2 = load counter;
//!     if c2 - c1 < capacity { done } else { retry }
//! }
//! ```
//!
//! Staleness is detected the same way: a consumer that polls and sees
//! `counter` unchanged (or old `timestamp_ms` values) treats the producer
//! as stalled.

use crate::sample::SAMPLE_SIZE;
use std::sync::atomic::{AtomicU32, AtomicU64, AtomicU8};

mod reader;
mod writer;

pub use reader::HistoryReader;
pub use writer::HistoryWriter;

/// Region signature, `b"MOTHIST1"` little-endian
pub const MAGIC: u64 = u64::from_le_bytes(*b"MOTHIST1");

/// Fixed header size in bytes
pub const HEADER_SIZE: usize = 64;

/// Size of one sample slot in bytes
pub const SLOT_SIZE: usize = SAMPLE_SIZE;

/// Shared region header
///
/// Lives at offset 0 of the mapping. The plain fields are written once at
/// creation and read-only afterwards; everything mutable is atomic.
#[repr(C)]
pub(crate) struct HistoryHeader {
    pub(crate) magic: u64,
    pub(crate) capacity: u32,
    pub(crate) slot_size: u32,
    pub(crate) counter: AtomicU64,
    pub(crate) latest: AtomicU32,
    pub(crate) oldest: AtomicU32,
    pub(crate) orientation: AtomicU8,
    pub(crate) tap_direction: AtomicU8,
    pub(crate) tap_count: AtomicU8,
    pub(crate) _pad0: u8,
    pub(crate) mag: [AtomicU32; 3],
    pub(crate) _pad1: [u8; 16],
}

const _: () = assert!(
    std::mem::size_of::<HistoryHeader>() == HEADER_SIZE,
    "header layout is shared with external consumers and must stay 64 bytes"
);

/// Total region size for a given slot count
pub(crate) fn region_size(capacity: u32) -> usize {
    HEADER_SIZE + capacity as usize * SLOT_SIZE
}
