//! On-disk layout of a queue file: a 136-byte header followed by
//! `QUEUE_CAPACITY` fixed-size record slots.

use std::sync::atomic::{AtomicU32, AtomicU64};

/// Slots per queue. Power of two so the slot index is a mask, not a modulo.
pub const QUEUE_CAPACITY: usize = 65_536;

/// `capacity - 1`, applied to the 64-bit counters when indexing slots.
pub const INDEX_MASK: u64 = (QUEUE_CAPACITY as u64) - 1;

/// Header size in bytes. Fixed by the cross-process contract.
pub const HEADER_SIZE: usize = 136;

/// Queue file header, shared between this process and the peer engine.
///
/// The two counters are monotone 64-bit sequence numbers that never wrap in
/// practice. Each sits at the start of its own cache line so the producer
/// core and the consumer core never contend on the same line.
#[repr(C)]
pub(crate) struct QueueHeader {
    /// Offset 0: next slot the producer will write.
    pub(crate) producer_head: AtomicU64,
    _pad0: [u8; 56],
    /// Offset 64: next slot the consumer will read.
    pub(crate) consumer_tail: AtomicU64,
    _pad1: [u8; 56],
    /// Offset 128: per-queue constant, also an endianness sentinel.
    pub(crate) magic: AtomicU32,
    /// Offset 132: must equal [`QUEUE_CAPACITY`].
    pub(crate) capacity: AtomicU32,
}

const _: () = assert!(std::mem::size_of::<QueueHeader>() == HEADER_SIZE);
const _: () = assert!(QUEUE_CAPACITY.is_power_of_two());
