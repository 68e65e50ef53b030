//! Error types for queue creation, validation, and operation.

use thiserror::Error;

/// Errors surfaced by [`RingQueue`](crate::RingQueue).
#[derive(Debug, Error)]
pub enum QueueError {
    /// Filesystem or mmap failure.
    #[error("io failure: {0}")]
    Io(#[from] std::io::Error),

    /// The file exists but is not the expected total size.
    #[error("size mismatch: expected {expected} bytes, file is {actual}")]
    SizeMismatch { expected: u64, actual: u64 },

    /// The magic word at offset 128 does not match the record's constant.
    /// Either a foreign file, corruption, or an endianness mismatch.
    #[error("bad magic: expected {expected:#010x}, found {actual:#010x}")]
    BadMagic { expected: u32, actual: u32 },

    /// The capacity word does not match the compile-time capacity.
    #[error("capacity mismatch: file says {actual}, compiled for {expected}")]
    CapacityMismatch { expected: u32, actual: u32 },

    /// Producer backpressure: the consumer has not freed a slot.
    #[error("queue full")]
    Full,
}

impl QueueError {
    /// Returns `true` for errors that clear on their own (backpressure),
    /// as opposed to errors that make the queue unusable.
    #[inline]
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Full)
    }
}
