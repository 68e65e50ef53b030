use crate::error::QueueError;
use crate::layout::{QueueHeader, HEADER_SIZE, INDEX_MASK, QUEUE_CAPACITY};
use crate::records::ShmRecord;
use memmap2::{MmapMut, MmapOptions};
use std::fs::{self, File, OpenOptions};
use std::marker::PhantomData;
use std::mem;
use std::path::Path;
use std::ptr;
use std::sync::atomic::Ordering;

// =============================================================================
// MEMORY ORDERING & SYNCHRONIZATION STRATEGY
// =============================================================================
//
// Each queue is a classic SPSC protocol over a shared mapping, where either
// endpoint may live in a peer process:
//
// **Producer (enqueue):**
// 1. Load `consumer_tail` with Acquire (synchronizes with the consumer)
// 2. Load `producer_head` with Relaxed (only the producer writes it)
// 3. Full when `head - tail >= capacity` — a slot is never overwritten
//    before the consumer has advanced past it
// 4. Plain store of the record into slot `head & mask`
// 5. Store `head + 1` with Release (publishes the slot write)
//
// **Consumer (dequeue):**
// 1. Load `producer_head` with Acquire (synchronizes with the producer)
// 2. Load `consumer_tail` with Relaxed (only the consumer writes it)
// 3. Empty when `tail == head`
// 4. Plain copy of the record out of slot `tail & mask`
// 5. Store `tail + 1` with Release (frees the slot for reuse)
//
// The counters are unbounded u64 sequence numbers: at queue rates wrap-around
// is unreachable, and slots between `tail` and `head` are the only valid
// region of the mapping. No per-slot sequence word exists, so the capacity
// check on enqueue is the sole guard against overwriting unconsumed slots.
//
// =============================================================================

/// A fixed-capacity SPSC queue of `T` records over a memory-mapped file.
///
/// The file layout (header at offset 0, slots after [`HEADER_SIZE`]) is a
/// cross-process, cross-language contract; see [`crate::records`]. One
/// process endpoint enqueues, one dequeues — which role this process plays
/// is a deployment fact, not a type-level one, so both operations take
/// `&self` and the discipline is part of the safety contract below.
pub struct RingQueue<T: ShmRecord> {
    _file: File,
    map: MmapMut,
    base: *mut u8,
    locked: bool,
    closed: bool,
    _marker: PhantomData<T>,
}

// SAFETY: the mapping is plain POD storage; all cross-endpoint
// synchronization goes through the header's atomic counters with
// release/acquire pairs. Each endpoint writes only its own counter and only
// the slots its protocol role currently owns, so sharing the handle across
// threads is sound as long as the SPSC discipline (one producing endpoint,
// one consuming endpoint per queue) holds — the same discipline the peer
// process is bound by.
unsafe impl<T: ShmRecord> Send for RingQueue<T> {}
unsafe impl<T: ShmRecord> Sync for RingQueue<T> {}

impl<T: ShmRecord> std::fmt::Debug for RingQueue<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RingQueue")
            .field("locked", &self.locked)
            .field("closed", &self.closed)
            .finish()
    }
}

impl<T: ShmRecord> RingQueue<T> {
    /// Slots per queue (compile-time constant).
    pub const CAPACITY: usize = QUEUE_CAPACITY;

    /// Exact file size: header plus all slots.
    pub const TOTAL_SIZE: usize = HEADER_SIZE + QUEUE_CAPACITY * mem::size_of::<T>();

    /// Creates the queue file, truncating any stale one, and initializes the
    /// header. Pages are locked into RAM on a best-effort basis; a failed
    /// `mlock` is not fatal (tune `ulimit -l` / `CAP_IPC_LOCK` if needed).
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self, QueueError> {
        let path = path.as_ref();
        let _ = fs::remove_file(path);

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(path)?;
        file.set_len(Self::TOTAL_SIZE as u64)?;
        file.sync_all()?;

        // SAFETY: the file is freshly sized to TOTAL_SIZE and stays open for
        // the lifetime of the mapping.
        let mut map = unsafe { MmapOptions::new().len(Self::TOTAL_SIZE).map_mut(&file)? };
        let base = map.as_mut_ptr();
        let locked = unsafe { libc::mlock(base.cast(), Self::TOTAL_SIZE) } == 0;

        let queue = Self {
            _file: file,
            map,
            base,
            locked,
            closed: false,
            _marker: PhantomData,
        };

        let header = queue.header();
        header.producer_head.store(0, Ordering::Release);
        header.consumer_tail.store(0, Ordering::Release);
        header.capacity.store(QUEUE_CAPACITY as u32, Ordering::Release);
        // Magic last: a peer that sees it can trust the rest of the header.
        header.magic.store(T::MAGIC, Ordering::Release);
        queue.map.flush()?;

        Ok(queue)
    }

    /// Opens an existing queue file, verifying size, magic, and capacity.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, QueueError> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;

        let actual = file.metadata()?.len();
        if actual != Self::TOTAL_SIZE as u64 {
            return Err(QueueError::SizeMismatch {
                expected: Self::TOTAL_SIZE as u64,
                actual,
            });
        }

        // SAFETY: size verified above; the file stays open for the lifetime
        // of the mapping.
        let mut map = unsafe { MmapOptions::new().len(Self::TOTAL_SIZE).map_mut(&file)? };
        let base = map.as_mut_ptr();
        let locked = unsafe { libc::mlock(base.cast(), Self::TOTAL_SIZE) } == 0;

        let queue = Self {
            _file: file,
            map,
            base,
            locked,
            closed: false,
            _marker: PhantomData,
        };

        let magic = queue.header().magic.load(Ordering::Acquire);
        if magic != T::MAGIC {
            return Err(QueueError::BadMagic {
                expected: T::MAGIC,
                actual: magic,
            });
        }
        let capacity = queue.header().capacity.load(Ordering::Acquire);
        if capacity != QUEUE_CAPACITY as u32 {
            return Err(QueueError::CapacityMismatch {
                expected: QUEUE_CAPACITY as u32,
                actual: capacity,
            });
        }

        Ok(queue)
    }

    #[inline]
    fn header(&self) -> &QueueHeader {
        // SAFETY: `base` points at a live, page-aligned mapping of at least
        // HEADER_SIZE bytes; QueueHeader is atomics and padding only.
        unsafe { &*self.base.cast::<QueueHeader>() }
    }

    #[inline]
    fn slot_ptr(&self, seq: u64) -> *mut T {
        let idx = (seq & INDEX_MASK) as usize;
        // SAFETY: idx < QUEUE_CAPACITY by the mask; the slot region starts at
        // HEADER_SIZE and the mapping covers all slots.
        unsafe { self.base.add(HEADER_SIZE).cast::<T>().add(idx) }
    }

    /// Appends a record. Returns [`QueueError::Full`] when the consumer is
    /// `CAPACITY` records behind; the caller's backpressure policy applies.
    pub fn enqueue(&self, record: T) -> Result<(), QueueError> {
        let header = self.header();
        let tail = header.consumer_tail.load(Ordering::Acquire);
        let head = header.producer_head.load(Ordering::Relaxed);

        if head.wrapping_sub(tail) >= QUEUE_CAPACITY as u64 {
            return Err(QueueError::Full);
        }

        // SAFETY: slot `head` is outside the valid region [tail, head), so
        // the consumer will not read it until the release store below
        // publishes it. Plain store suffices; the release covers it.
        unsafe { ptr::write(self.slot_ptr(head), record) };

        header
            .producer_head
            .store(head.wrapping_add(1), Ordering::Release);
        Ok(())
    }

    /// Removes and returns the oldest record, or `None` when empty.
    pub fn dequeue(&self) -> Option<T> {
        let header = self.header();
        let head = header.producer_head.load(Ordering::Acquire);
        let tail = header.consumer_tail.load(Ordering::Relaxed);

        if tail == head {
            return None;
        }

        // SAFETY: slot `tail` is inside [tail, head); the acquire load of
        // `producer_head` synchronizes with the producer's release store, so
        // the record is fully written.
        let record = unsafe { ptr::read(self.slot_ptr(tail)) };

        header
            .consumer_tail
            .store(tail.wrapping_add(1), Ordering::Release);
        Some(record)
    }

    /// Records currently in the queue.
    pub fn depth(&self) -> u64 {
        let header = self.header();
        let head = header.producer_head.load(Ordering::Acquire);
        let tail = header.consumer_tail.load(Ordering::Acquire);
        head.wrapping_sub(tail)
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        QUEUE_CAPACITY
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.depth() == 0
    }

    #[inline]
    pub fn is_full(&self) -> bool {
        self.depth() >= QUEUE_CAPACITY as u64
    }

    /// Synchronizes the mapping to the backing file.
    pub fn flush(&self) -> Result<(), QueueError> {
        self.map.flush()?;
        Ok(())
    }

    /// Flushes, unlocks, unmaps, and closes the file.
    pub fn close(mut self) -> Result<(), QueueError> {
        self.release()
    }

    fn release(&mut self) -> Result<(), QueueError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.map.flush()?;
        if self.locked {
            unsafe { libc::munlock(self.base.cast(), Self::TOTAL_SIZE) };
            self.locked = false;
        }
        Ok(())
    }
}

impl<T: ShmRecord> Drop for RingQueue<T> {
    fn drop(&mut self) {
        let _ = self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::CancelOrder;

    #[test]
    fn enqueue_dequeue_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let queue = RingQueue::<CancelOrder>::create(dir.path().join("cancels")).unwrap();

        assert!(queue.is_empty());
        queue.enqueue(CancelOrder::new(1, 7, 3)).unwrap();
        queue.enqueue(CancelOrder::new(2, 7, 3)).unwrap();
        assert_eq!(queue.depth(), 2);

        assert_eq!(queue.dequeue(), Some(CancelOrder::new(1, 7, 3)));
        assert_eq!(queue.dequeue(), Some(CancelOrder::new(2, 7, 3)));
        assert_eq!(queue.dequeue(), None);
    }

    #[test]
    fn create_truncates_stale_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cancels");
        std::fs::write(&path, b"stale").unwrap();

        let queue = RingQueue::<CancelOrder>::create(&path).unwrap();
        assert_eq!(
            std::fs::metadata(&path).unwrap().len(),
            RingQueue::<CancelOrder>::TOTAL_SIZE as u64
        );
        queue.close().unwrap();
    }

    #[test]
    fn open_rejects_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = RingQueue::<CancelOrder>::open(dir.path().join("absent")).unwrap_err();
        assert!(matches!(err, QueueError::Io(_)));
    }
}
