//! SPSC ring-buffer queues over memory-mapped files.
//!
//! The IPC primitive between the edge gateway and the co-located matching
//! engine: six fixed-layout queues, each a single-producer single-consumer
//! ring over an mmap'd file with a versionless 136-byte header (two
//! cache-line-isolated counters, a magic word, a capacity word). The layout
//! is a byte-for-byte contract with the peer process; see [`records`] and
//! [`layout`].
//!
//! # Example
//!
//! ```no_run
//! use shmring::{CancelOrder, CancelOrderQueue, QueueError};
//!
//! fn main() -> Result<(), QueueError> {
//!     let queue = CancelOrderQueue::open("/tmp/trading/CancelOrders")?;
//!     queue.enqueue(CancelOrder::new(42, 7, 1))?;
//!     Ok(())
//! }
//! ```

mod backoff;
mod error;
mod layout;
mod queue;
mod records;

pub use backoff::Backoff;
pub use error::QueueError;
pub use layout::{HEADER_SIZE, QUEUE_CAPACITY};
pub use queue::RingQueue;
pub use records::{
    event_kind, order_status, order_type, query_type, side, BalanceResponse, CancelOrder,
    HoldingResponse, Order, OrderEvent, Query, ShmRecord, UserBalance, UserHoldings, MAX_SYMBOLS,
};

/// The six queues shared with the matching engine.
pub type PostOrderQueue = RingQueue<Order>;
pub type CancelOrderQueue = RingQueue<CancelOrder>;
pub type OrderEventQueue = RingQueue<OrderEvent>;
pub type QueryQueue = RingQueue<Query>;
pub type BalanceResponseQueue = RingQueue<BalanceResponse>;
pub type HoldingResponseQueue = RingQueue<HoldingResponse>;
