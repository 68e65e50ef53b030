//! Fixed-layout records carried by the shared-memory queues.
//!
//! Every record is `#[repr(C)]` POD with explicit trailing padding so that
//! field offsets and struct sizes match the peer engine byte-for-byte.
//! Field order is u64 → u32 → u8 → pad, padded to a natural stride. All
//! integers are host-endian; the per-queue magic word doubles as an
//! endianness sentinel when a file crosses machines.

use serde::Serialize;

/// Marker for types that may live in a [`RingQueue`](crate::RingQueue) slot.
///
/// `MAGIC` is the 32-bit constant stored at offset 128 of the queue header;
/// opening a file whose magic differs is refused.
pub trait ShmRecord: Copy + Send + 'static {
    const MAGIC: u32;
}

/// Order side values for [`Order::side`].
pub mod side {
    pub const BUY: u8 = 0;
    pub const SELL: u8 = 1;
}

/// Order status values for [`Order::status`].
pub mod order_status {
    pub const PENDING: u8 = 0;
    pub const FILLED: u8 = 1;
    pub const REJECTED: u8 = 2;
}

/// Order type values for [`Order::order_type`].
pub mod order_type {
    pub const LIMIT: u8 = 0;
    pub const MARKET: u8 = 1;
}

/// Event kind values for [`OrderEvent::event_kind`]. Anything above
/// [`event_kind::MAX`] is a decode anomaly and must be skipped by consumers.
pub mod event_kind {
    pub const ACCEPTED: u32 = 0;
    pub const PARTIALLY_FILLED: u32 = 1;
    pub const FILLED: u32 = 2;
    pub const CANCELED: u32 = 3;
    pub const REJECTED: u32 = 4;
    pub const MAX: u32 = REJECTED;
}

/// Query type values for [`Query::query_type`].
pub mod query_type {
    pub const BALANCE: u32 = 0;
    pub const HOLDINGS: u32 = 1;
}

/// Number of symbols tracked per user in [`UserHoldings`].
pub const MAX_SYMBOLS: usize = 100;

/// A new order submitted by a client, 48 bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(C)]
pub struct Order {
    pub order_id: u64,
    pub price: u64,
    pub timestamp: u64,
    pub user_id: u64,
    pub quantity: u32,
    pub symbol: u32,
    pub side: u8,
    pub status: u8,
    pub order_type: u8,
    pub _pad: [u8; 5],
}

impl Order {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        order_id: u64,
        price: u64,
        timestamp: u64,
        user_id: u64,
        quantity: u32,
        symbol: u32,
        side: u8,
        order_type: u8,
    ) -> Self {
        Self {
            order_id,
            price,
            timestamp,
            user_id,
            quantity,
            symbol,
            side,
            status: order_status::PENDING,
            order_type,
            _pad: [0; 5],
        }
    }
}

impl ShmRecord for Order {
    const MAGIC: u32 = 0xDEAD_BEEF;
}

/// A cancel request for a resting order, 24 bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(C)]
pub struct CancelOrder {
    pub order_id: u64,
    pub user_id: u64,
    pub symbol: u32,
    pub _pad: [u8; 4],
}

impl CancelOrder {
    pub fn new(order_id: u64, user_id: u64, symbol: u32) -> Self {
        Self {
            order_id,
            user_id,
            symbol,
            _pad: [0; 4],
        }
    }
}

impl ShmRecord for CancelOrder {
    const MAGIC: u32 = 0x00CA_CECE;
}

/// An execution/lifecycle event emitted by the engine, 40 bytes.
///
/// Serializes with PascalCase field names so the websocket frames match the
/// peer implementation's JSON marshaling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
#[repr(C)]
pub struct OrderEvent {
    pub user_id: u64,
    pub order_id: u64,
    pub symbol: u32,
    pub event_kind: u32,
    pub filled_qty: u32,
    pub remaining_qty: u32,
    pub original_qty: u32,
    pub error_code: u32,
}

impl OrderEvent {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        user_id: u64,
        order_id: u64,
        symbol: u32,
        event_kind: u32,
        filled_qty: u32,
        remaining_qty: u32,
        original_qty: u32,
        error_code: u32,
    ) -> Self {
        Self {
            user_id,
            order_id,
            symbol,
            event_kind,
            filled_qty,
            remaining_qty,
            original_qty,
            error_code,
        }
    }
}

impl ShmRecord for OrderEvent {
    const MAGIC: u32 = 0xEAAA_AAAC;
}

/// A balance/holdings query from a client, 24 bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(C)]
pub struct Query {
    pub query_id: u64,
    pub user_id: u64,
    pub query_type: u32,
    pub _pad: [u8; 4],
}

impl Query {
    pub fn new(query_id: u64, user_id: u64, query_type: u32) -> Self {
        Self {
            query_id,
            user_id,
            query_type,
            _pad: [0; 4],
        }
    }
}

impl ShmRecord for Query {
    const MAGIC: u32 = 0x5155_4552;
}

/// Per-user balance snapshot embedded in [`BalanceResponse`], 64 bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(C)]
pub struct UserBalance {
    pub user_id: u64,
    pub available_balance: u64,
    pub reserved_balance: u64,
    pub total_traded_today: u64,
    pub order_count_today: u64,
    pub _pad: [u8; 24],
}

/// Engine response to a balance query, 128 bytes. The embedded balance is
/// aligned to offset 64 so the snapshot sits on its own cache line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(C)]
pub struct BalanceResponse {
    pub query_id: u64,
    pub user_id: u64,
    pub response_type: u8,
    pub _pad: [u8; 47],
    pub balance: UserBalance,
}

impl ShmRecord for BalanceResponse {
    const MAGIC: u32 = 0xDEAD_BEEF;
}

/// Per-user holdings snapshot embedded in [`HoldingResponse`], 808 bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(C)]
pub struct UserHoldings {
    pub user_id: u64,
    pub available_holdings: [u32; MAX_SYMBOLS],
    pub reserved_holdings: [u32; MAX_SYMBOLS],
}

/// Engine response to a holdings query, 824 bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(C)]
pub struct HoldingResponse {
    pub query_id: u64,
    pub user_id: u64,
    pub holdings: UserHoldings,
}

impl ShmRecord for HoldingResponse {
    const MAGIC: u32 = 0xCECA_EAAC;
}

// Layout is a cross-process contract; any drift is a build error.
const _: () = assert!(std::mem::size_of::<Order>() == 48);
const _: () = assert!(std::mem::size_of::<CancelOrder>() == 24);
const _: () = assert!(std::mem::size_of::<OrderEvent>() == 40);
const _: () = assert!(std::mem::size_of::<Query>() == 24);
const _: () = assert!(std::mem::size_of::<UserBalance>() == 64);
const _: () = assert!(std::mem::size_of::<BalanceResponse>() == 128);
const _: () = assert!(std::mem::size_of::<UserHoldings>() == 808);
const _: () = assert!(std::mem::size_of::<HoldingResponse>() == 824);
