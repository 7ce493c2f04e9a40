//! Core order types shared by the engine, scheduler and runtime.
//!
//! Prices and quantities are fixed-point integers: a `Price` is a count
//! of ticks and a `Quantity` a count of units. Integer keys keep price
//! level lookups exact (no float tolerance) and hash cleanly.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// External order identifier, unique within a symbol.
pub type OrderId = u32;

/// Sentinel for "no order" / rejected submissions.
pub const INVALID_ORDER_ID: OrderId = OrderId::MAX;

/// Monotonic counter used for time priority. Assigned when an order is
/// created and regenerated when it is modified, so a modified order goes
/// to the back of the queue at its new price.
pub type Sequence = u32;

/// Trading participant identifier.
pub type UserId = u32;

/// Reserved user that owns the initial ask posted at registration.
pub const IPO_HOLDER: UserId = 0;

/// Fixed-point price in ticks. Positive for resting orders.
pub type Price = u64;

/// Fixed-point quantity in units.
pub type Quantity = u64;

/// Order side (bid = buy, ask = sell)
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Side {
    /// Buy side (bids)
    Bid = 0,
    /// Sell side (asks)
    Ask = 1,
}

impl Side {
    /// Returns the opposite side
    #[inline]
    pub const fn opposite(self) -> Self {
        match self {
            Side::Bid => Side::Ask,
            Side::Ask => Side::Bid,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Bid => write!(f, "BUY"),
            Side::Ask => write!(f, "SELL"),
        }
    }
}

/// Order type determines pricing behavior at placement.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
#[repr(u8)]
pub enum OrderType {
    /// Limit order - rests in the book at its (possibly adjusted) price.
    #[default]
    Limit = 0,
    /// Market order - priced at the opposite best, rejected when the
    /// opposite book is empty.
    Market = 1,
}

impl fmt::Display for OrderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderType::Limit => write!(f, "LIMIT"),
            OrderType::Market => write!(f, "MARKET"),
        }
    }
}

/// Order lifecycle status.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum OrderStatus {
    /// Resident in exactly one price level.
    Open = 0,
    /// Quantity reached zero through matching.
    Filled = 1,
    /// Removed from its level by a cancel.
    Cancelled = 2,
    /// Never entered a book.
    Rejected = 3,
}

impl OrderStatus {
    /// Terminal statuses never transition again.
    #[inline]
    pub const fn is_terminal(self) -> bool {
        !matches!(self, OrderStatus::Open)
    }
}

/// A single order record.
///
/// Records are retained in the engine arena after reaching a terminal
/// status so post-hoc queries can still resolve the id.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct OrderInfo {
    pub id: OrderId,
    pub user_id: UserId,
    pub side: Side,
    pub kind: OrderType,
    pub status: OrderStatus,
    /// Resting price; set from the opposite best for market orders and
    /// crossing limits.
    pub price: Price,
    /// Remaining quantity; zero exactly when the order is FILLED.
    pub qty: Quantity,
    pub sequence: Sequence,
    pub created_at: DateTime<Utc>,
}

impl OrderInfo {
    /// Create a new OPEN order. The initial sequence equals the id.
    pub fn new(
        id: OrderId,
        user_id: UserId,
        side: Side,
        kind: OrderType,
        price: Price,
        qty: Quantity,
    ) -> Self {
        Self {
            id,
            user_id,
            side,
            kind,
            status: OrderStatus::Open,
            price,
            qty,
            sequence: id,
            created_at: Utc::now(),
        }
    }
}
