//! Notification stream - typed lifecycle events and sink adapters.
//!
//! The engine emits a [`Notification`] for every OPEN, FILLED/PARTIALLY
//! FILLED, CANCELLED, MODIFIED and REJECTED transition. Sinks decide what
//! to do with them: [`ConsoleSink`] renders the classic pipe-separated
//! line through `tracing`, [`MemorySink`] collects them for inspection,
//! and the runtime's ledger sink keeps share accounting in step.

use crate::order::{OrderId, OrderType, Price, Quantity, Side, UserId};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Why an order was rejected.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum RejectReason {
    /// Market order with nothing on the opposite side; `missing` names
    /// the empty book.
    NoLiquidity { missing: Side },
    /// Modify whose underlying cancel did not succeed.
    ModifyFailed,
    /// Limit order with a zero price.
    InvalidPrice,
    /// Order with a zero quantity.
    InvalidQuantity,
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectReason::NoLiquidity { missing: Side::Bid } => {
                write!(f, "NO MARKET LIQUIDITY (BIDS)")
            }
            RejectReason::NoLiquidity { missing: Side::Ask } => {
                write!(f, "NO MARKET LIQUIDITY (ASKS)")
            }
            RejectReason::ModifyFailed => write!(f, "MODIFY FAILED: COULD NOT CANCEL ORDER"),
            RejectReason::InvalidPrice => write!(f, "INVALID PRICE"),
            RejectReason::InvalidQuantity => write!(f, "INVALID QUANTITY"),
        }
    }
}

/// Which lifecycle transition a notification reports.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum NotificationKind {
    /// Order entered a book.
    Open,
    /// Order traded; `remaining == 0` means fully filled.
    Fill { remaining: Quantity },
    /// Order was cancelled.
    Cancelled,
    /// Order was rewritten in place by a modify.
    Modified,
    /// Order was rejected.
    Rejected(RejectReason),
}

/// One lifecycle event.
///
/// `qty` is the fill quantity for [`NotificationKind::Fill`] and the
/// order's remaining quantity for every other kind.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub symbol: String,
    pub kind: NotificationKind,
    pub order_id: OrderId,
    pub user_id: UserId,
    pub side: Side,
    pub order_type: OrderType,
    pub price: Price,
    pub qty: Quantity,
    pub timestamp: DateTime<Utc>,
}

/// Receives every notification an engine emits.
///
/// Sinks are shared across worker threads, so implementations use
/// interior mutability and must be cheap: they run inside the matching
/// path.
pub trait NotificationSink: Send + Sync {
    fn publish(&self, notification: &Notification);
}

/// Renders notifications as log lines via `tracing`.
#[derive(Debug, Default)]
pub struct ConsoleSink;

impl ConsoleSink {
    fn label(kind: NotificationKind) -> String {
        match kind {
            NotificationKind::Open => "OPEN".to_string(),
            NotificationKind::Fill { remaining: 0 } => "FILLED".to_string(),
            NotificationKind::Fill { .. } => "PARTIALLY FILLED".to_string(),
            NotificationKind::Cancelled => "CANCELED".to_string(),
            NotificationKind::Modified => "MODIFIED".to_string(),
            NotificationKind::Rejected(reason) => format!("REJECTED: {reason}"),
        }
    }
}

impl NotificationSink for ConsoleSink {
    fn publish(&self, n: &Notification) {
        tracing::info!(
            target: "batchbook::notifications",
            "[{}] | [{}] | TYPE: {} | ID: {} | SIDE: {} | QTY: {} | PRICE: {} | TIME: {}",
            n.symbol,
            Self::label(n.kind),
            n.order_type,
            n.order_id,
            n.side,
            n.qty,
            n.price,
            n.timestamp.timestamp(),
        );
    }
}

/// Collects notifications in memory. Handy for tests and strategies that
/// want to replay the event stream.
#[derive(Debug, Default)]
pub struct MemorySink {
    events: Mutex<Vec<Notification>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of everything published so far.
    pub fn snapshot(&self) -> Vec<Notification> {
        self.events.lock().clone()
    }

    /// Take everything published so far, leaving the sink empty.
    pub fn drain(&self) -> Vec<Notification> {
        std::mem::take(&mut *self.events.lock())
    }

    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }
}

impl NotificationSink for MemorySink {
    fn publish(&self, notification: &Notification) {
        self.events.lock().push(notification.clone());
    }
}
