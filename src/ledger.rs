//! Position ledger - who holds what, and how much of it is spoken for.
//!
//! Share-sufficiency checks run against `held - committed`: `held` moves
//! on fills (buys credit, sells debit) and on the IPO grant at
//! registration; `committed` tracks quantity locked in open asks. The
//! ledger is driven by the notification stream through [`LedgerSink`], so
//! every mutation happens on the worker that owns the symbol.

use crate::events::{Notification, NotificationKind, NotificationSink};
use crate::order::{Quantity, Side, UserId};
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use std::sync::Arc;

/// One user's stake in one symbol.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Holding {
    /// Shares owned.
    pub held: Quantity,
    /// Shares locked in open ask orders.
    pub committed: Quantity,
}

impl Holding {
    /// Shares free to be listed for sale.
    #[inline]
    pub fn available(&self) -> Quantity {
        self.held.saturating_sub(self.committed)
    }
}

/// Per-user, per-symbol share accounting.
#[derive(Debug, Default)]
pub struct PositionLedger {
    holdings: FxHashMap<UserId, FxHashMap<String, Holding>>,
}

impl PositionLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Grant shares outright (the IPO holder's initial allotment).
    pub fn credit(&mut self, user_id: UserId, symbol: &str, qty: Quantity) {
        self.slot(user_id, symbol).held += qty;
    }

    /// The user's stake in `symbol`.
    pub fn holding(&self, user_id: UserId, symbol: &str) -> Holding {
        self.holdings
            .get(&user_id)
            .and_then(|per_user| per_user.get(symbol))
            .copied()
            .unwrap_or_default()
    }

    /// Shares the user could list for sale right now.
    pub fn available(&self, user_id: UserId, symbol: &str) -> Quantity {
        self.holding(user_id, symbol).available()
    }

    /// True when the user can cover an ask of `qty` shares.
    /// Monotonic in `qty` for a fixed user and symbol.
    pub fn has_sufficient(&self, user_id: UserId, symbol: &str, qty: Quantity) -> bool {
        self.available(user_id, symbol) >= qty
    }

    /// Fold one lifecycle event into the ledger.
    pub fn apply(&mut self, n: &Notification) {
        match (n.kind, n.side) {
            // An open or re-opened ask locks its quantity.
            (NotificationKind::Open, Side::Ask) | (NotificationKind::Modified, Side::Ask) => {
                self.slot(n.user_id, &n.symbol).committed += n.qty;
            }
            // Cancelling an ask releases whatever was still resting.
            (NotificationKind::Cancelled, Side::Ask) => {
                let slot = self.slot(n.user_id, &n.symbol);
                slot.committed = slot.committed.saturating_sub(n.qty);
            }
            // A sell consumes held and committed shares alike.
            (NotificationKind::Fill { .. }, Side::Ask) => {
                let slot = self.slot(n.user_id, &n.symbol);
                slot.held = slot.held.saturating_sub(n.qty);
                slot.committed = slot.committed.saturating_sub(n.qty);
            }
            // A buy delivers shares.
            (NotificationKind::Fill { .. }, Side::Bid) => {
                self.slot(n.user_id, &n.symbol).held += n.qty;
            }
            _ => {}
        }
    }

    /// Forget a symbol for every user (unregistration).
    pub fn remove_symbol(&mut self, symbol: &str) {
        for per_user in self.holdings.values_mut() {
            per_user.remove(symbol);
        }
    }

    pub fn clear(&mut self) {
        self.holdings.clear();
    }

    fn slot(&mut self, user_id: UserId, symbol: &str) -> &mut Holding {
        self.holdings
            .entry(user_id)
            .or_default()
            .entry(symbol.to_string())
            .or_default()
    }
}

/// Sink adapter that applies every notification to a shared ledger.
pub struct LedgerSink {
    ledger: Arc<RwLock<PositionLedger>>,
}

impl LedgerSink {
    pub fn new(ledger: Arc<RwLock<PositionLedger>>) -> Self {
        Self { ledger }
    }
}

impl NotificationSink for LedgerSink {
    fn publish(&self, notification: &Notification) {
        self.ledger.write().apply(notification);
    }
}
