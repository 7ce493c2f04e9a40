//! Matching engine - per-symbol order book with price-time priority.
//!
//! One engine owns both sides of a symbol's book, the order table and the
//! order arena. Exactly one scheduler worker drives a given engine, so
//! the engine itself is single-threaded; the runtime wraps it in a mutex
//! only to let client-side queries read between batches.
//!
//! ## Matching model
//!
//! Matching runs after a placement or modify (when `auto_match` is on)
//! and drives exclusively from the most recently mutated order. A
//! crossing limit is repriced to the opposite best before insertion, so
//! an aggressive order consumes the current best level rather than
//! sweeping through several.

use crate::arena::{Arena, ArenaIndex};
use crate::book::BookSide;
use crate::events::{Notification, NotificationKind, NotificationSink, RejectReason};
use crate::order::{
    OrderId, OrderInfo, OrderStatus, OrderType, Price, Quantity, Sequence, Side, UserId,
};
use chrono::Utc;
use rustc_hash::FxHashMap;
use std::sync::Arc;

/// Per-symbol matching engine.
pub struct OrderEngine {
    symbol: Arc<str>,
    orders: Arena<OrderInfo>,
    order_table: FxHashMap<OrderId, ArenaIndex>,
    bids: BookSide,
    asks: BookSide,
    next_sequence: Sequence,
    recent_order_id: Option<OrderId>,
    last_trade_price: Option<Price>,
    trade_count: u64,
    auto_match: bool,
    sinks: Vec<Arc<dyn NotificationSink>>,
}

impl OrderEngine {
    /// Create an engine for `symbol` with room for `capacity` order
    /// records over its lifetime (terminal records are retained for
    /// post-hoc queries).
    pub fn new(
        symbol: &str,
        capacity: u32,
        auto_match: bool,
        sinks: Vec<Arc<dyn NotificationSink>>,
    ) -> Self {
        Self {
            symbol: Arc::from(symbol),
            orders: Arena::new(capacity),
            order_table: FxHashMap::default(),
            bids: BookSide::new(Side::Bid),
            asks: BookSide::new(Side::Ask),
            next_sequence: 0,
            recent_order_id: None,
            last_trade_price: None,
            trade_count: 0,
            auto_match,
            sinks,
        }
    }

    // ========================================================================
    // Order entry
    // ========================================================================

    /// Place an order.
    ///
    /// Assigns the next order id, records the order (REJECTED orders are
    /// recorded too), inserts it into its side's book at its possibly
    /// adjusted price, emits an OPEN notification and, when `auto_match`
    /// is on, runs the matching loop.
    ///
    /// Returns `None` on rejection.
    pub fn place_order(
        &mut self,
        user_id: UserId,
        side: Side,
        kind: OrderType,
        price: Price,
        qty: Quantity,
    ) -> Option<OrderId> {
        let id = self.next_sequence;
        self.next_sequence += 1;

        let order = OrderInfo::new(id, user_id, side, kind, price, qty);
        let Some(slot) = self.orders.insert(order) else {
            tracing::error!(symbol = %self.symbol, "order arena exhausted");
            return None;
        };
        self.order_table.insert(id, slot);

        if qty == 0 {
            return self.reject(id, RejectReason::InvalidQuantity);
        }

        let final_price = match kind {
            OrderType::Limit => {
                if price == 0 {
                    return self.reject(id, RejectReason::InvalidPrice);
                }
                self.adjusted_price(side, price)
            }
            OrderType::Market => {
                let opposite_best = match side {
                    Side::Ask => self.bids.best(),
                    Side::Bid => self.asks.best(),
                };
                match opposite_best {
                    Some(best) => best,
                    None => {
                        return self.reject(
                            id,
                            RejectReason::NoLiquidity {
                                missing: side.opposite(),
                            },
                        )
                    }
                }
            }
        };

        if let Some(order) = self.order_record_mut(id) {
            order.price = final_price;
        }

        self.book_mut(side).insert(final_price, id, id);

        if let Some(order) = self.order_record(id).copied() {
            self.emit(NotificationKind::Open, &order, order.qty);
        }
        self.recent_order_id = Some(id);

        if self.auto_match {
            self.run_matching();
        }

        Some(id)
    }

    /// Cancel a resting limit order.
    ///
    /// Returns false (with no state change) when the order does not
    /// exist, is not OPEN or is not a limit order.
    pub fn cancel_order(&mut self, id: OrderId) -> bool {
        let Some(order) = self.order_record(id).copied() else {
            return false;
        };
        if order.status != OrderStatus::Open || order.kind != OrderType::Limit {
            return false;
        }

        let removed = self
            .book_mut(order.side)
            .remove_entry(order.price, order.sequence, id);
        if !removed {
            debug_assert!(removed, "open order missing from its price level");
            tracing::error!(symbol = %self.symbol, order_id = id, "open order missing from its price level");
        }

        if let Some(order) = self.order_record_mut(id) {
            order.status = OrderStatus::Cancelled;
        }
        if let Some(order) = self.order_record(id).copied() {
            self.emit(NotificationKind::Cancelled, &order, order.qty);
        }
        true
    }

    /// Modify an order in place: cancel, then re-insert under the same id
    /// with a fresh sequence, so the order loses its queue position.
    ///
    /// Returns `None` when the cancel fails; a MODIFY FAILED rejection is
    /// emitted if the order at least exists.
    pub fn edit_order(
        &mut self,
        id: OrderId,
        side: Side,
        price: Price,
        qty: Quantity,
    ) -> Option<OrderId> {
        if !self.cancel_order(id) {
            if let Some(order) = self.order_record(id).copied() {
                self.emit(
                    NotificationKind::Rejected(RejectReason::ModifyFailed),
                    &order,
                    order.qty,
                );
            }
            return None;
        }

        let sequence = self.next_sequence;
        self.next_sequence += 1;
        let final_price = self.adjusted_price(side, price);

        let Some(order) = self.order_record_mut(id) else {
            debug_assert!(false, "cancelled order vanished during modify");
            tracing::error!(symbol = %self.symbol, order_id = id, "cancelled order vanished during modify");
            return None;
        };
        order.side = side;
        order.kind = OrderType::Limit;
        order.price = final_price;
        order.qty = qty;
        order.sequence = sequence;
        order.status = OrderStatus::Open;
        order.created_at = Utc::now();
        let snapshot = *order;

        self.book_mut(side).insert(final_price, sequence, id);
        self.emit(NotificationKind::Modified, &snapshot, snapshot.qty);
        self.recent_order_id = Some(id);

        if self.auto_match {
            self.run_matching();
        }

        Some(id)
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// Look up an order by id, terminal statuses included.
    #[inline]
    pub fn get_order(&self, id: OrderId) -> Option<&OrderInfo> {
        self.order_record(id)
    }

    /// Highest resting bid price.
    #[inline]
    pub fn best_bid(&self) -> Option<Price> {
        self.bids.best()
    }

    /// Lowest resting ask price.
    #[inline]
    pub fn best_ask(&self) -> Option<Price> {
        self.asks.best()
    }

    /// Price of the most recent trade.
    #[inline]
    pub fn market_price(&self) -> Option<Price> {
        self.last_trade_price
    }

    /// Monotonic count of executed trades.
    #[inline]
    pub fn num_trades(&self) -> u64 {
        self.trade_count
    }

    /// All orders currently carrying `status`. O(n) over the order table.
    pub fn orders_by_status(&self, status: OrderStatus) -> Vec<OrderInfo> {
        self.order_table
            .values()
            .filter_map(|&slot| self.orders.get(slot))
            .filter(|order| order.status == status)
            .copied()
            .collect()
    }

    /// Up to `depth` `(price, aggregate open quantity)` pairs for `side`,
    /// best price first. Does not mutate the book; the price heap is
    /// cloned for traversal.
    pub fn market_depth(&self, side: Side, depth: usize) -> Vec<(Price, Quantity)> {
        let book = self.book(side);
        let mut prices = book.prices_snapshot();
        let mut result = Vec::with_capacity(depth.min(prices.len()));

        while result.len() < depth {
            let Some(price) = prices.pop() else {
                break;
            };
            let total: Quantity = book
                .level(price)
                .map(|level| {
                    level
                        .entries()
                        .filter_map(|&(_, order_id)| self.order_record(order_id))
                        .map(|order| order.qty)
                        .sum()
                })
                .unwrap_or(0);
            result.push((price, total));
        }

        result
    }

    /// Toggle the automatic matching pass after placement/modify.
    #[inline]
    pub fn set_auto_match(&mut self, auto_match: bool) {
        self.auto_match = auto_match;
    }

    #[inline]
    pub fn get_auto_match(&self) -> bool {
        self.auto_match
    }

    #[inline]
    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    /// Number of order records ever created (terminal ones included).
    #[inline]
    pub fn order_count(&self) -> usize {
        self.order_table.len()
    }

    // ========================================================================
    // Matching
    // ========================================================================

    /// Match from the most recently mutated order until it is terminal or
    /// no longer crosses the opposite best.
    fn run_matching(&mut self) {
        let Some(recent_id) = self.recent_order_id else {
            return;
        };

        loop {
            let Some(recent) = self.order_record(recent_id).copied() else {
                return;
            };
            if recent.status != OrderStatus::Open || recent.qty == 0 {
                return;
            }

            let (Some(best_ask), Some(best_bid)) = (self.asks.best(), self.bids.best()) else {
                return;
            };

            let can_trade = match recent.side {
                Side::Ask => best_bid >= recent.price,
                Side::Bid => best_ask <= recent.price,
            };
            if !can_trade {
                return;
            }

            let (Some((_, ask_id)), Some((_, bid_id))) =
                (self.asks.front_of(best_ask), self.bids.front_of(best_bid))
            else {
                debug_assert!(false, "book price with no level entries");
                tracing::error!(symbol = %self.symbol, "book price with no level entries");
                return;
            };

            let (Some(ask), Some(bid)) = (
                self.order_record(ask_id).copied(),
                self.order_record(bid_id).copied(),
            ) else {
                debug_assert!(false, "resting order missing from order table");
                tracing::error!(symbol = %self.symbol, "resting order missing from order table");
                return;
            };

            let fill_qty = ask.qty.min(bid.qty);
            // Execution happens at the passive (resting, non-recent)
            // side's price.
            let trade_price = match recent.side {
                Side::Ask => bid.price,
                Side::Bid => ask.price,
            };

            let mut ask_filled = false;
            if let Some(order) = self.order_record_mut(ask_id) {
                order.qty -= fill_qty;
                if order.qty == 0 {
                    order.status = OrderStatus::Filled;
                    ask_filled = true;
                }
            }
            let mut bid_filled = false;
            if let Some(order) = self.order_record_mut(bid_id) {
                order.qty -= fill_qty;
                if order.qty == 0 {
                    order.status = OrderStatus::Filled;
                    bid_filled = true;
                }
            }

            self.last_trade_price = Some(trade_price);
            self.trade_count += 1;

            // Notify after the status transitions so sinks observe the
            // final state of both participants.
            if let Some(order) = self.order_record(ask_id).copied() {
                self.emit(NotificationKind::Fill { remaining: order.qty }, &order, fill_qty);
            }
            if let Some(order) = self.order_record(bid_id).copied() {
                self.emit(NotificationKind::Fill { remaining: order.qty }, &order, fill_qty);
            }

            if ask_filled {
                self.asks.pop_front_of(best_ask);
            }
            if bid_filled {
                self.bids.pop_front_of(best_bid);
            }
        }
    }

    // ========================================================================
    // Internals
    // ========================================================================

    /// Reprice a crossing limit to the opposite best: an ask below the
    /// best bid sells at the best bid, a bid above the best ask buys at
    /// the best ask.
    fn adjusted_price(&self, side: Side, price: Price) -> Price {
        match side {
            Side::Ask => match self.bids.best() {
                Some(best_bid) if price < best_bid => best_bid,
                _ => price,
            },
            Side::Bid => match self.asks.best() {
                Some(best_ask) if price > best_ask => best_ask,
                _ => price,
            },
        }
    }

    fn reject(&mut self, id: OrderId, reason: RejectReason) -> Option<OrderId> {
        if let Some(order) = self.order_record_mut(id) {
            order.status = OrderStatus::Rejected;
        }
        if let Some(order) = self.order_record(id).copied() {
            self.emit(NotificationKind::Rejected(reason), &order, order.qty);
        }
        None
    }

    #[inline]
    fn order_record(&self, id: OrderId) -> Option<&OrderInfo> {
        self.orders.get(*self.order_table.get(&id)?)
    }

    #[inline]
    fn order_record_mut(&mut self, id: OrderId) -> Option<&mut OrderInfo> {
        let slot = *self.order_table.get(&id)?;
        self.orders.get_mut(slot)
    }

    #[inline]
    fn book(&self, side: Side) -> &BookSide {
        match side {
            Side::Bid => &self.bids,
            Side::Ask => &self.asks,
        }
    }

    #[inline]
    fn book_mut(&mut self, side: Side) -> &mut BookSide {
        match side {
            Side::Bid => &mut self.bids,
            Side::Ask => &mut self.asks,
        }
    }

    fn emit(&self, kind: NotificationKind, order: &OrderInfo, qty: Quantity) {
        if self.sinks.is_empty() {
            return;
        }
        let notification = Notification {
            symbol: self.symbol.to_string(),
            kind,
            order_id: order.id,
            user_id: order.user_id,
            side: order.side,
            order_type: order.kind,
            price: order.price,
            qty,
            timestamp: Utc::now(),
        };
        for sink in &self.sinks {
            sink.publish(&notification);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::MemorySink;

    fn engine() -> OrderEngine {
        OrderEngine::new("TEST", 10_000, true, Vec::new())
    }

    fn engine_with_sink() -> (OrderEngine, Arc<MemorySink>) {
        let sink = Arc::new(MemorySink::new());
        let engine = OrderEngine::new("TEST", 10_000, true, vec![sink.clone()]);
        (engine, sink)
    }

    #[test]
    fn test_place_bid_no_match() {
        let mut engine = engine();

        let id = engine
            .place_order(1, Side::Bid, OrderType::Limit, 10_000, 100)
            .unwrap();

        assert_eq!(engine.best_bid(), Some(10_000));
        assert_eq!(engine.best_ask(), None);
        let order = engine.get_order(id).unwrap();
        assert_eq!(order.status, OrderStatus::Open);
        assert_eq!(order.qty, 100);
    }

    #[test]
    fn test_full_match() {
        let mut engine = engine();

        let ask = engine
            .place_order(1, Side::Ask, OrderType::Limit, 10_000, 100)
            .unwrap();
        let bid = engine
            .place_order(2, Side::Bid, OrderType::Limit, 10_000, 100)
            .unwrap();

        assert_eq!(engine.get_order(ask).unwrap().status, OrderStatus::Filled);
        assert_eq!(engine.get_order(bid).unwrap().status, OrderStatus::Filled);
        assert_eq!(engine.best_bid(), None);
        assert_eq!(engine.best_ask(), None);
        assert_eq!(engine.num_trades(), 1);
        assert_eq!(engine.market_price(), Some(10_000));
    }

    #[test]
    fn test_partial_fill_smaller_side_filled() {
        let mut engine = engine();

        let ask = engine
            .place_order(1, Side::Ask, OrderType::Limit, 10_000, 100)
            .unwrap();
        let bid = engine
            .place_order(2, Side::Bid, OrderType::Limit, 10_000, 30)
            .unwrap();

        assert_eq!(engine.get_order(bid).unwrap().status, OrderStatus::Filled);
        let resting = engine.get_order(ask).unwrap();
        assert_eq!(resting.status, OrderStatus::Open);
        assert_eq!(resting.qty, 70);
        assert_eq!(engine.best_ask(), Some(10_000));
    }

    #[test]
    fn test_crossing_bid_repriced_to_best_ask() {
        let mut engine = engine();

        engine
            .place_order(1, Side::Ask, OrderType::Limit, 10_000, 50)
            .unwrap();
        // Bid above the best ask is repriced down to it and matches.
        let bid = engine
            .place_order(2, Side::Bid, OrderType::Limit, 10_500, 50)
            .unwrap();

        let order = engine.get_order(bid).unwrap();
        assert_eq!(order.price, 10_000);
        assert_eq!(order.status, OrderStatus::Filled);
        assert_eq!(engine.market_price(), Some(10_000));
    }

    #[test]
    fn test_crossing_ask_repriced_to_best_bid() {
        let mut engine = engine();

        engine
            .place_order(1, Side::Bid, OrderType::Limit, 10_000, 50)
            .unwrap();
        let ask = engine
            .place_order(2, Side::Ask, OrderType::Limit, 9_000, 50)
            .unwrap();

        assert_eq!(engine.get_order(ask).unwrap().price, 10_000);
        assert_eq!(engine.get_order(ask).unwrap().status, OrderStatus::Filled);
    }

    #[test]
    fn test_fifo_priority_within_level() {
        let mut engine = engine();

        let first = engine
            .place_order(1, Side::Ask, OrderType::Limit, 10_000, 100)
            .unwrap();
        let second = engine
            .place_order(2, Side::Ask, OrderType::Limit, 10_000, 100)
            .unwrap();
        let third = engine
            .place_order(3, Side::Ask, OrderType::Limit, 10_000, 100)
            .unwrap();

        engine
            .place_order(4, Side::Bid, OrderType::Limit, 10_000, 200)
            .unwrap();

        assert_eq!(engine.get_order(first).unwrap().status, OrderStatus::Filled);
        assert_eq!(engine.get_order(second).unwrap().status, OrderStatus::Filled);
        let last = engine.get_order(third).unwrap();
        assert_eq!(last.status, OrderStatus::Open);
        assert_eq!(last.qty, 100);
    }

    #[test]
    fn test_market_order_takes_best() {
        let mut engine = engine();

        engine
            .place_order(1, Side::Ask, OrderType::Limit, 10_000, 50)
            .unwrap();
        let market = engine
            .place_order(2, Side::Bid, OrderType::Market, 0, 50)
            .unwrap();

        let order = engine.get_order(market).unwrap();
        assert_eq!(order.price, 10_000);
        assert_eq!(order.status, OrderStatus::Filled);
    }

    #[test]
    fn test_market_order_rejected_on_empty_book() {
        let (mut engine, sink) = engine_with_sink();

        let result = engine.place_order(1, Side::Bid, OrderType::Market, 0, 5);
        assert_eq!(result, None);

        // The record is retained with REJECTED status.
        let rejected = engine.orders_by_status(OrderStatus::Rejected);
        assert_eq!(rejected.len(), 1);

        let events = sink.drain();
        assert_eq!(events.len(), 1);
        assert_eq!(
            events[0].kind,
            NotificationKind::Rejected(RejectReason::NoLiquidity { missing: Side::Ask })
        );
        // Books untouched.
        assert_eq!(engine.best_bid(), None);
        assert_eq!(engine.best_ask(), None);
    }

    #[test]
    fn test_zero_quantity_rejected() {
        let mut engine = engine();
        assert_eq!(engine.place_order(1, Side::Bid, OrderType::Limit, 100, 0), None);
        assert_eq!(engine.orders_by_status(OrderStatus::Rejected).len(), 1);
    }

    #[test]
    fn test_zero_price_limit_rejected() {
        let mut engine = engine();
        assert_eq!(engine.place_order(1, Side::Bid, OrderType::Limit, 0, 10), None);
        assert_eq!(engine.orders_by_status(OrderStatus::Rejected).len(), 1);
    }

    #[test]
    fn test_cancel_updates_best() {
        let mut engine = engine();

        let b1 = engine
            .place_order(1, Side::Bid, OrderType::Limit, 10_000, 10)
            .unwrap();
        engine
            .place_order(1, Side::Bid, OrderType::Limit, 9_900, 20)
            .unwrap();

        assert_eq!(engine.best_bid(), Some(10_000));
        assert!(engine.cancel_order(b1));
        assert_eq!(engine.best_bid(), Some(9_900));
        assert_eq!(engine.get_order(b1).unwrap().status, OrderStatus::Cancelled);
    }

    #[test]
    fn test_cancel_is_not_idempotent() {
        let mut engine = engine();
        let id = engine
            .place_order(1, Side::Bid, OrderType::Limit, 10_000, 10)
            .unwrap();

        assert!(engine.cancel_order(id));
        assert!(!engine.cancel_order(id), "second cancel must fail");
        assert!(!engine.cancel_order(9_999), "unknown order must fail");
    }

    #[test]
    fn test_cancel_market_remainder_fails() {
        let mut engine = engine();

        engine
            .place_order(1, Side::Ask, OrderType::Limit, 10_000, 10)
            .unwrap();
        // Market bid for more than is available rests with MARKET type.
        let market = engine
            .place_order(2, Side::Bid, OrderType::Market, 0, 25)
            .unwrap();

        let order = engine.get_order(market).unwrap();
        assert_eq!(order.status, OrderStatus::Open);
        assert_eq!(order.qty, 15);
        assert!(!engine.cancel_order(market), "market orders cannot be cancelled");
    }

    #[test]
    fn test_edit_moves_to_back_of_queue() {
        let mut engine = engine();

        let first = engine
            .place_order(1, Side::Ask, OrderType::Limit, 10_000, 10)
            .unwrap();
        let second = engine
            .place_order(2, Side::Ask, OrderType::Limit, 10_000, 10)
            .unwrap();

        // Re-submitting the first order at the same price sends it behind
        // the second.
        assert_eq!(engine.edit_order(first, Side::Ask, 10_000, 10), Some(first));

        engine
            .place_order(3, Side::Bid, OrderType::Limit, 10_000, 10)
            .unwrap();

        assert_eq!(engine.get_order(second).unwrap().status, OrderStatus::Filled);
        assert_eq!(engine.get_order(first).unwrap().status, OrderStatus::Open);
    }

    #[test]
    fn test_edit_failure_emits_reject() {
        let (mut engine, sink) = engine_with_sink();

        let id = engine
            .place_order(1, Side::Bid, OrderType::Limit, 10_000, 10)
            .unwrap();
        assert!(engine.cancel_order(id));
        sink.drain();

        // Cancel of a cancelled order fails, so the edit fails.
        assert_eq!(engine.edit_order(id, Side::Bid, 9_000, 5), None);
        let events = sink.drain();
        assert_eq!(events.len(), 1);
        assert_eq!(
            events[0].kind,
            NotificationKind::Rejected(RejectReason::ModifyFailed)
        );

        // Editing an order that never existed emits nothing.
        assert_eq!(engine.edit_order(9_999, Side::Bid, 9_000, 5), None);
        assert!(sink.is_empty());
    }

    #[test]
    fn test_market_depth_aggregates_levels() {
        let mut engine = engine();

        engine.place_order(1, Side::Bid, OrderType::Limit, 10_000, 10).unwrap();
        engine.place_order(1, Side::Bid, OrderType::Limit, 10_000, 15).unwrap();
        engine.place_order(1, Side::Bid, OrderType::Limit, 9_900, 20).unwrap();
        engine.place_order(1, Side::Bid, OrderType::Limit, 9_800, 5).unwrap();

        let depth = engine.market_depth(Side::Bid, 2);
        assert_eq!(depth, vec![(10_000, 25), (9_900, 20)]);

        // Asking for more levels than exist returns what is there.
        let all = engine.market_depth(Side::Bid, 10);
        assert_eq!(all.len(), 3);
        assert_eq!(all[2], (9_800, 5));

        // Depth queries leave the book untouched.
        assert_eq!(engine.best_bid(), Some(10_000));
    }

    #[test]
    fn test_auto_match_off_leaves_cross() {
        let mut engine = engine();
        engine.set_auto_match(false);
        assert!(!engine.get_auto_match());

        let ask = engine
            .place_order(1, Side::Ask, OrderType::Limit, 10_000, 10)
            .unwrap();
        let bid = engine
            .place_order(2, Side::Bid, OrderType::Limit, 10_000, 10)
            .unwrap();

        // Both rest; nothing matched.
        assert_eq!(engine.get_order(ask).unwrap().status, OrderStatus::Open);
        assert_eq!(engine.get_order(bid).unwrap().status, OrderStatus::Open);
        assert_eq!(engine.num_trades(), 0);
    }

    #[test]
    fn test_fill_notifications_carry_quantities() {
        let (mut engine, sink) = engine_with_sink();

        engine
            .place_order(1, Side::Ask, OrderType::Limit, 10_000, 100)
            .unwrap();
        engine
            .place_order(2, Side::Bid, OrderType::Limit, 10_000, 30)
            .unwrap();

        let fills: Vec<_> = sink
            .drain()
            .into_iter()
            .filter(|n| matches!(n.kind, NotificationKind::Fill { .. }))
            .collect();
        assert_eq!(fills.len(), 2, "one fill notification per participant");

        let ask_fill = fills.iter().find(|n| n.side == Side::Ask).unwrap();
        assert_eq!(ask_fill.qty, 30);
        assert_eq!(ask_fill.kind, NotificationKind::Fill { remaining: 70 });

        let bid_fill = fills.iter().find(|n| n.side == Side::Bid).unwrap();
        assert_eq!(bid_fill.qty, 30);
        assert_eq!(bid_fill.kind, NotificationKind::Fill { remaining: 0 });
    }

    #[test]
    fn test_open_quantity_conservation() {
        let mut engine = engine();

        for i in 0..20u64 {
            let side = if i % 2 == 0 { Side::Bid } else { Side::Ask };
            let price = if side == Side::Bid { 9_000 + i * 10 } else { 11_000 + i * 10 };
            engine
                .place_order(1, side, OrderType::Limit, price, 10 + i)
                .unwrap();
        }

        let open_total: Quantity = engine
            .orders_by_status(OrderStatus::Open)
            .iter()
            .map(|o| o.qty)
            .sum();
        let depth_total: Quantity = engine
            .market_depth(Side::Bid, usize::MAX)
            .iter()
            .chain(engine.market_depth(Side::Ask, usize::MAX).iter())
            .map(|&(_, qty)| qty)
            .sum();
        assert_eq!(open_total, depth_total);
    }
}
