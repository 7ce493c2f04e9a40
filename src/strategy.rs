//! Strategy callback contract.
//!
//! Strategies are driven by external simulation code, not by the runtime
//! itself: the driver decides when to invoke the callbacks (typically
//! from the notification stream between batches). A strategy receives
//! read access to the engine and the runtime handle it submits follow-up
//! orders through.

use crate::engine::OrderEngine;
use crate::events::RejectReason;
use crate::order::{OrderId, Price, Quantity};
use crate::runtime::ExchangeRuntime;

/// Callbacks a trading strategy implements.
pub trait TradingStrategy {
    /// Invoked after each book-affecting event. `engine` is read-only;
    /// orders go through `runtime`.
    fn on_book_update(&mut self, symbol: &str, engine: &OrderEngine, runtime: &mut ExchangeRuntime);

    /// One of the strategy's orders traded.
    fn on_fill(&mut self, symbol: &str, order_id: OrderId, price: Price, qty: Quantity);

    /// One of the strategy's orders was cancelled.
    fn on_cancel(&mut self, _symbol: &str, _order_id: OrderId) {}

    /// One of the strategy's orders was rejected.
    fn on_reject(&mut self, _symbol: &str, _order_id: OrderId, _reason: &RejectReason) {}
}
