//! # Batchbook
//!
//! A multi-symbol limit order book exchange simulator with a
//! batch-oriented asynchronous submission runtime.
//!
//! ## Design Principles
//!
//! - **Single-Writer Engines**: each symbol's book is owned by exactly
//!   one worker thread for its whole lifetime (no rebalancing)
//! - **Batched Handoff**: submissions stage into per-worker double
//!   buffers; a flush publishes the whole batch atomically
//! - **Arena Allocation**: order records and job arguments live in
//!   preallocated index-addressed pools
//! - **Typed Events**: every lifecycle transition is a structured
//!   notification; sinks render text, feed strategies or keep the share
//!   ledger in step
//!
//! ## Architecture
//!
//! ```text
//! [Client Thread] --submit--> [Per-Worker Double Buffers] --flush--> [Workers]
//!        |                                                              |
//!        |  result cells <---------- publish results ------------------+
//!        |                                                              |
//!        +--- queries (engine mutex) ---> [Per-Symbol Engines] <--------+
//! ```
//!
//! Orders route by `engine_id % workers`, so per-symbol operations
//! execute serially in submission order while distinct symbols proceed in
//! parallel.

pub mod arena;
pub mod book;
pub mod double_buffer;
pub mod engine;
pub mod events;
pub mod heap;
pub mod ledger;
pub mod order;
pub mod runtime;
pub mod scheduler;
pub mod strategy;

// Re-exports for convenience
pub use arena::{Arena, ArenaIndex, NULL_INDEX};
pub use book::{BookSide, PriceLevel};
pub use double_buffer::DoubleBuffer;
pub use engine::OrderEngine;
pub use events::{
    ConsoleSink, MemorySink, Notification, NotificationKind, NotificationSink, RejectReason,
};
pub use heap::{Heap, HeapKind};
pub use ledger::{Holding, LedgerSink, PositionLedger};
pub use order::{
    OrderId, OrderInfo, OrderStatus, OrderType, Price, Quantity, Sequence, Side, UserId,
    INVALID_ORDER_ID, IPO_HOLDER,
};
pub use runtime::{
    BoolCell, EngineId, ExchangeRuntime, OrderIdCell, RuntimeConfig, RuntimeError, UserOrderMap,
};
pub use scheduler::{Job, JobScheduler, WorkerId};
pub use strategy::TradingStrategy;
