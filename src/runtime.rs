//! Exchange runtime - symbol registry, dispatch and batch control.
//!
//! The runtime owns every per-symbol engine and routes each order
//! operation to the worker that owns that symbol (engines are pinned to
//! `engine_id % worker_count`; no two workers ever touch the same
//! engine). Callers stage operations, then publish them with
//! [`ExchangeRuntime::execute_batch`]; results land in caller-provided
//! cells once the owning worker has run the job.
//!
//! Submission methods take `&mut self`: the per-worker queues are
//! single-producer, and exclusive access is how that contract is spelled
//! here. Queries take `&self` and briefly lock the engine, so they are
//! safe at any time but serialize against the owning worker.
//!
//! Ask placements are gated by the position ledger. The check runs at
//! submit time against executed state, so a batch can oversubscribe a
//! user's shares before its own fills execute; within one batch the
//! check is advisory.

use crate::arena::{Arena, ArenaIndex};
use crate::engine::OrderEngine;
use crate::events::{ConsoleSink, NotificationSink};
use crate::ledger::{LedgerSink, PositionLedger};
use crate::order::{
    OrderId, OrderInfo, OrderStatus, OrderType, Price, Quantity, Side, UserId, INVALID_ORDER_ID,
    IPO_HOLDER,
};
use crate::scheduler::{Job, JobScheduler, WorkerId};
use parking_lot::{Mutex, RwLock};
use rustc_hash::{FxHashMap, FxHashSet};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use thiserror::Error;

/// Monotonic engine identifier assigned at registration.
pub type EngineId = u32;

/// `user_id -> symbol -> live order ids`.
pub type UserOrderMap = FxHashMap<UserId, FxHashMap<String, FxHashSet<OrderId>>>;

/// Failures reported synchronously to the submitting caller.
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("unknown symbol {0}")]
    UnknownSymbol(String),
    #[error("symbol {0} is already registered")]
    DuplicateSymbol(String),
    #[error("price must be positive")]
    InvalidPrice,
    #[error("quantity must be positive")]
    InvalidQuantity,
    #[error("user {user} has insufficient shares to sell {qty}")]
    InsufficientShares { user: UserId, qty: Quantity },
    #[error("argument arena for worker {worker} is full; execute a batch first")]
    ArenaOverflow { worker: WorkerId },
    #[error("IPO order for {0} was rejected")]
    IpoRejected(String),
}

/// Caller-owned cell an order-id result is published into.
///
/// Starts at [`INVALID_ORDER_ID`]; the owning worker stores the outcome
/// with release ordering. Read it only after the batch completed
/// (blocking `execute_batch`, [`ExchangeRuntime::wait_for_jobs`] or a
/// positive [`ExchangeRuntime::is_engine_completed`]).
#[derive(Debug)]
pub struct OrderIdCell {
    value: AtomicU32,
}

impl OrderIdCell {
    pub fn new() -> Self {
        Self {
            value: AtomicU32::new(INVALID_ORDER_ID),
        }
    }

    #[inline]
    pub fn set(&self, id: OrderId) {
        self.value.store(id, Ordering::Release);
    }

    #[inline]
    pub fn get(&self) -> OrderId {
        self.value.load(Ordering::Acquire)
    }
}

impl Default for OrderIdCell {
    fn default() -> Self {
        Self::new()
    }
}

/// Caller-owned cell a boolean result is published into. Starts false.
#[derive(Debug, Default)]
pub struct BoolCell {
    value: AtomicBool,
}

impl BoolCell {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn set(&self, value: bool) {
        self.value.store(value, Ordering::Release);
    }

    #[inline]
    pub fn get(&self) -> bool {
        self.value.load(Ordering::Acquire)
    }
}

/// Runtime construction parameters.
#[derive(Clone, Debug)]
pub struct RuntimeConfig {
    /// Worker threads in the scheduler pool.
    pub workers: usize,
    /// Default per-engine order capacity (overridable per registration).
    pub default_capacity: u32,
    /// Auto-flush a worker after this many staged jobs per engine.
    /// Zero means manual batching only.
    pub batch_size: usize,
    /// Attach the console notification sink and log runtime diagnostics.
    pub verbose: bool,
    /// Whether `execute_batch` waits for the batch to finish.
    pub blocking: bool,
    /// Pin worker threads to cores.
    pub pin_workers: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            default_capacity: 100_000,
            batch_size: 0,
            verbose: true,
            blocking: true,
            pin_workers: false,
        }
    }
}

/// Tagged argument record for one staged order operation. Lives in the
/// owning worker's arena from submission until the job's cleanup frees
/// it.
#[derive(Clone)]
struct OrderJobArgs {
    op: OrderOp,
    user_id: UserId,
    id_cell: Option<Arc<OrderIdCell>>,
    bool_cell: Option<Arc<BoolCell>>,
}

#[derive(Clone)]
enum OrderOp {
    Place {
        side: Side,
        kind: OrderType,
        price: Price,
        qty: Quantity,
    },
    Cancel {
        order_id: OrderId,
    },
    Edit {
        order_id: OrderId,
        side: Side,
        price: Price,
        qty: Quantity,
    },
}

struct EngineHandle {
    engine: Arc<Mutex<OrderEngine>>,
    engine_id: EngineId,
    worker_id: WorkerId,
    ipo_shares: Quantity,
    pending_jobs: usize,
}

/// Registry of engines plus the dispatch machinery around them.
pub struct ExchangeRuntime {
    engines: FxHashMap<String, EngineHandle>,
    scheduler: JobScheduler,
    worker_arenas: Vec<Arc<Mutex<Arena<OrderJobArgs>>>>,
    user_orders: Arc<RwLock<UserOrderMap>>,
    ledger: Arc<RwLock<PositionLedger>>,
    sinks: Vec<Arc<dyn NotificationSink>>,
    next_engine_id: EngineId,
    num_workers: usize,
    default_capacity: u32,
    batch_size: usize,
    verbose: bool,
    blocking_mode: bool,
}

impl ExchangeRuntime {
    pub fn new(config: RuntimeConfig) -> Self {
        let num_workers = config.workers.max(1);
        // Sizing the queues to the argument arenas means arena overflow
        // (a reported error) always fires before a queue can wedge an
        // unflushed producer.
        let arena_capacity = if config.batch_size > 0 {
            config.batch_size as u32
        } else {
            config.default_capacity
        };

        let scheduler =
            JobScheduler::with_options(num_workers, arena_capacity as usize, config.pin_workers);
        let worker_arenas = (0..num_workers)
            .map(|_| Arc::new(Mutex::new(Arena::new(arena_capacity))))
            .collect();

        let ledger = Arc::new(RwLock::new(PositionLedger::new()));
        let mut sinks: Vec<Arc<dyn NotificationSink>> =
            vec![Arc::new(LedgerSink::new(Arc::clone(&ledger)))];
        if config.verbose {
            sinks.push(Arc::new(ConsoleSink));
        }

        Self {
            engines: FxHashMap::default(),
            scheduler,
            worker_arenas,
            user_orders: Arc::new(RwLock::new(UserOrderMap::default())),
            ledger,
            sinks,
            next_engine_id: 0,
            num_workers,
            default_capacity: config.default_capacity,
            batch_size: config.batch_size,
            verbose: config.verbose,
            blocking_mode: config.blocking,
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(RuntimeConfig::default())
    }

    /// Attach an additional notification sink. Applies to engines
    /// registered after the call.
    pub fn add_sink(&mut self, sink: Arc<dyn NotificationSink>) {
        self.sinks.push(sink);
    }

    // ========================================================================
    // Registration
    // ========================================================================

    /// Register a symbol: construct its engine (auto-match on), grant the
    /// IPO holder the share allotment, and post the opening ask on the
    /// calling thread (no worker owns the engine yet).
    pub fn register_stock(
        &mut self,
        symbol: &str,
        ipo_price: Price,
        ipo_qty: Quantity,
        capacity: Option<u32>,
    ) -> Result<(), RuntimeError> {
        if ipo_price == 0 {
            return Err(RuntimeError::InvalidPrice);
        }
        if ipo_qty == 0 {
            return Err(RuntimeError::InvalidQuantity);
        }
        if self.engines.contains_key(symbol) {
            return Err(RuntimeError::DuplicateSymbol(symbol.to_string()));
        }

        let capacity = capacity.unwrap_or(self.default_capacity);
        let engine_id = self.next_engine_id;
        let worker_id = engine_id as usize % self.num_workers;

        let mut engine = OrderEngine::new(symbol, capacity, true, self.sinks.clone());
        let ipo_order = engine
            .place_order(IPO_HOLDER, Side::Ask, OrderType::Limit, ipo_price, ipo_qty)
            .ok_or_else(|| RuntimeError::IpoRejected(symbol.to_string()))?;
        // Grant after the ask: the ledger sink has already recorded the
        // commitment, the grant backs it.
        self.ledger.write().credit(IPO_HOLDER, symbol, ipo_qty);
        self.user_orders
            .write()
            .entry(IPO_HOLDER)
            .or_default()
            .entry(symbol.to_string())
            .or_default()
            .insert(ipo_order);

        self.next_engine_id += 1;
        self.engines.insert(
            symbol.to_string(),
            EngineHandle {
                engine: Arc::new(Mutex::new(engine)),
                engine_id,
                worker_id,
                ipo_shares: ipo_qty,
                pending_jobs: 0,
            },
        );

        if self.verbose {
            tracing::info!(symbol, ipo_price, ipo_qty, worker_id, "registered stock");
        }
        Ok(())
    }

    /// Remove a symbol after draining its worker.
    pub fn unregister_stock(&mut self, symbol: &str) -> Result<(), RuntimeError> {
        let worker_id = self.handle(symbol)?.worker_id;
        self.scheduler.process_jobs_on(worker_id);

        self.engines.remove(symbol);
        for per_user in self.user_orders.write().values_mut() {
            per_user.remove(symbol);
        }
        self.ledger.write().remove_symbol(symbol);

        if self.verbose {
            tracing::info!(symbol, "unregistered stock");
        }
        Ok(())
    }

    /// Drain every worker and clear all state, making the runtime
    /// reusable across test cases.
    pub fn reset(&mut self) {
        self.scheduler.process_jobs();
        self.engines.clear();
        self.user_orders.write().clear();
        self.ledger.write().clear();
        self.next_engine_id = 0;
        for arena in &self.worker_arenas {
            arena.lock().reset();
        }
        if self.verbose {
            tracing::info!("runtime reset complete");
        }
    }

    // ========================================================================
    // Order submission
    // ========================================================================

    /// Stage a limit order. The outcome lands in `result` when the batch
    /// executes; on validation failure the cell is resolved to the
    /// invalid sentinel immediately.
    pub fn limit_order(
        &mut self,
        symbol: &str,
        side: Side,
        price: Price,
        qty: Quantity,
        result: &Arc<OrderIdCell>,
        user_id: UserId,
    ) -> Result<(), RuntimeError> {
        let outcome = self
            .validate_order(symbol, Some(price), qty, side, user_id)
            .and_then(|_| {
                self.submit(
                    symbol,
                    OrderJobArgs {
                        op: OrderOp::Place {
                            side,
                            kind: OrderType::Limit,
                            price,
                            qty,
                        },
                        user_id,
                        id_cell: Some(Arc::clone(result)),
                        bool_cell: None,
                    },
                )
            });
        if let Err(error) = &outcome {
            result.set(INVALID_ORDER_ID);
            self.report(error);
        }
        outcome
    }

    /// Stage a market order. Price is taken from the opposite best at
    /// execution time.
    pub fn market_order(
        &mut self,
        symbol: &str,
        side: Side,
        qty: Quantity,
        result: &Arc<OrderIdCell>,
        user_id: UserId,
    ) -> Result<(), RuntimeError> {
        let outcome = self
            .validate_order(symbol, None, qty, side, user_id)
            .and_then(|_| {
                self.submit(
                    symbol,
                    OrderJobArgs {
                        op: OrderOp::Place {
                            side,
                            kind: OrderType::Market,
                            price: 0,
                            qty,
                        },
                        user_id,
                        id_cell: Some(Arc::clone(result)),
                        bool_cell: None,
                    },
                )
            });
        if let Err(error) = &outcome {
            result.set(INVALID_ORDER_ID);
            self.report(error);
        }
        outcome
    }

    /// Stage a cancel for `order_id`.
    pub fn cancel_order(
        &mut self,
        symbol: &str,
        order_id: OrderId,
        result: &Arc<BoolCell>,
        user_id: UserId,
    ) -> Result<(), RuntimeError> {
        let outcome = if self.engines.contains_key(symbol) {
            self.submit(
                symbol,
                OrderJobArgs {
                    op: OrderOp::Cancel { order_id },
                    user_id,
                    id_cell: None,
                    bool_cell: Some(Arc::clone(result)),
                },
            )
        } else {
            Err(RuntimeError::UnknownSymbol(symbol.to_string()))
        };
        if let Err(error) = &outcome {
            result.set(false);
            self.report(error);
        }
        outcome
    }

    /// Stage a modify for `order_id` (cancel-and-reinsert retaining the
    /// id; the order loses its queue position).
    pub fn edit_order(
        &mut self,
        symbol: &str,
        order_id: OrderId,
        side: Side,
        price: Price,
        qty: Quantity,
        result: &Arc<OrderIdCell>,
    ) -> Result<(), RuntimeError> {
        let outcome = self
            .validate_edit(symbol, price, qty)
            .and_then(|_| {
                self.submit(
                    symbol,
                    OrderJobArgs {
                        op: OrderOp::Edit {
                            order_id,
                            side,
                            price,
                            qty,
                        },
                        user_id: IPO_HOLDER,
                        id_cell: Some(Arc::clone(result)),
                        bool_cell: None,
                    },
                )
            });
        if let Err(error) = &outcome {
            result.set(INVALID_ORDER_ID);
            self.report(error);
        }
        outcome
    }

    // ========================================================================
    // Batch control
    // ========================================================================

    /// Publish every staged job. Waits for completion in blocking mode.
    pub fn execute_batch(&mut self) {
        if self.blocking_mode {
            self.scheduler.process_jobs();
        } else {
            self.scheduler.process_jobs_async();
        }
        for handle in self.engines.values_mut() {
            handle.pending_jobs = 0;
        }
    }

    /// Publish one worker's staged jobs.
    pub fn execute_batch_on(&mut self, worker_id: WorkerId) {
        if self.blocking_mode {
            self.scheduler.process_jobs_on(worker_id);
        } else {
            self.scheduler.process_jobs_on_async(worker_id);
        }
        for handle in self.engines.values_mut() {
            if handle.worker_id == worker_id {
                handle.pending_jobs = 0;
            }
        }
    }

    /// Block until every submitted job has finished.
    pub fn wait_for_jobs(&self) {
        self.scheduler.wait_for_completion();
    }

    /// Non-blocking check that every submitted job has finished.
    pub fn all_jobs_completed(&self) -> bool {
        self.scheduler.is_complete()
    }

    /// Non-blocking check that a symbol's worker has finished.
    pub fn is_engine_completed(&self, symbol: &str) -> Result<bool, RuntimeError> {
        Ok(self.scheduler.is_worker_complete(self.handle(symbol)?.worker_id))
    }

    // ========================================================================
    // Queries
    // ========================================================================

    pub fn get_order(
        &self,
        symbol: &str,
        order_id: OrderId,
    ) -> Result<Option<OrderInfo>, RuntimeError> {
        Ok(self.handle(symbol)?.engine.lock().get_order(order_id).copied())
    }

    pub fn get_best_bid(&self, symbol: &str) -> Result<Option<Price>, RuntimeError> {
        Ok(self.handle(symbol)?.engine.lock().best_bid())
    }

    pub fn get_best_ask(&self, symbol: &str) -> Result<Option<Price>, RuntimeError> {
        Ok(self.handle(symbol)?.engine.lock().best_ask())
    }

    /// Last trade price, `None` before the first trade.
    pub fn get_market_price(&self, symbol: &str) -> Result<Option<Price>, RuntimeError> {
        Ok(self.handle(symbol)?.engine.lock().market_price())
    }

    pub fn get_num_trades(&self, symbol: &str) -> Result<u64, RuntimeError> {
        Ok(self.handle(symbol)?.engine.lock().num_trades())
    }

    pub fn get_orders_by_status(
        &self,
        symbol: &str,
        status: OrderStatus,
    ) -> Result<Vec<OrderInfo>, RuntimeError> {
        Ok(self.handle(symbol)?.engine.lock().orders_by_status(status))
    }

    pub fn get_market_depth(
        &self,
        symbol: &str,
        side: Side,
        depth: usize,
    ) -> Result<Vec<(Price, Quantity)>, RuntimeError> {
        Ok(self.handle(symbol)?.engine.lock().market_depth(side, depth))
    }

    /// Live order ids the user owns for `symbol`, ascending.
    pub fn get_positions(&self, user_id: UserId, symbol: &str) -> Vec<OrderId> {
        let owners = self.user_orders.read();
        let mut ids: Vec<OrderId> = owners
            .get(&user_id)
            .and_then(|per_user| per_user.get(symbol))
            .map(|ids| ids.iter().copied().collect())
            .unwrap_or_default();
        ids.sort_unstable();
        ids
    }

    /// True when the user's uncommitted holdings cover `qty`.
    pub fn has_sufficient_shares(&self, user_id: UserId, symbol: &str, qty: Quantity) -> bool {
        self.ledger.read().has_sufficient(user_id, symbol, qty)
    }

    pub fn set_auto_match(&self, symbol: &str, auto_match: bool) -> Result<(), RuntimeError> {
        self.handle(symbol)?.engine.lock().set_auto_match(auto_match);
        Ok(())
    }

    pub fn get_auto_match(&self, symbol: &str) -> Result<bool, RuntimeError> {
        Ok(self.handle(symbol)?.engine.lock().get_auto_match())
    }

    pub fn set_blocking_mode(&mut self, blocking: bool) {
        self.blocking_mode = blocking;
    }

    pub fn get_blocking_mode(&self) -> bool {
        self.blocking_mode
    }

    /// Change the auto-flush threshold. The argument arenas keep the
    /// capacity they were built with.
    pub fn set_batch_size(&mut self, batch_size: usize) {
        self.batch_size = batch_size;
        for handle in self.engines.values_mut() {
            handle.pending_jobs = 0;
        }
    }

    pub fn get_batch_size(&self) -> usize {
        self.batch_size
    }

    /// Registered symbols, ascending.
    pub fn list_tickers(&self) -> Vec<String> {
        let mut tickers: Vec<String> = self.engines.keys().cloned().collect();
        tickers.sort_unstable();
        tickers
    }

    /// Shared handle to a symbol's engine, for read access between
    /// batches (strategies, diagnostics).
    pub fn get_engine(&self, symbol: &str) -> Option<Arc<Mutex<OrderEngine>>> {
        self.engines.get(symbol).map(|handle| Arc::clone(&handle.engine))
    }

    /// Worker a symbol's engine is pinned to.
    pub fn worker_of(&self, symbol: &str) -> Result<WorkerId, RuntimeError> {
        Ok(self.handle(symbol)?.worker_id)
    }

    /// Shares allotted to the IPO holder at registration.
    pub fn ipo_shares(&self, symbol: &str) -> Result<Quantity, RuntimeError> {
        Ok(self.handle(symbol)?.ipo_shares)
    }

    pub fn worker_count(&self) -> usize {
        self.num_workers
    }

    // ========================================================================
    // Internals
    // ========================================================================

    fn handle(&self, symbol: &str) -> Result<&EngineHandle, RuntimeError> {
        self.engines
            .get(symbol)
            .ok_or_else(|| RuntimeError::UnknownSymbol(symbol.to_string()))
    }

    fn validate_order(
        &self,
        symbol: &str,
        price: Option<Price>,
        qty: Quantity,
        side: Side,
        user_id: UserId,
    ) -> Result<(), RuntimeError> {
        if !self.engines.contains_key(symbol) {
            return Err(RuntimeError::UnknownSymbol(symbol.to_string()));
        }
        if price == Some(0) {
            return Err(RuntimeError::InvalidPrice);
        }
        if qty == 0 {
            return Err(RuntimeError::InvalidQuantity);
        }
        if side == Side::Ask && !self.ledger.read().has_sufficient(user_id, symbol, qty) {
            return Err(RuntimeError::InsufficientShares { user: user_id, qty });
        }
        Ok(())
    }

    fn validate_edit(&self, symbol: &str, price: Price, qty: Quantity) -> Result<(), RuntimeError> {
        if !self.engines.contains_key(symbol) {
            return Err(RuntimeError::UnknownSymbol(symbol.to_string()));
        }
        if price == 0 {
            return Err(RuntimeError::InvalidPrice);
        }
        if qty == 0 {
            return Err(RuntimeError::InvalidQuantity);
        }
        Ok(())
    }

    /// Allocate the argument record, build the job and stage it on the
    /// owning worker; auto-flush when the engine's pending count reaches
    /// the batch size.
    fn submit(&mut self, symbol: &str, args: OrderJobArgs) -> Result<(), RuntimeError> {
        let (engine, engine_id, worker_id) = {
            let handle = self.handle(symbol)?;
            (Arc::clone(&handle.engine), handle.engine_id, handle.worker_id)
        };

        let arena = Arc::clone(&self.worker_arenas[worker_id]);
        let args_index: ArenaIndex = arena
            .lock()
            .insert(args)
            .ok_or(RuntimeError::ArenaOverflow { worker: worker_id })?;

        let exec_arena = Arc::clone(&arena);
        let owners = Arc::clone(&self.user_orders);
        let ticker = symbol.to_string();
        let execute = move || {
            let args = exec_arena.lock().get(args_index).cloned();
            let Some(args) = args else {
                tracing::error!(index = args_index, "job arguments missing from arena");
                return;
            };
            match args.op {
                OrderOp::Place { side, kind, price, qty } => {
                    let placed = engine.lock().place_order(args.user_id, side, kind, price, qty);
                    if let Some(cell) = &args.id_cell {
                        cell.set(placed.unwrap_or(INVALID_ORDER_ID));
                    }
                    if let Some(order_id) = placed {
                        owners
                            .write()
                            .entry(args.user_id)
                            .or_default()
                            .entry(ticker)
                            .or_default()
                            .insert(order_id);
                    }
                }
                OrderOp::Cancel { order_id } => {
                    let cancelled = engine.lock().cancel_order(order_id);
                    if let Some(cell) = &args.bool_cell {
                        cell.set(cancelled);
                    }
                    if cancelled {
                        let mut owners = owners.write();
                        if let Some(ids) = owners
                            .get_mut(&args.user_id)
                            .and_then(|per_user| per_user.get_mut(&ticker))
                        {
                            ids.remove(&order_id);
                        }
                    }
                }
                OrderOp::Edit { order_id, side, price, qty } => {
                    let edited = engine.lock().edit_order(order_id, side, price, qty);
                    if let Some(cell) = &args.id_cell {
                        cell.set(edited.unwrap_or(INVALID_ORDER_ID));
                    }
                }
            }
        };
        let cleanup = move || {
            arena.lock().free(args_index);
        };

        self.scheduler
            .submit_job(Job::with_cleanup(engine_id as usize, execute, cleanup));

        let mut should_flush = false;
        if let Some(handle) = self.engines.get_mut(symbol) {
            handle.pending_jobs += 1;
            should_flush = self.batch_size > 0 && handle.pending_jobs >= self.batch_size;
        }
        if should_flush {
            self.execute_batch_on(worker_id);
        }
        Ok(())
    }

    fn report(&self, error: &RuntimeError) {
        if self.verbose {
            tracing::warn!(error = %error, "order submission rejected");
        }
    }
}
