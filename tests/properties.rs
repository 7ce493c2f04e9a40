//! Property-style tests over seeded random workloads.
//!
//! Invariants checked:
//! - the book never stays crossed while auto-match is on
//! - open quantity in the order table equals the quantity visible in the
//!   depth view
//! - every trade emits exactly one fill notification per participant
//! - placing then cancelling restores the depth view
//! - within one symbol, execution order equals submission order
//! - identical command sequences produce identical books

use batchbook::{
    ExchangeRuntime, MemorySink, NotificationKind, OrderEngine, OrderIdCell, OrderStatus,
    OrderType, Price, Quantity, RuntimeConfig, Side, INVALID_ORDER_ID,
};
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use std::sync::Arc;

#[derive(Clone, Copy, Debug)]
enum Op {
    Place { side: Side, price: Price, qty: Quantity },
    Market { side: Side, qty: Quantity },
    Cancel { nth: usize },
    Edit { nth: usize, side: Side, price: Price, qty: Quantity },
}

/// Deterministic mixed workload. Cancel/edit targets are indices into the
/// list of previously placed orders so replays stay identical.
fn generate_ops(seed: u64, count: usize) -> Vec<Op> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut ops = Vec::with_capacity(count);
    let mut placed = 0usize;

    for _ in 0..count {
        let roll = rng.gen_range(0..100);
        if placed == 0 || roll < 60 {
            ops.push(Op::Place {
                side: if rng.gen_bool(0.5) { Side::Bid } else { Side::Ask },
                price: rng.gen_range(9_500..10_500),
                qty: rng.gen_range(1..100),
            });
            placed += 1;
        } else if roll < 70 {
            ops.push(Op::Market {
                side: if rng.gen_bool(0.5) { Side::Bid } else { Side::Ask },
                qty: rng.gen_range(1..50),
            });
        } else if roll < 90 {
            ops.push(Op::Cancel {
                nth: rng.gen_range(0..placed),
            });
        } else {
            ops.push(Op::Edit {
                nth: rng.gen_range(0..placed),
                side: if rng.gen_bool(0.5) { Side::Bid } else { Side::Ask },
                price: rng.gen_range(9_500..10_500),
                qty: rng.gen_range(1..100),
            });
        }
    }
    ops
}

fn apply(engine: &mut OrderEngine, op: Op, placed: &mut Vec<u32>) {
    match op {
        Op::Place { side, price, qty } => {
            if let Some(id) = engine.place_order(1, side, OrderType::Limit, price, qty) {
                placed.push(id);
            }
        }
        Op::Market { side, qty } => {
            engine.place_order(2, side, OrderType::Market, 0, qty);
        }
        Op::Cancel { nth } => {
            if let Some(&id) = placed.get(nth) {
                engine.cancel_order(id);
            }
        }
        Op::Edit { nth, side, price, qty } => {
            if let Some(&id) = placed.get(nth) {
                engine.edit_order(id, side, price, qty);
            }
        }
    }
}

fn open_total(engine: &OrderEngine) -> Quantity {
    engine
        .orders_by_status(OrderStatus::Open)
        .iter()
        .map(|order| order.qty)
        .sum()
}

fn depth_total(engine: &OrderEngine) -> Quantity {
    engine
        .market_depth(Side::Bid, usize::MAX)
        .iter()
        .chain(engine.market_depth(Side::Ask, usize::MAX).iter())
        .map(|&(_, qty)| qty)
        .sum()
}

#[test]
fn test_book_never_stays_crossed() {
    let mut engine = OrderEngine::new("PROP", 20_000, true, Vec::new());
    let mut placed = Vec::new();

    for op in generate_ops(0xDEADBEEF, 2_000) {
        apply(&mut engine, op, &mut placed);
        if let (Some(bid), Some(ask)) = (engine.best_bid(), engine.best_ask()) {
            assert!(bid < ask, "book left crossed: bid {bid} >= ask {ask}");
        }
    }
}

#[test]
fn test_open_quantity_matches_depth_view() {
    let mut engine = OrderEngine::new("PROP", 20_000, true, Vec::new());
    let mut placed = Vec::new();

    for (i, op) in generate_ops(0xCAFEBABE, 2_000).into_iter().enumerate() {
        apply(&mut engine, op, &mut placed);
        if i % 100 == 0 {
            assert_eq!(open_total(&engine), depth_total(&engine));
        }
    }
    assert_eq!(open_total(&engine), depth_total(&engine));
}

#[test]
fn test_fill_notifications_pair_up() {
    let sink = Arc::new(MemorySink::new());
    let mut engine = OrderEngine::new("PROP", 20_000, true, vec![sink.clone()]);
    let mut placed = Vec::new();

    for op in generate_ops(0x5EED, 1_500) {
        apply(&mut engine, op, &mut placed);
    }

    let fills: Vec<_> = sink
        .drain()
        .into_iter()
        .filter(|n| matches!(n.kind, NotificationKind::Fill { .. }))
        .collect();

    assert_eq!(
        fills.len() as u64,
        engine.num_trades() * 2,
        "one fill notification per participant per trade"
    );
    for pair in fills.chunks(2) {
        assert_eq!(pair[0].side, Side::Ask, "ask participant notified first");
        assert_eq!(pair[1].side, Side::Bid);
        assert_eq!(pair[0].qty, pair[1].qty, "both sides report the traded qty");
    }
}

#[test]
fn test_place_cancel_round_trip_restores_depth() {
    let mut engine = OrderEngine::new("PROP", 10_000, true, Vec::new());

    // Seed a small non-crossed book.
    for (side, price, qty) in [
        (Side::Bid, 9_900u64, 10u64),
        (Side::Bid, 9_800, 20),
        (Side::Ask, 10_100, 15),
        (Side::Ask, 10_200, 5),
    ] {
        engine.place_order(1, side, OrderType::Limit, price, qty).unwrap();
    }

    let bids_before = engine.market_depth(Side::Bid, usize::MAX);
    let asks_before = engine.market_depth(Side::Ask, usize::MAX);
    let trades_before = engine.num_trades();

    // A non-crossing order placed and cancelled leaves no trace in the
    // depth view.
    let id = engine
        .place_order(1, Side::Bid, OrderType::Limit, 9_850, 7)
        .unwrap();
    assert!(engine.cancel_order(id));
    assert!(!engine.cancel_order(id), "cancel is not repeatable");

    assert_eq!(engine.market_depth(Side::Bid, usize::MAX), bids_before);
    assert_eq!(engine.market_depth(Side::Ask, usize::MAX), asks_before);
    assert_eq!(engine.num_trades(), trades_before);
    assert_eq!(
        engine.get_order(id).map(|o| o.status),
        Some(OrderStatus::Cancelled),
        "terminal record survives for post-hoc queries"
    );
}

#[test]
fn test_identical_workloads_identical_books() {
    let ops = generate_ops(0xF00D, 3_000);

    let run = |ops: &[Op]| {
        let mut engine = OrderEngine::new("PROP", 20_000, true, Vec::new());
        let mut placed = Vec::new();
        for &op in ops {
            apply(&mut engine, op, &mut placed);
        }
        (
            engine.market_depth(Side::Bid, usize::MAX),
            engine.market_depth(Side::Ask, usize::MAX),
            engine.num_trades(),
            engine.market_price(),
            engine.order_count(),
        )
    };

    assert_eq!(run(&ops), run(&ops));
}

#[test]
fn test_submission_order_is_execution_order() {
    let mut runtime = ExchangeRuntime::new(RuntimeConfig {
        workers: 2,
        default_capacity: 10_000,
        batch_size: 0,
        verbose: false,
        blocking: true,
        pin_workers: false,
    });
    runtime.register_stock("SEQ", 1_000, 10, None).unwrap();

    let cells: Vec<_> = (0..100).map(|_| Arc::new(OrderIdCell::new())).collect();
    for (i, cell) in cells.iter().enumerate() {
        runtime
            .limit_order("SEQ", Side::Bid, 900 - i as u64, 1, cell, 1)
            .unwrap();
    }
    runtime.execute_batch();

    // Order ids are assigned at execution, so consecutive ids mean the
    // worker ran jobs in submission order.
    let first = cells[0].get();
    assert_ne!(first, INVALID_ORDER_ID);
    for (i, cell) in cells.iter().enumerate() {
        assert_eq!(cell.get(), first + i as u32);
    }
}

#[test]
fn test_sufficiency_monotonic_through_runtime() {
    let mut runtime = ExchangeRuntime::new(RuntimeConfig {
        workers: 2,
        default_capacity: 10_000,
        batch_size: 0,
        verbose: false,
        blocking: true,
        pin_workers: false,
    });
    runtime.register_stock("MONO", 10, 100, None).unwrap();

    let buy = Arc::new(OrderIdCell::new());
    runtime.limit_order("MONO", Side::Bid, 10, 37, &buy, 1).unwrap();
    runtime.execute_batch();

    let mut last = true;
    for qty in 0..80u64 {
        let now = runtime.has_sufficient_shares(1, "MONO", qty);
        assert!(last || !now, "sufficiency flipped back to true at {qty}");
        last = now;
    }
    assert!(runtime.has_sufficient_shares(1, "MONO", 37));
    assert!(!runtime.has_sufficient_shares(1, "MONO", 38));
}
