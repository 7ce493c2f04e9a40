//! Book side - an ordered set of active prices with per-price FIFO queues.
//!
//! Each side pairs a heap of prices (max-heap for bids, min-heap for
//! asks) with a map from price to [`PriceLevel`]. The two structures are
//! kept in lockstep: a price is in the heap exactly while its level is
//! non-empty.

use crate::heap::{Heap, HeapKind};
use crate::order::{OrderId, Price, Sequence, Side};
use rustc_hash::FxHashMap;
use std::collections::hash_map::Entry;

/// FIFO queue of resting orders at a single price.
///
/// Entries are `(sequence, order_id)` pairs in a min-heap, so the head is
/// always the oldest order at the price.
#[derive(Clone, Debug)]
pub struct PriceLevel {
    queue: Heap<(Sequence, OrderId)>,
}

impl PriceLevel {
    pub fn new() -> Self {
        Self {
            queue: Heap::new(HeapKind::Min),
        }
    }

    #[inline]
    pub fn push(&mut self, sequence: Sequence, order_id: OrderId) {
        self.queue.push((sequence, order_id));
    }

    /// Oldest resting order at this price.
    #[inline]
    pub fn front(&self) -> Option<(Sequence, OrderId)> {
        self.queue.peek().copied()
    }

    #[inline]
    pub fn pop_front(&mut self) -> Option<(Sequence, OrderId)> {
        self.queue.pop()
    }

    /// Remove a specific entry (cancel path). Returns false when the
    /// entry is not present.
    pub fn remove(&mut self, sequence: Sequence, order_id: OrderId) -> bool {
        match self.queue.find(&(sequence, order_id)) {
            Some(index) => {
                self.queue.pop_at(index);
                true
            }
            None => false,
        }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// Entries in storage order; sufficient for aggregations that do not
    /// care about priority.
    pub fn entries(&self) -> impl Iterator<Item = &(Sequence, OrderId)> {
        self.queue.iter()
    }
}

impl Default for PriceLevel {
    fn default() -> Self {
        Self::new()
    }
}

/// One side of an order book.
#[derive(Clone, Debug)]
pub struct BookSide {
    prices: Heap<Price>,
    levels: FxHashMap<Price, PriceLevel>,
}

impl BookSide {
    /// Create the side for `side`: bids expose the highest price first,
    /// asks the lowest.
    pub fn new(side: Side) -> Self {
        let kind = match side {
            Side::Bid => HeapKind::Max,
            Side::Ask => HeapKind::Min,
        };
        Self {
            prices: Heap::new(kind),
            levels: FxHashMap::default(),
        }
    }

    /// Best (top-of-book) price, if any order rests on this side.
    #[inline]
    pub fn best(&self) -> Option<Price> {
        self.prices.peek().copied()
    }

    /// Append an order to the level at `price`, creating the level (and
    /// its heap entry) on demand.
    pub fn insert(&mut self, price: Price, sequence: Sequence, order_id: OrderId) {
        match self.levels.entry(price) {
            Entry::Occupied(mut level) => level.get_mut().push(sequence, order_id),
            Entry::Vacant(slot) => {
                slot.insert(PriceLevel::new()).push(sequence, order_id);
                self.prices.push(price);
            }
        }
    }

    /// Head of the level at `price`.
    #[inline]
    pub fn front_of(&self, price: Price) -> Option<(Sequence, OrderId)> {
        self.levels.get(&price)?.front()
    }

    /// Pop the head of the level at `price`, dropping the level and its
    /// price when it empties.
    pub fn pop_front_of(&mut self, price: Price) -> Option<(Sequence, OrderId)> {
        let level = self.levels.get_mut(&price)?;
        let popped = level.pop_front();
        let emptied = level.is_empty();
        if emptied {
            self.drop_level(price);
        }
        popped
    }

    /// Remove a specific resting order (cancel path), dropping the level
    /// when it empties. Returns false when the entry is not present.
    pub fn remove_entry(&mut self, price: Price, sequence: Sequence, order_id: OrderId) -> bool {
        let Some(level) = self.levels.get_mut(&price) else {
            return false;
        };
        let removed = level.remove(sequence, order_id);
        if removed && level.is_empty() {
            self.drop_level(price);
        }
        removed
    }

    fn drop_level(&mut self, price: Price) {
        self.levels.remove(&price);
        if let Some(index) = self.prices.find(&price) {
            self.prices.pop_at(index);
        }
    }

    /// Level at `price`, if it exists (levels exist iff non-empty).
    #[inline]
    pub fn level(&self, price: Price) -> Option<&PriceLevel> {
        self.levels.get(&price)
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.prices.is_empty()
    }

    /// Number of active price levels.
    #[inline]
    pub fn level_count(&self) -> usize {
        self.levels.len()
    }

    /// Snapshot of the price heap for best-first traversal without
    /// mutating the book (depth queries).
    pub fn prices_snapshot(&self) -> Heap<Price> {
        self.prices.clone()
    }

    pub fn clear(&mut self) {
        self.prices.clear();
        self.levels.clear();
    }
}
