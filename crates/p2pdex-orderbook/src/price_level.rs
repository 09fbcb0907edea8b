//! A single price level in the order book.
//!
//! Ticks at the same price are kept in timestamp order (time priority)
//! using a [`VecDeque`]. Ticks arrive by gossip in any order, so insertion
//! places each tick behind every tick with an equal or earlier timestamp.

use std::collections::VecDeque;

use p2pdex_types::{OrderId, Price, Quantity, Tick};

/// A single price level containing all ticks at that price.
///
/// The front of the deque has the earliest timestamp and the highest time
/// priority.
#[derive(Debug, Clone)]
pub struct PriceLevel {
    /// The price at this level.
    pub price: Price,
    /// Ticks in time-priority order (front = oldest = highest priority).
    pub ticks: VecDeque<Tick>,
}

impl PriceLevel {
    /// Create a new empty price level.
    #[must_use]
    pub fn new(price: Price) -> Self {
        Self {
            price,
            ticks: VecDeque::new(),
        }
    }

    /// Insert a tick at its time-priority position.
    pub fn insert(&mut self, tick: Tick) {
        let pos = self
            .ticks
            .iter()
            .position(|t| t.timestamp() > tick.timestamp())
            .unwrap_or(self.ticks.len());
        self.ticks.insert(pos, tick);
    }

    /// Peek at the front tick without removing it.
    #[must_use]
    pub fn front(&self) -> Option<&Tick> {
        self.ticks.front()
    }

    /// Total unreserved quantity across all ticks at this level.
    #[must_use]
    pub fn total_remaining(&self) -> Quantity {
        self.ticks.iter().map(Tick::remaining).sum()
    }

    #[must_use]
    pub fn get(&self, order_id: &OrderId) -> Option<&Tick> {
        self.ticks.iter().find(|t| t.order_id() == *order_id)
    }

    pub fn get_mut(&mut self, order_id: &OrderId) -> Option<&mut Tick> {
        self.ticks.iter_mut().find(|t| t.order_id() == *order_id)
    }

    /// Remove a specific tick by order ID.
    pub fn remove(&mut self, order_id: &OrderId) -> Option<Tick> {
        let pos = self.ticks.iter().position(|t| t.order_id() == *order_id)?;
        self.ticks.remove(pos)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ticks.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.ticks.len()
    }
}

#[cfg(test)]
mod tests {
    use p2pdex_types::*;

    use super::*;

    fn tick_at(ms: u64, qty_mil: i64) -> Tick {
        Tick::new(
            OrderId::new(TraderId::random(), OrderNumber(1)),
            OrderSide::Bid,
            Price::from_mil(10_000).unwrap(),
            Quantity::from_mil(qty_mil).unwrap(),
            Timeout::from_secs(3600),
            Timestamp::from_millis(ms),
        )
    }

    #[test]
    fn insert_orders_by_timestamp() {
        let mut level = PriceLevel::new(Price::from_mil(10_000).unwrap());
        let late = tick_at(300, 1_000);
        let early = tick_at(100, 1_000);
        let mid = tick_at(200, 1_000);
        let early_id = early.order_id();

        level.insert(late);
        level.insert(early);
        level.insert(mid);

        let stamps: Vec<u64> = level.ticks.iter().map(|t| t.timestamp().as_millis()).collect();
        assert_eq!(stamps, vec![100, 200, 300]);
        assert_eq!(level.front().unwrap().order_id(), early_id);
    }

    #[test]
    fn equal_timestamps_keep_arrival_order() {
        let mut level = PriceLevel::new(Price::from_mil(10_000).unwrap());
        let first = tick_at(100, 1_000);
        let second = tick_at(100, 1_000);
        let first_id = first.order_id();
        level.insert(first);
        level.insert(second);
        assert_eq!(level.front().unwrap().order_id(), first_id);
    }

    #[test]
    fn total_remaining_skips_reserved() {
        let mut level = PriceLevel::new(Price::from_mil(10_000).unwrap());
        let mut a = tick_at(1, 5_000);
        a.reserve(Quantity::from_mil(2_000).unwrap()).unwrap();
        level.insert(a);
        level.insert(tick_at(2, 3_000));
        assert_eq!(level.total_remaining(), Quantity::from_mil(6_000).unwrap());
    }

    #[test]
    fn remove_by_id() {
        let mut level = PriceLevel::new(Price::from_mil(10_000).unwrap());
        let a = tick_at(1, 1_000);
        let target = a.order_id();
        level.insert(a);
        level.insert(tick_at(2, 1_000));

        assert_eq!(level.remove(&target).unwrap().order_id(), target);
        assert_eq!(level.len(), 1);
        assert!(level.remove(&target).is_none());
    }

    #[test]
    fn empty_level() {
        let level = PriceLevel::new(Price::from_mil(10_000).unwrap());
        assert!(level.is_empty());
        assert_eq!(level.total_remaining(), Quantity::ZERO);
        assert!(level.front().is_none());
    }
}
