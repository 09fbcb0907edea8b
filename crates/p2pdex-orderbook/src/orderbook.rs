//! The local view of the market.
//!
//! Uses `BTreeMap` for price-level ordering:
//! - **Bids**: `BTreeMap<Reverse<Price>, PriceLevel>` -- highest price first
//! - **Asks**: `BTreeMap<Price, PriceLevel>` -- lowest price first
//!
//! An auxiliary `HashMap<OrderId, (OrderSide, Price)>` locates a tick by
//! order ID. The book is the sole owner of every tick it holds: callers go
//! through [`OrderBook::reserve`], [`OrderBook::release`] and
//! [`OrderBook::consume`] and never hold a mutable alias.

use std::cmp::Reverse;
use std::collections::{BTreeMap, HashMap};

use p2pdex_types::*;

use crate::price_level::PriceLevel;

/// Asks and bids keyed by order, indexed by price then time.
#[derive(Debug, Default)]
pub struct OrderBook {
    /// Buy side: highest price first (`Reverse` key).
    bids: BTreeMap<Reverse<Price>, PriceLevel>,
    /// Sell side: lowest price first.
    asks: BTreeMap<Price, PriceLevel>,
    /// Fast lookup: `OrderId -> (side, price)`.
    index: HashMap<OrderId, (OrderSide, Price)>,
}

impl OrderBook {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    // =================================================================
    // Insertion / removal
    // =================================================================

    /// Insert a tick as-is, replacing any previous tick for the same order.
    /// Returns the replaced tick.
    pub fn insert(&mut self, tick: Tick) -> Option<Tick> {
        let previous = self.remove(&tick.order_id()).ok();
        self.place(tick);
        previous
    }

    /// Insert a peer's republished tick.
    ///
    /// A reservation held on the previous view carries over (clamped to the
    /// new quantity), so in-flight negotiations can still release it.
    /// Returns the superseded tick.
    pub fn republish(&mut self, mut tick: Tick) -> Option<Tick> {
        let previous = self.remove(&tick.order_id()).ok();
        if let Some(prev) = &previous {
            tick.inherit_reservation(prev);
        }
        self.place(tick);
        previous
    }

    fn place(&mut self, tick: Tick) {
        let price = tick.price();
        self.index.insert(tick.order_id(), (tick.side(), price));
        match tick.side() {
            OrderSide::Bid => self
                .bids
                .entry(Reverse(price))
                .or_insert_with(|| PriceLevel::new(price))
                .insert(tick),
            OrderSide::Ask => self
                .asks
                .entry(price)
                .or_insert_with(|| PriceLevel::new(price))
                .insert(tick),
        }
    }

    /// Remove a tick by order ID.
    pub fn remove(&mut self, order_id: &OrderId) -> Result<Tick> {
        let (side, price) = self
            .index
            .remove(order_id)
            .ok_or(DexError::TickNotFound(*order_id))?;

        let tick = match side {
            OrderSide::Bid => {
                let level = self
                    .bids
                    .get_mut(&Reverse(price))
                    .ok_or(DexError::TickNotFound(*order_id))?;
                let tick = level
                    .remove(order_id)
                    .ok_or(DexError::TickNotFound(*order_id))?;
                if level.is_empty() {
                    self.bids.remove(&Reverse(price));
                }
                tick
            }
            OrderSide::Ask => {
                let level = self
                    .asks
                    .get_mut(&price)
                    .ok_or(DexError::TickNotFound(*order_id))?;
                let tick = level
                    .remove(order_id)
                    .ok_or(DexError::TickNotFound(*order_id))?;
                if level.is_empty() {
                    self.asks.remove(&price);
                }
                tick
            }
        };
        Ok(tick)
    }

    // =================================================================
    // Reservation transitions
    // =================================================================

    /// Pledge `quantity` of a tick.
    pub fn reserve(&mut self, order_id: &OrderId, quantity: Quantity) -> Result<()> {
        self.tick_mut(order_id)?.reserve(quantity)
    }

    /// Return a pledge on a tick.
    pub fn release(&mut self, order_id: &OrderId, quantity: Quantity) -> Result<()> {
        self.tick_mut(order_id)?.release(quantity)
    }

    /// Return a pledge on a peer's tick, clamped to what the tick still
    /// holds. Returns the quantity actually released.
    pub fn release_up_to(&mut self, order_id: &OrderId, quantity: Quantity) -> Result<Quantity> {
        Ok(self.tick_mut(order_id)?.release_up_to(quantity))
    }

    /// Remove traded quantity from a tick, deleting it once exhausted.
    /// Returns `true` if the tick was removed.
    pub fn consume(
        &mut self,
        order_id: &OrderId,
        quantity: Quantity,
        from_reserved: bool,
    ) -> Result<bool> {
        let exhausted = self.tick_mut(order_id)?.consume(quantity, from_reserved);
        if exhausted {
            self.remove(order_id)?;
        }
        Ok(exhausted)
    }

    fn tick_mut(&mut self, order_id: &OrderId) -> Result<&mut Tick> {
        let (side, price) = *self
            .index
            .get(order_id)
            .ok_or(DexError::TickNotFound(*order_id))?;
        let level = match side {
            OrderSide::Bid => self.bids.get_mut(&Reverse(price)),
            OrderSide::Ask => self.asks.get_mut(&price),
        };
        level
            .and_then(|l| l.get_mut(order_id))
            .ok_or(DexError::TickNotFound(*order_id))
    }

    // =================================================================
    // Queries
    // =================================================================

    #[must_use]
    pub fn get(&self, order_id: &OrderId) -> Option<&Tick> {
        let (side, price) = self.index.get(order_id)?;
        match side {
            OrderSide::Bid => self.bids.get(&Reverse(*price))?.get(order_id),
            OrderSide::Ask => self.asks.get(price)?.get(order_id),
        }
    }

    #[must_use]
    pub fn contains(&self, order_id: &OrderId) -> bool {
        self.index.contains_key(order_id)
    }

    /// Best (highest) bid price, or `None` if no bids.
    #[must_use]
    pub fn best_bid(&self) -> Option<Price> {
        self.bids.keys().next().map(|r| r.0)
    }

    /// Best (lowest) ask price, or `None` if no asks.
    #[must_use]
    pub fn best_ask(&self) -> Option<Price> {
        self.asks.keys().next().copied()
    }

    /// Total number of ticks currently in the book.
    #[must_use]
    pub fn tick_count(&self) -> usize {
        self.index.len()
    }

    /// Number of distinct bid price levels.
    #[must_use]
    pub fn bid_depth(&self) -> usize {
        self.bids.len()
    }

    /// Number of distinct ask price levels.
    #[must_use]
    pub fn ask_depth(&self) -> usize {
        self.asks.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    // =================================================================
    // Iteration (for the matcher)
    // =================================================================

    /// Iterate bid levels from best (highest) to worst.
    pub fn bid_levels(&self) -> impl Iterator<Item = &PriceLevel> {
        self.bids.values()
    }

    /// Iterate ask levels from best (lowest) to worst.
    pub fn ask_levels(&self) -> impl Iterator<Item = &PriceLevel> {
        self.asks.values()
    }

    /// Every tick on `side` in price-time priority.
    pub fn ticks(&self, side: OrderSide) -> Box<dyn Iterator<Item = &Tick> + '_> {
        match side {
            OrderSide::Bid => Box::new(self.bid_levels().flat_map(|l| l.ticks.iter())),
            OrderSide::Ask => Box::new(self.ask_levels().flat_map(|l| l.ticks.iter())),
        }
    }

    // =================================================================
    // Maintenance
    // =================================================================

    /// Remove every tick that has timed out at `now`.
    pub fn remove_expired(&mut self, now: Timestamp) -> Vec<Tick> {
        let expired: Vec<OrderId> = self
            .ticks(OrderSide::Bid)
            .chain(self.ticks(OrderSide::Ask))
            .filter(|t| t.is_expired(now))
            .map(Tick::order_id)
            .collect();
        expired
            .iter()
            .filter_map(|id| self.remove(id).ok())
            .collect()
    }
}
