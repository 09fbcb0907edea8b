//! Local order store.
//!
//! Holds the trader's own [`Order`]s and is the only place their quantity
//! accounting is mutated. Peers' orders never live here; the book only
//! sees their ticks.

use std::collections::HashMap;

use p2pdex_orderbook::LocalOrders;
use p2pdex_types::{DexError, Order, OrderId, Quantity, Result, TraderId};

/// The local trader's orders, keyed by ID.
#[derive(Debug)]
pub struct OrderManager {
    trader: TraderId,
    orders: HashMap<OrderId, Order>,
}

impl OrderManager {
    #[must_use]
    pub fn new(trader: TraderId) -> Self {
        Self {
            trader,
            orders: HashMap::new(),
        }
    }

    /// Take ownership of a freshly created order.
    ///
    /// # Errors
    /// `InvalidOrder` if the order belongs to another trader,
    /// `InvariantViolation` if the ID is already taken.
    pub fn insert(&mut self, order: Order) -> Result<()> {
        let id = order.id();
        if !id.is_owned_by(&self.trader) {
            return Err(DexError::InvalidOrder {
                reason: format!("order {id} is not owned by {}", self.trader),
            });
        }
        if self.orders.contains_key(&id) {
            return Err(DexError::InvariantViolation(format!(
                "order {id} inserted twice"
            )));
        }
        self.orders.insert(id, order);
        Ok(())
    }

    #[must_use]
    pub fn get(&self, order_id: &OrderId) -> Option<&Order> {
        self.orders.get(order_id)
    }

    fn get_mut(&mut self, order_id: &OrderId) -> Result<&mut Order> {
        self.orders
            .get_mut(order_id)
            .ok_or(DexError::OrderNotFound(*order_id))
    }

    pub fn reserve(&mut self, order_id: &OrderId, quantity: Quantity) -> Result<()> {
        self.get_mut(order_id)?.reserve_quantity(quantity)
    }

    pub fn release(&mut self, order_id: &OrderId, quantity: Quantity) -> Result<()> {
        self.get_mut(order_id)?.release_quantity(quantity)
    }

    /// Convert a settled reservation into traded quantity.
    pub fn commit(&mut self, order_id: &OrderId, quantity: Quantity) -> Result<()> {
        self.get_mut(order_id)?.commit_traded(quantity)
    }

    pub fn cancel(&mut self, order_id: &OrderId) -> Result<()> {
        self.get_mut(order_id)?.cancel();
        Ok(())
    }

    pub fn iter(&self) -> impl Iterator<Item = &Order> {
        self.orders.values()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.orders.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }
}

impl LocalOrders for OrderManager {
    fn is_local(&self, order_id: &OrderId) -> bool {
        self.orders.contains_key(order_id)
    }

    fn reserve(&mut self, order_id: &OrderId, quantity: Quantity) -> Result<()> {
        OrderManager::reserve(self, order_id, quantity)
    }
}
