//! The gossip-visible projection of an order.
//!
//! A [`Tick`] is what the order book holds and matches on. The book owns
//! every tick it stores and only exposes transition operations
//! ([`Tick::reserve`], [`Tick::release`], [`Tick::consume`]); the
//! reservation counter is local state and is never serialized.
//!
//! For the local trader's own orders the tick is regenerated from the
//! [`Order`] after every mutation, so its reservation mirrors the order's.

use serde::{Deserialize, Serialize};

use crate::{DexError, Order, OrderId, OrderSide, Price, Quantity, Result, Timeout, Timestamp};

/// A possibly-stale view of an order at the time it was published.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tick {
    order_id: OrderId,
    side: OrderSide,
    price: Price,
    /// Tradable amount at publish time.
    quantity: Quantity,
    timeout: Timeout,
    timestamp: Timestamp,
    /// Portion of `quantity` pledged to in-flight negotiations.
    #[serde(skip)]
    reserved: Quantity,
}

impl Tick {
    /// A tick as published by a peer (nothing reserved yet).
    #[must_use]
    pub fn new(
        order_id: OrderId,
        side: OrderSide,
        price: Price,
        quantity: Quantity,
        timeout: Timeout,
        timestamp: Timestamp,
    ) -> Self {
        Self {
            order_id,
            side,
            price,
            quantity,
            timeout,
            timestamp,
            reserved: Quantity::ZERO,
        }
    }

    /// The book entry for a local order: everything not yet traded, with the
    /// order's current reservation.
    #[must_use]
    pub fn from_order(order: &Order) -> Self {
        Self {
            order_id: order.id(),
            side: order.side(),
            price: order.price(),
            quantity: order.untraded_quantity(),
            timeout: order.timeout(),
            timestamp: order.timestamp(),
            reserved: order.reserved_quantity(),
        }
    }

    #[must_use]
    pub fn order_id(&self) -> OrderId {
        self.order_id
    }

    #[must_use]
    pub fn side(&self) -> OrderSide {
        self.side
    }

    #[must_use]
    pub fn price(&self) -> Price {
        self.price
    }

    /// Tradable amount at publish time, reserved portion included.
    #[must_use]
    pub fn quantity(&self) -> Quantity {
        self.quantity
    }

    #[must_use]
    pub fn timeout(&self) -> Timeout {
        self.timeout
    }

    #[must_use]
    pub fn timestamp(&self) -> Timestamp {
        self.timestamp
    }

    #[must_use]
    pub fn is_ask(&self) -> bool {
        self.side == OrderSide::Ask
    }

    #[must_use]
    pub fn reserved_quantity(&self) -> Quantity {
        self.reserved
    }

    /// Quantity still open to new reservations.
    #[must_use]
    pub fn remaining(&self) -> Quantity {
        self.quantity.saturating_sub(self.reserved)
    }

    /// Fully pledged: nothing left to reserve.
    #[must_use]
    pub fn is_reserved(&self) -> bool {
        self.remaining().is_zero()
    }

    #[must_use]
    pub fn is_expired(&self, now: Timestamp) -> bool {
        self.timeout.is_timed_out(self.timestamp, now)
    }

    /// Not expired and not fully reserved.
    #[must_use]
    pub fn is_valid(&self, now: Timestamp) -> bool {
        !self.is_expired(now) && !self.is_reserved()
    }

    /// Pledge `quantity` of this tick.
    ///
    /// # Errors
    /// `InsufficientQuantity` if less than `quantity` remains.
    pub fn reserve(&mut self, quantity: Quantity) -> Result<()> {
        let available = self.remaining();
        if quantity > available {
            return Err(DexError::InsufficientQuantity {
                requested: quantity,
                available,
            });
        }
        self.reserved = self.reserved.checked_add(quantity).ok_or_else(|| {
            DexError::InvariantViolation(format!("tick reserve overflow on {}", self.order_id))
        })?;
        Ok(())
    }

    /// Return a pledge.
    ///
    /// # Errors
    /// `TickReservationUnderflow` if more than is reserved is released. The
    /// reservation is left untouched in that case.
    pub fn release(&mut self, quantity: Quantity) -> Result<()> {
        self.reserved = self
            .reserved
            .checked_sub(quantity)
            .ok_or(DexError::TickReservationUnderflow(self.order_id))?;
        Ok(())
    }

    /// Return up to `quantity` of a pledge and report how much was actually
    /// released. A republish can clamp the reservation below what was
    /// pledged; the shortfall is already gone.
    pub fn release_up_to(&mut self, quantity: Quantity) -> Quantity {
        let released = quantity.min(self.reserved);
        self.reserved = self.reserved.saturating_sub(released);
        released
    }

    /// Remove traded quantity from the tick. A reserved portion is consumed
    /// first, then unreserved quantity. Returns `true` if nothing is left.
    pub fn consume(&mut self, quantity: Quantity, from_reserved: bool) -> bool {
        if from_reserved {
            self.reserved = self.reserved.saturating_sub(quantity);
        }
        self.quantity = self.quantity.saturating_sub(quantity);
        if self.reserved > self.quantity {
            self.reserved = self.quantity;
        }
        self.quantity.is_zero()
    }

    /// Carry an existing reservation over to a republished view of the same
    /// order, clamped to the new quantity.
    pub fn inherit_reservation(&mut self, previous: &Self) {
        self.reserved = previous.reserved.min(self.quantity);
    }
}

/// Test helpers.
#[cfg(any(test, feature = "test-helpers"))]
impl Tick {
    /// A tick with a fresh random owner and a 1 hour timeout.
    pub fn dummy(side: OrderSide, price_mil: i64, quantity_mil: i64) -> Self {
        Self::new(
            OrderId::new(crate::TraderId::random(), crate::OrderNumber(1)),
            side,
            Price::from_mil(price_mil).expect("valid test price"),
            Quantity::from_mil(quantity_mil).expect("valid test quantity"),
            Timeout::from_secs(3600),
            Timestamp::now(),
        )
    }
}
