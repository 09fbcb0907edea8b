//! Order types for the p2pdex trading core.
//!
//! An [`Order`] is the local trader's standing intent to buy or sell. It owns
//! the quantity accounting that keeps the node from selling the same units
//! twice:
//!
//! ```text
//!   total = available + reserved + traded
//!
//!   reserve(q):  available → reserved   (proposal sent / accepted)
//!   release(q):  reserved  → available  (declined / timed out / aborted)
//!   commit(q):   reserved  → traded     (transaction completed)
//! ```
//!
//! `reserved + traded <= total` holds after every operation. Orders from
//! peers are never mutated; only their [`Tick`](crate::Tick) projections are
//! compared.

use serde::{Deserialize, Serialize};

use crate::{DexError, OrderId, Price, Quantity, Result, Timeout, Timestamp};

/// Which side of the book this order is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub enum OrderSide {
    /// Sell intent.
    Ask,
    /// Buy intent.
    Bid,
}

impl OrderSide {
    /// The side this side trades against.
    #[must_use]
    pub fn opposite(self) -> Self {
        match self {
            Self::Ask => Self::Bid,
            Self::Bid => Self::Ask,
        }
    }

    /// Whether a trade at `price` is acceptable for an order on this side
    /// with limit `limit`. Equal prices are always compatible.
    #[must_use]
    pub fn accepts(self, limit: Price, price: Price) -> bool {
        match self {
            Self::Ask => price >= limit,
            Self::Bid => price <= limit,
        }
    }
}

impl std::fmt::Display for OrderSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ask => write!(f, "ASK"),
            Self::Bid => write!(f, "BID"),
        }
    }
}

/// Lifecycle status of an order, derived at a point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderStatus {
    /// Has unreserved quantity and is not expired.
    Active,
    /// Everything not yet traded is pledged to in-flight negotiations.
    FullyReserved,
    /// All quantity traded.
    Filled,
    /// Timed out.
    Expired,
    /// Cancelled by the owner.
    Cancelled,
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Active => write!(f, "ACTIVE"),
            Self::FullyReserved => write!(f, "FULLY_RESERVED"),
            Self::Filled => write!(f, "FILLED"),
            Self::Expired => write!(f, "EXPIRED"),
            Self::Cancelled => write!(f, "CANCELLED"),
        }
    }
}

/// A local order with reservation accounting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    id: OrderId,
    side: OrderSide,
    price: Price,
    total_quantity: Quantity,
    reserved_quantity: Quantity,
    traded_quantity: Quantity,
    timeout: Timeout,
    timestamp: Timestamp,
    cancelled: bool,
}

impl Order {
    /// Create an order. The ID comes from the trader's
    /// [`TraderSequence`](crate::TraderSequence).
    ///
    /// # Errors
    /// `InvalidOrder` if the price or quantity is zero.
    pub fn new(
        id: OrderId,
        side: OrderSide,
        price: Price,
        quantity: Quantity,
        timeout: Timeout,
        timestamp: Timestamp,
    ) -> Result<Self> {
        if !price.is_positive() {
            return Err(DexError::InvalidOrder {
                reason: "price must be positive".to_string(),
            });
        }
        if quantity.is_zero() {
            return Err(DexError::InvalidOrder {
                reason: "quantity must be positive".to_string(),
            });
        }
        Ok(Self {
            id,
            side,
            price,
            total_quantity: quantity,
            reserved_quantity: Quantity::ZERO,
            traded_quantity: Quantity::ZERO,
            timeout,
            timestamp,
            cancelled: false,
        })
    }

    #[must_use]
    pub fn id(&self) -> OrderId {
        self.id
    }

    #[must_use]
    pub fn side(&self) -> OrderSide {
        self.side
    }

    #[must_use]
    pub fn is_ask(&self) -> bool {
        self.side == OrderSide::Ask
    }

    #[must_use]
    pub fn price(&self) -> Price {
        self.price
    }

    #[must_use]
    pub fn total_quantity(&self) -> Quantity {
        self.total_quantity
    }

    #[must_use]
    pub fn reserved_quantity(&self) -> Quantity {
        self.reserved_quantity
    }

    #[must_use]
    pub fn traded_quantity(&self) -> Quantity {
        self.traded_quantity
    }

    #[must_use]
    pub fn timeout(&self) -> Timeout {
        self.timeout
    }

    #[must_use]
    pub fn timestamp(&self) -> Timestamp {
        self.timestamp
    }

    /// Quantity neither reserved nor traded.
    #[must_use]
    pub fn available_quantity(&self) -> Quantity {
        self.total_quantity
            .saturating_sub(self.reserved_quantity)
            .saturating_sub(self.traded_quantity)
    }

    /// Quantity not yet traded (available + reserved).
    #[must_use]
    pub fn untraded_quantity(&self) -> Quantity {
        self.total_quantity.saturating_sub(self.traded_quantity)
    }

    #[must_use]
    pub fn is_expired(&self, now: Timestamp) -> bool {
        self.timeout.is_timed_out(self.timestamp, now)
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled
    }

    #[must_use]
    pub fn is_filled(&self) -> bool {
        self.traded_quantity == self.total_quantity
    }

    /// Not expired, not cancelled, and has a tradable remainder.
    #[must_use]
    pub fn is_valid(&self, now: Timestamp) -> bool {
        !self.cancelled && !self.is_expired(now) && !self.available_quantity().is_zero()
    }

    #[must_use]
    pub fn status(&self, now: Timestamp) -> OrderStatus {
        if self.cancelled {
            OrderStatus::Cancelled
        } else if self.is_filled() {
            OrderStatus::Filled
        } else if self.is_expired(now) {
            OrderStatus::Expired
        } else if self.available_quantity().is_zero() {
            OrderStatus::FullyReserved
        } else {
            OrderStatus::Active
        }
    }

    /// Pledge `quantity` to an in-flight negotiation.
    ///
    /// # Errors
    /// - `OrderNotValid` if the order is cancelled
    /// - `InsufficientQuantity` if less than `quantity` is available
    pub fn reserve_quantity(&mut self, quantity: Quantity) -> Result<()> {
        if self.cancelled {
            return Err(DexError::OrderNotValid(self.id));
        }
        let available = self.available_quantity();
        if quantity > available {
            return Err(DexError::InsufficientQuantity {
                requested: quantity,
                available,
            });
        }
        self.reserved_quantity = self
            .reserved_quantity
            .checked_add(quantity)
            .ok_or_else(|| DexError::InvariantViolation(format!("reserve overflow on {}", self.id)))?;
        Ok(())
    }

    /// Return a reservation to the available pool.
    ///
    /// Releasing more than is reserved is a contract violation: it asserts in
    /// debug builds and is refused in release builds.
    pub fn release_quantity(&mut self, quantity: Quantity) -> Result<()> {
        debug_assert!(
            quantity <= self.reserved_quantity,
            "release of {quantity} exceeds reservation {} on {}",
            self.reserved_quantity,
            self.id
        );
        self.reserved_quantity = self.reserved_quantity.checked_sub(quantity).ok_or_else(|| {
            DexError::InvariantViolation(format!(
                "release of {quantity} exceeds reservation {} on {}",
                self.reserved_quantity, self.id
            ))
        })?;
        Ok(())
    }

    /// Convert a reservation into traded quantity (permanent).
    ///
    /// # Errors
    /// `InsufficientReservation` if less than `quantity` is reserved. This is
    /// a contract violation and also asserts in debug builds.
    pub fn commit_traded(&mut self, quantity: Quantity) -> Result<()> {
        debug_assert!(
            quantity <= self.reserved_quantity,
            "commit of {quantity} exceeds reservation {} on {}",
            self.reserved_quantity,
            self.id
        );
        let reserved = self
            .reserved_quantity
            .checked_sub(quantity)
            .ok_or(DexError::InsufficientReservation {
                requested: quantity,
                reserved: self.reserved_quantity,
            })?;
        self.reserved_quantity = reserved;
        self.traded_quantity = self
            .traded_quantity
            .checked_add(quantity)
            .ok_or_else(|| DexError::InvariantViolation(format!("trade overflow on {}", self.id)))?;
        Ok(())
    }

    /// Mark the order cancelled. Outstanding reservations stay until their
    /// negotiations or transactions resolve.
    pub fn cancel(&mut self) {
        self.cancelled = true;
    }
}

/// Test helpers.
#[cfg(any(test, feature = "test-helpers"))]
impl Order {
    /// An order with a fresh random trader and a 1 hour timeout.
    pub fn dummy(side: OrderSide, price_mil: i64, quantity_mil: i64) -> Self {
        Self::dummy_for(
            crate::OrderId::new(crate::TraderId::random(), crate::OrderNumber(1)),
            side,
            price_mil,
            quantity_mil,
        )
    }

    pub fn dummy_for(id: OrderId, side: OrderSide, price_mil: i64, quantity_mil: i64) -> Self {
        Self::new(
            id,
            side,
            Price::from_mil(price_mil).expect("valid test price"),
            Quantity::from_mil(quantity_mil).expect("valid test quantity"),
            Timeout::from_secs(3600),
            Timestamp::now(),
        )
        .expect("valid test order")
    }
}
