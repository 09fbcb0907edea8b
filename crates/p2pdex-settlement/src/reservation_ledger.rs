//! Reservation conservation checker.
//!
//! Every reservation a node creates is registered here under the ID of the
//! message that created it (our proposed or accepted trade). It must end
//! exactly once:
//!
//! ```text
//!   ┌──────┐  transaction completed  ┌────────┐
//!   │ HELD ├────────────────────────▶│ TRADED │
//!   └──┬───┘                         └────────┘
//!      │ declined / timed out / aborted / cancelled
//!      ▼
//!   ┌──────────┐
//!   │ RELEASED │
//!   └──────────┘
//! ```
//!
//! and, per order, the sum of held entries must equal the order's
//! `reserved_quantity`.
//!
//! Closed entries move to a bounded history (oldest forgotten first), so a
//! long-running node only keeps what is still held plus recent outcomes.

use std::collections::{HashMap, VecDeque};

use p2pdex_types::{DexError, MessageId, OrderId, Quantity, Result, constants};

/// Lifecycle of one reservation. Transitions are monotonic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReservationState {
    Held,
    Traded,
    Released,
}

impl ReservationState {
    #[must_use]
    pub fn can_transition_to(&self, target: Self) -> bool {
        matches!((self, target), (Self::Held, Self::Traded | Self::Released))
    }
}

impl std::fmt::Display for ReservationState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Held => write!(f, "HELD"),
            Self::Traded => write!(f, "TRADED"),
            Self::Released => write!(f, "RELEASED"),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Entry {
    order_id: OrderId,
    quantity: Quantity,
    state: ReservationState,
}

/// Tracks every reservation from creation to its single terminal outcome.
#[derive(Debug)]
pub struct ReservationLedger {
    held: HashMap<MessageId, Entry>,
    closed: HashMap<MessageId, Entry>,
    closed_order: VecDeque<MessageId>,
    max_closed: usize,
    /// Running traded total per order; survives history eviction.
    traded: HashMap<OrderId, Quantity>,
}

impl Default for ReservationLedger {
    fn default() -> Self {
        Self::with_history(constants::RESERVATION_HISTORY_SIZE)
    }
}

impl ReservationLedger {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_history(max_closed: usize) -> Self {
        Self {
            held: HashMap::new(),
            closed: HashMap::new(),
            closed_order: VecDeque::new(),
            max_closed: max_closed.max(1),
            traded: HashMap::new(),
        }
    }

    /// Register a new held reservation.
    pub fn open(&mut self, key: MessageId, order_id: OrderId, quantity: Quantity) -> Result<()> {
        if self.held.contains_key(&key) || self.closed.contains_key(&key) {
            return Err(DexError::InvariantViolation(format!(
                "reservation {key} opened twice"
            )));
        }
        self.held.insert(
            key,
            Entry {
                order_id,
                quantity,
                state: ReservationState::Held,
            },
        );
        Ok(())
    }

    /// Held → Traded.
    pub fn settle(&mut self, key: &MessageId) -> Result<Quantity> {
        let entry = self.close(key, ReservationState::Traded)?;
        let total = self.traded.entry(entry.order_id).or_insert(Quantity::ZERO);
        *total = total.checked_add(entry.quantity).ok_or_else(|| {
            DexError::InvariantViolation(format!("traded total overflow on {}", entry.order_id))
        })?;
        Ok(entry.quantity)
    }

    /// Held → Released.
    pub fn release(&mut self, key: &MessageId) -> Result<Quantity> {
        self.close(key, ReservationState::Released)
            .map(|entry| entry.quantity)
    }

    fn close(&mut self, key: &MessageId, target: ReservationState) -> Result<Entry> {
        if let Some(entry) = self.closed.get(key) {
            return Err(DexError::InvariantViolation(format!(
                "reservation {key} cannot move {} -> {target}",
                entry.state
            )));
        }
        let mut entry = self
            .held
            .remove(key)
            .ok_or_else(|| DexError::InvariantViolation(format!("unknown reservation {key}")))?;
        debug_assert!(entry.state.can_transition_to(target));
        entry.state = target;

        self.closed.insert(*key, entry);
        self.closed_order.push_back(*key);
        while self.closed_order.len() > self.max_closed {
            if let Some(old) = self.closed_order.pop_front() {
                self.closed.remove(&old);
            }
        }
        Ok(entry)
    }

    /// `None` once the key is unknown or its outcome has been forgotten.
    #[must_use]
    pub fn state(&self, key: &MessageId) -> Option<ReservationState> {
        self.held
            .get(key)
            .or_else(|| self.closed.get(key))
            .map(|e| e.state)
    }

    /// Sum of held reservations on `order_id`.
    #[must_use]
    pub fn held_total(&self, order_id: &OrderId) -> Quantity {
        self.held
            .values()
            .filter(|e| e.order_id == *order_id)
            .map(|e| e.quantity)
            .sum()
    }

    /// Sum of traded reservations on `order_id`.
    #[must_use]
    pub fn traded_total(&self, order_id: &OrderId) -> Quantity {
        self.traded.get(order_id).copied().unwrap_or(Quantity::ZERO)
    }

    /// Verify the order's own accounting against the ledger.
    ///
    /// # Errors
    /// Returns [`DexError::InvariantViolation`] if the held total differs
    /// from `actual_reserved`.
    pub fn verify(&self, order_id: &OrderId, actual_reserved: Quantity) -> Result<()> {
        let held = self.held_total(order_id);
        if held != actual_reserved {
            return Err(DexError::InvariantViolation(format!(
                "order {order_id}: reserved {actual_reserved} != held {held}"
            )));
        }
        Ok(())
    }

    /// Number of reservations still held.
    #[must_use]
    pub fn open_count(&self) -> usize {
        self.held.len()
    }

    /// Held reservations plus remembered outcomes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.held.len() + self.closed.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.held.is_empty() && self.closed.is_empty()
    }
}
