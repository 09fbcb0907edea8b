//! Negotiation state.
//!
//! One negotiation is one counter-party interaction over a pair of orders
//! (ours, theirs):
//!
//! ```text
//!                ┌──────────┐
//!                │ PROPOSED │ (our proposal or counter, reservation held)
//!                └────┬─────┘
//!   ┌─────────┬───────┼──────────────┬───────────┬────────────┐
//!   ▼         ▼       ▼              ▼           ▼            ▼
//! ACCEPTED DECLINED COUNTER_PROPOSED TIMED_OUT CANCELLED  SUPERSEDED
//! ```
//!
//! `ACCEPTED` hands the reservation to a transaction; every other outcome
//! releases it. A counter-proposal is a fresh `PROPOSED` from the other
//! party's side, one level deeper.
//!
//! The acceptor side keeps an [`AcceptedHold`] between sending
//! `accepted-trade` and receiving `start-transaction`.

use std::collections::{HashMap, VecDeque};
use std::fmt;

use p2pdex_types::{
    DexError, MessageId, OrderId, OrderSide, Price, Quantity, Result, Timestamp, constants,
};

/// Lifecycle of one proposal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NegotiationState {
    Proposed,
    Accepted,
    Declined,
    CounterProposed,
    TimedOut,
    Cancelled,
    /// Lost a crossing-proposal tie-break to the counter-party's proposal.
    Superseded,
}

impl NegotiationState {
    #[must_use]
    pub fn can_transition_to(&self, target: Self) -> bool {
        *self == Self::Proposed && target != Self::Proposed
    }
}

impl fmt::Display for NegotiationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Proposed => write!(f, "PROPOSED"),
            Self::Accepted => write!(f, "ACCEPTED"),
            Self::Declined => write!(f, "DECLINED"),
            Self::CounterProposed => write!(f, "COUNTER_PROPOSED"),
            Self::TimedOut => write!(f, "TIMED_OUT"),
            Self::Cancelled => write!(f, "CANCELLED"),
            Self::Superseded => write!(f, "SUPERSEDED"),
        }
    }
}

/// A proposed or counter trade we sent and are waiting on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingProposal {
    pub message_id: MessageId,
    pub local_order_id: OrderId,
    pub remote_order_id: OrderId,
    pub local_side: OrderSide,
    pub price: Price,
    pub quantity: Quantity,
    /// Counter-offer rounds so far (0 for an opening proposal).
    pub depth: u32,
    /// Whether `quantity` is also reserved on the counter-party's tick.
    pub remote_reserved: bool,
    pub deadline: Timestamp,
}

impl PendingProposal {
    #[must_use]
    pub fn is_expired(&self, now: Timestamp) -> bool {
        now >= self.deadline
    }
}

/// Our reservation behind an `accepted-trade`, until the proposer starts
/// the transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcceptedHold {
    /// Our `accepted-trade` message.
    pub accepted_id: MessageId,
    pub local_order_id: OrderId,
    pub remote_order_id: OrderId,
    pub local_side: OrderSide,
    pub price: Price,
    pub quantity: Quantity,
    /// Whether `quantity` is also reserved on the proposer's tick.
    pub remote_reserved: bool,
    pub deadline: Timestamp,
}

impl AcceptedHold {
    #[must_use]
    pub fn is_expired(&self, now: Timestamp) -> bool {
        now >= self.deadline
    }
}

/// Open proposals and holds, plus a bounded record of concluded outcomes.
#[derive(Debug)]
pub struct NegotiationTable {
    pending: HashMap<MessageId, PendingProposal>,
    /// `(our order, their order)` -> pending proposal. At most one per pair.
    by_pair: HashMap<(OrderId, OrderId), MessageId>,
    holds: HashMap<MessageId, AcceptedHold>,
    outcomes: HashMap<MessageId, NegotiationState>,
    outcome_order: VecDeque<MessageId>,
    max_outcomes: usize,
}

impl Default for NegotiationTable {
    fn default() -> Self {
        Self::with_history(constants::NEGOTIATION_HISTORY_SIZE)
    }
}

impl NegotiationTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_history(max_outcomes: usize) -> Self {
        Self {
            pending: HashMap::new(),
            by_pair: HashMap::new(),
            holds: HashMap::new(),
            outcomes: HashMap::new(),
            outcome_order: VecDeque::new(),
            max_outcomes: max_outcomes.max(1),
        }
    }

    // =================================================================
    // Pending proposals
    // =================================================================

    /// Track a proposal we just sent.
    ///
    /// # Errors
    /// `InvariantViolation` if the pair already has a pending proposal.
    pub fn insert_pending(&mut self, proposal: PendingProposal) -> Result<()> {
        let pair = (proposal.local_order_id, proposal.remote_order_id);
        if let Some(existing) = self.by_pair.get(&pair) {
            return Err(DexError::InvariantViolation(format!(
                "pair {} / {} already negotiating under {existing}",
                pair.0, pair.1
            )));
        }
        self.by_pair.insert(pair, proposal.message_id);
        self.pending.insert(proposal.message_id, proposal);
        Ok(())
    }

    #[must_use]
    pub fn pending_for(&self, local: &OrderId, remote: &OrderId) -> Option<&PendingProposal> {
        self.by_pair
            .get(&(*local, *remote))
            .and_then(|id| self.pending.get(id))
    }

    #[must_use]
    pub fn has_pending(&self, local: &OrderId, remote: &OrderId) -> bool {
        self.by_pair.contains_key(&(*local, *remote))
    }

    pub fn take_pending_for(&mut self, local: &OrderId, remote: &OrderId) -> Option<PendingProposal> {
        let id = self.by_pair.remove(&(*local, *remote))?;
        self.pending.remove(&id)
    }

    /// Remove every pending proposal made for `local`.
    pub fn take_pending_for_order(&mut self, local: &OrderId) -> Vec<PendingProposal> {
        let pairs: Vec<(OrderId, OrderId)> = self
            .by_pair
            .keys()
            .filter(|(l, _)| l == local)
            .copied()
            .collect();
        let mut taken: Vec<PendingProposal> = pairs
            .iter()
            .filter_map(|(l, r)| self.take_pending_for(l, r))
            .collect();
        taken.sort_by_key(|p| p.message_id);
        taken
    }

    /// Remove every pending proposal whose response deadline has passed,
    /// oldest message first.
    pub fn take_expired_pending(&mut self, now: Timestamp) -> Vec<PendingProposal> {
        let mut expired: Vec<MessageId> = self
            .pending
            .values()
            .filter(|p| p.is_expired(now))
            .map(|p| p.message_id)
            .collect();
        expired.sort();
        expired
            .iter()
            .filter_map(|id| {
                let p = self.pending.remove(id)?;
                self.by_pair.remove(&(p.local_order_id, p.remote_order_id));
                Some(p)
            })
            .collect()
    }

    // =================================================================
    // Accepted holds
    // =================================================================

    pub fn insert_hold(&mut self, hold: AcceptedHold) {
        self.holds.insert(hold.accepted_id, hold);
    }

    #[must_use]
    pub fn hold(&self, accepted_id: &MessageId) -> Option<&AcceptedHold> {
        self.holds.get(accepted_id)
    }

    pub fn take_hold(&mut self, accepted_id: &MessageId) -> Option<AcceptedHold> {
        self.holds.remove(accepted_id)
    }

    pub fn take_expired_holds(&mut self, now: Timestamp) -> Vec<AcceptedHold> {
        let mut expired: Vec<MessageId> = self
            .holds
            .values()
            .filter(|h| h.is_expired(now))
            .map(|h| h.accepted_id)
            .collect();
        expired.sort();
        expired
            .iter()
            .filter_map(|id| self.holds.remove(id))
            .collect()
    }

    // =================================================================
    // Outcomes
    // =================================================================

    /// Record how a proposal (ours or theirs) concluded.
    pub fn conclude(&mut self, proposal_id: MessageId, outcome: NegotiationState) {
        debug_assert!(
            NegotiationState::Proposed.can_transition_to(outcome),
            "{outcome} is not a conclusion"
        );
        if self.outcomes.insert(proposal_id, outcome).is_none() {
            self.outcome_order.push_back(proposal_id);
        }
        while self.outcome_order.len() > self.max_outcomes {
            if let Some(old) = self.outcome_order.pop_front() {
                self.outcomes.remove(&old);
            }
        }
    }

    /// Current state of a proposal: `Proposed` while pending, its outcome
    /// once concluded, `None` if unknown or forgotten.
    #[must_use]
    pub fn state(&self, proposal_id: &MessageId) -> Option<NegotiationState> {
        if self.pending.contains_key(proposal_id) {
            return Some(NegotiationState::Proposed);
        }
        self.outcomes.get(proposal_id).copied()
    }

    pub fn pending(&self) -> impl Iterator<Item = &PendingProposal> {
        self.pending.values()
    }

    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    #[must_use]
    pub fn hold_count(&self) -> usize {
        self.holds.len()
    }
}
