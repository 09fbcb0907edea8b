//! Settlement record for one accepted trade.
//!
//! ## State Machine
//!
//! ```text
//!   ┌─────────┐ first rail ┌───────────────┐ second rail ┌───────────┐
//!   │ STARTED ├───────────▶│ PARTIALLY_PAID├────────────▶│ COMPLETED │
//!   └──┬───┬──┘            └──────┬───┬────┘             └───────────┘
//!      │   │ amount mismatch      │   │
//!      │   └──────────┐ ┌─────────┘   │
//!      │              ▼ ▼             │
//!      │          ┌─────────┐         │
//!      │          │ FLAGGED │         │
//!      │          └────┬────┘         │
//!      │ deadline      │ deadline     │ deadline
//!      ▼               ▼              ▼
//!   ┌─────────────────────────────────────┐
//!   │               ABORTED               │
//!   └─────────────────────────────────────┘
//! ```
//!
//! Each rail accepts exactly one payment. A redelivery of the recorded
//! payment is a no-op; any other payment on a recorded rail is rejected. A
//! payment whose amount differs from the agreed quantity flags the
//! transaction for external dispute handling: it keeps the mismatch record,
//! never completes, and aborts at its deadline.

use serde::{Deserialize, Serialize};

use p2pdex_types::{
    BitcoinAddress, BitcoinPayment, DexError, MessageId, MultiChainPayment, OrderId, OrderSide,
    PaymentRail, Price, Quantity, Result, Timestamp, TraderId, TransactionId,
};

/// Lifecycle state of a [`Transaction`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransactionState {
    /// Created on acceptance; no payment yet.
    Started,
    /// One rail recorded.
    PartiallyPaid,
    /// Both rails recorded and reconciled. **Irreversible.**
    Completed,
    /// A rail payment did not reconcile with the agreed quantity.
    Flagged,
    /// Deadline passed without completion.
    Aborted,
}

impl TransactionState {
    #[must_use]
    pub fn can_transition_to(&self, target: Self) -> bool {
        use TransactionState::{Aborted, Completed, Flagged, PartiallyPaid, Started};
        matches!(
            (self, target),
            (Started, PartiallyPaid | Completed | Flagged | Aborted)
                | (PartiallyPaid, Completed | Flagged | Aborted)
                | (Flagged, Aborted)
        )
    }

    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Aborted)
    }
}

impl std::fmt::Display for TransactionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Started => write!(f, "STARTED"),
            Self::PartiallyPaid => write!(f, "PARTIALLY_PAID"),
            Self::Completed => write!(f, "COMPLETED"),
            Self::Flagged => write!(f, "FLAGGED"),
            Self::Aborted => write!(f, "ABORTED"),
        }
    }
}

/// A payment claim recorded against one rail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordedPayment {
    pub message_id: MessageId,
    /// The amount reconciled against the agreed quantity.
    pub quantity: Quantity,
    /// Multi-chain only: the counter-value sent back.
    pub transferee_quantity: Option<Quantity>,
    /// Multi-chain only: where the bitcoin leg should go.
    pub bitcoin_address: Option<BitcoinAddress>,
    pub timestamp: Timestamp,
}

impl From<&MultiChainPayment> for RecordedPayment {
    fn from(p: &MultiChainPayment) -> Self {
        Self {
            message_id: p.message_id,
            quantity: p.transferor_quantity,
            transferee_quantity: Some(p.transferee_quantity),
            bitcoin_address: Some(p.bitcoin_address.clone()),
            timestamp: p.timestamp,
        }
    }
}

impl From<&BitcoinPayment> for RecordedPayment {
    fn from(p: &BitcoinPayment) -> Self {
        Self {
            message_id: p.message_id,
            quantity: p.quantity,
            transferee_quantity: None,
            bitcoin_address: None,
            timestamp: p.timestamp,
        }
    }
}

/// What recording a payment did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentOutcome {
    /// Redelivery of an already recorded payment. Nothing changed.
    Duplicate,
    /// Recorded; the other rail is still outstanding (or flagged).
    Recorded,
    /// Recorded and both rails now reconcile.
    Completed,
    /// Recorded, but the amount did not reconcile.
    Flagged,
}

/// Terms fixed at acceptance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionTerms {
    pub transaction_id: TransactionId,
    pub local_order_id: OrderId,
    pub local_side: OrderSide,
    pub remote_order_id: OrderId,
    /// The accepted-trade message that fixed the terms.
    pub accepted_trade_id: MessageId,
    pub price: Price,
    pub quantity: Quantity,
}

impl TransactionTerms {
    #[must_use]
    pub fn counterparty(&self) -> TraderId {
        self.remote_order_id.trader_id
    }

    #[must_use]
    pub fn ask_order_id(&self) -> OrderId {
        match self.local_side {
            OrderSide::Ask => self.local_order_id,
            OrderSide::Bid => self.remote_order_id,
        }
    }

    #[must_use]
    pub fn bid_order_id(&self) -> OrderId {
        match self.local_side {
            OrderSide::Ask => self.remote_order_id,
            OrderSide::Bid => self.local_order_id,
        }
    }
}

/// A settlement in progress or in history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    pub terms: TransactionTerms,
    /// The local reservation this transaction took over.
    pub reservation_key: MessageId,
    /// Quantity held on the counter-party's tick in our book until the
    /// transaction completes or aborts.
    pub remote_pledge: Quantity,
    pub created_at: Timestamp,
    pub deadline: Timestamp,
    state: TransactionState,
    multi_chain: Option<RecordedPayment>,
    bitcoin: Option<RecordedPayment>,
    mismatches: Vec<MismatchRecord>,
    end_sent: bool,
    end_received: Option<MessageId>,
}

/// A reconciliation mismatch kept for external dispute handling.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MismatchRecord {
    pub rail: PaymentRail,
    pub agreed: Quantity,
    pub paid: Quantity,
    /// Display form of the `DEX_ERR_600` error.
    pub detail: String,
}

impl Transaction {
    #[must_use]
    pub fn new(
        terms: TransactionTerms,
        reservation_key: MessageId,
        created_at: Timestamp,
        deadline: Timestamp,
    ) -> Self {
        Self {
            terms,
            reservation_key,
            remote_pledge: Quantity::ZERO,
            created_at,
            deadline,
            state: TransactionState::Started,
            multi_chain: None,
            bitcoin: None,
            mismatches: Vec::new(),
            end_sent: false,
            end_received: None,
        }
    }

    #[must_use]
    pub fn id(&self) -> TransactionId {
        self.terms.transaction_id
    }

    #[must_use]
    pub fn state(&self) -> TransactionState {
        self.state
    }

    #[must_use]
    pub fn multi_chain_payment(&self) -> Option<&RecordedPayment> {
        self.multi_chain.as_ref()
    }

    #[must_use]
    pub fn bitcoin_payment(&self) -> Option<&RecordedPayment> {
        self.bitcoin.as_ref()
    }

    #[must_use]
    pub fn mismatches(&self) -> &[MismatchRecord] {
        &self.mismatches
    }

    #[must_use]
    pub fn is_expired(&self, now: Timestamp) -> bool {
        now >= self.deadline
    }

    /// Record a multi-chain rail payment.
    pub fn record_multi_chain(&mut self, payment: &MultiChainPayment) -> Result<PaymentOutcome> {
        self.record(PaymentRail::MultiChain, payment.into())
    }

    /// Record a bitcoin rail payment.
    pub fn record_bitcoin(&mut self, payment: &BitcoinPayment) -> Result<PaymentOutcome> {
        self.record(PaymentRail::Bitcoin, payment.into())
    }

    fn record(
        &mut self,
        rail: PaymentRail,
        payment: RecordedPayment,
    ) -> Result<PaymentOutcome> {
        let id = self.id();
        let slot = match rail {
            PaymentRail::MultiChain => &mut self.multi_chain,
            PaymentRail::Bitcoin => &mut self.bitcoin,
        };

        if let Some(existing) = slot {
            if existing.message_id == payment.message_id {
                return Ok(PaymentOutcome::Duplicate);
            }
            return Err(DexError::DuplicatePayment {
                transaction: id,
                rail,
            });
        }
        if self.state.is_terminal() {
            return Err(DexError::TransactionClosed(id));
        }

        let paid = payment.quantity;
        *slot = Some(payment);

        if paid != self.terms.quantity {
            let err = DexError::ReconciliationMismatch {
                transaction: id,
                rail,
                agreed: self.terms.quantity,
                paid,
            };
            self.mismatches.push(MismatchRecord {
                rail,
                agreed: self.terms.quantity,
                paid,
                detail: err.to_string(),
            });
            self.transition(TransactionState::Flagged)?;
            return Ok(PaymentOutcome::Flagged);
        }

        if self.state == TransactionState::Flagged {
            return Ok(PaymentOutcome::Recorded);
        }
        if self.multi_chain.is_some() && self.bitcoin.is_some() {
            self.transition(TransactionState::Completed)?;
            return Ok(PaymentOutcome::Completed);
        }
        self.transition(TransactionState::PartiallyPaid)?;
        Ok(PaymentOutcome::Recorded)
    }

    /// Move to `Aborted`. Allowed from any non-terminal state.
    pub fn abort(&mut self) -> Result<()> {
        self.transition(TransactionState::Aborted)
    }

    /// Note the counter-party's end-transaction claim. Returns `false` for a
    /// redelivery of a claim already noted.
    pub fn note_end_claim(&mut self, message_id: MessageId) -> bool {
        if self.end_received == Some(message_id) {
            return false;
        }
        self.end_received = Some(message_id);
        true
    }

    #[must_use]
    pub fn end_claimed_by_peer(&self) -> bool {
        self.end_received.is_some()
    }

    /// Mark our end-transaction as sent. Returns `false` if it already was.
    pub fn mark_end_sent(&mut self) -> bool {
        !std::mem::replace(&mut self.end_sent, true)
    }

    fn transition(&mut self, target: TransactionState) -> Result<()> {
        if self.state == target {
            return Ok(());
        }
        if !self.state.can_transition_to(target) {
            return Err(DexError::InvariantViolation(format!(
                "transaction {} cannot move {} -> {target}",
                self.id(),
                self.state
            )));
        }
        self.state = target;
        Ok(())
    }
}
