//! Transaction table for one trader.
//!
//! Owns every [`Transaction`] the node is party to, whether it started the
//! transaction (as proposer) or was handed one by `start-transaction` (as
//! acceptor). Payments are routed here by transaction ID; the deadline
//! sweep aborts whatever has not completed in time.

use std::collections::HashMap;

use p2pdex_types::{
    BitcoinPayment, DexError, MessageId, MultiChainPayment, Result, Timestamp, TransactionId,
};

use crate::transaction::{PaymentOutcome, Transaction, TransactionState, TransactionTerms};

/// Result of [`TransactionTracker::start`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    Started,
    /// Same transaction with the same terms already exists: no-op.
    AlreadyStarted,
}

/// All transactions known to this node.
#[derive(Debug, Default)]
pub struct TransactionTracker {
    transactions: HashMap<TransactionId, Transaction>,
    /// `accepted-trade` ID -> transaction, so one acceptance settles once.
    by_acceptance: HashMap<MessageId, TransactionId>,
}

impl TransactionTracker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a transaction in `Started`.
    ///
    /// Starting again with identical terms is a no-op. Reusing the ID (or
    /// the acceptance) with different terms is rejected.
    pub fn start(
        &mut self,
        terms: TransactionTerms,
        reservation_key: MessageId,
        now: Timestamp,
        deadline: Timestamp,
    ) -> Result<StartOutcome> {
        let id = terms.transaction_id;
        if let Some(existing) = self.transactions.get(&id) {
            if existing.terms == terms {
                return Ok(StartOutcome::AlreadyStarted);
            }
            return Err(DexError::DuplicateTransaction(id));
        }
        if let Some(other) = self.by_acceptance.get(&terms.accepted_trade_id) {
            return Err(DexError::DuplicateTransaction(*other));
        }

        tracing::info!(
            tx = %id,
            local = %terms.local_order_id,
            remote = %terms.remote_order_id,
            price = %terms.price,
            qty = %terms.quantity,
            "Transaction started"
        );
        self.by_acceptance.insert(terms.accepted_trade_id, id);
        self.transactions
            .insert(id, Transaction::new(terms, reservation_key, now, deadline));
        Ok(StartOutcome::Started)
    }

    pub fn record_multi_chain(&mut self, payment: &MultiChainPayment) -> Result<PaymentOutcome> {
        self.get_mut(&payment.transaction_id)?
            .record_multi_chain(payment)
    }

    pub fn record_bitcoin(&mut self, payment: &BitcoinPayment) -> Result<PaymentOutcome> {
        self.get_mut(&payment.transaction_id)?.record_bitcoin(payment)
    }

    /// Abort every non-terminal transaction whose deadline has passed.
    /// Returns the aborted transactions.
    pub fn abort_expired(&mut self, now: Timestamp) -> Vec<Transaction> {
        let mut aborted = Vec::new();
        for tx in self.transactions.values_mut() {
            if tx.state().is_terminal() || !tx.is_expired(now) {
                continue;
            }
            match tx.abort() {
                Ok(()) => {
                    tracing::warn!(
                        tx = %tx.id(),
                        mismatches = tx.mismatches().len(),
                        "Transaction aborted at deadline"
                    );
                    aborted.push(tx.clone());
                }
                Err(e) => tracing::error!(tx = %tx.id(), error = %e, "Abort refused"),
            }
        }
        aborted
    }

    #[must_use]
    pub fn get(&self, id: &TransactionId) -> Option<&Transaction> {
        self.transactions.get(id)
    }

    pub fn get_mut(&mut self, id: &TransactionId) -> Result<&mut Transaction> {
        self.transactions
            .get_mut(id)
            .ok_or(DexError::TransactionNotFound(*id))
    }

    /// The transaction settling a given acceptance, if any.
    #[must_use]
    pub fn by_acceptance(&self, accepted_trade_id: &MessageId) -> Option<&Transaction> {
        self.by_acceptance
            .get(accepted_trade_id)
            .and_then(|id| self.transactions.get(id))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Transaction> {
        self.transactions.values()
    }

    /// Number of transactions in `state`.
    #[must_use]
    pub fn count_in(&self, state: TransactionState) -> usize {
        self.transactions
            .values()
            .filter(|t| t.state() == state)
            .count()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.transactions.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.transactions.is_empty()
    }
}
