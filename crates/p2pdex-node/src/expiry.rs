//! Periodic expiry sweep.
//!
//! One pass over everything that carries a deadline, run under the same
//! exclusive access as message handling:
//!
//! 1. ticks past their timeout leave the book
//! 2. proposals nobody answered are released as timed out
//! 3. acceptances never followed by `start-transaction` give their hold back
//! 4. transactions past their deadline are aborted and their reservations
//!    released, on our order and on the counter-party's tick
//! 5. the book is re-matched, since steps 2 to 4 free quantity
//! 6. every local order that got quantity back is republished, so peers
//!    see it whole again
//!
//! A sweep never completes a transaction.

use p2pdex_orderbook::{LocalOrders, match_all};
use p2pdex_types::{OrderId, Result, Timestamp, TransactionId};

use crate::market::MarketState;
use crate::negotiation::NegotiationState;
use crate::outbound::Outbound;

/// What one sweep did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Peers' ticks removed at their timeout.
    pub expired_ticks: usize,
    /// Local orders whose tick left the book.
    pub expired_orders: Vec<OrderId>,
    pub expired_proposals: usize,
    pub expired_holds: usize,
    pub aborted_transactions: Vec<TransactionId>,
    pub proposals_sent: usize,
}

impl SweepReport {
    /// `true` if the sweep changed nothing.
    #[must_use]
    pub fn is_quiet(&self) -> bool {
        self.expired_ticks == 0
            && self.expired_orders.is_empty()
            && self.expired_proposals == 0
            && self.expired_holds == 0
            && self.aborted_transactions.is_empty()
            && self.proposals_sent == 0
    }
}

impl MarketState {
    /// Expire everything due at `now` and re-match what that freed.
    pub fn sweep(&mut self, now: Timestamp) -> Result<(SweepReport, Vec<Outbound>)> {
        let mut report = SweepReport::default();
        let mut out = Vec::new();
        let mut freed: Vec<OrderId> = Vec::new();

        for tick in self.book.remove_expired(now) {
            if self.orders.is_local(&tick.order_id()) {
                report.expired_orders.push(tick.order_id());
            } else {
                report.expired_ticks += 1;
            }
        }

        for pending in self.negotiations.take_expired_pending(now) {
            tracing::debug!(msg = %pending.message_id, remote = %pending.remote_order_id, "Proposal timed out");
            self.release_pending(&pending, NegotiationState::TimedOut, now)?;
            freed.push(pending.local_order_id);
            report.expired_proposals += 1;
        }

        for hold in self.negotiations.take_expired_holds(now) {
            tracing::debug!(msg = %hold.accepted_id, order = %hold.local_order_id, "Acceptance never started, hold released");
            self.orders.release(&hold.local_order_id, hold.quantity)?;
            self.ledger.release(&hold.accepted_id)?;
            if hold.remote_reserved {
                self.release_remote_tick(&hold.remote_order_id, hold.quantity);
            }
            self.refresh_local_tick(&hold.local_order_id, now);
            freed.push(hold.local_order_id);
            report.expired_holds += 1;
        }

        for tx in self.transactions.abort_expired(now) {
            let order_id = tx.terms.local_order_id;
            self.orders.release(&order_id, tx.terms.quantity)?;
            self.ledger.release(&tx.reservation_key)?;
            if !tx.remote_pledge.is_zero() {
                self.release_remote_tick(&tx.terms.remote_order_id, tx.remote_pledge);
            }
            self.refresh_local_tick(&order_id, now);
            freed.push(order_id);
            report.aborted_transactions.push(tx.id());
        }

        let matches = match_all(&mut self.book, &mut self.orders, now);
        out.extend(self.propose(matches, now)?);
        report.proposals_sent = out.len();

        freed.sort();
        freed.dedup();
        for order_id in freed {
            if self.orders.get(&order_id).is_some_and(|o| o.is_valid(now)) {
                out.push(self.offer_for(&order_id)?);
            }
        }

        if !report.is_quiet() {
            tracing::info!(
                ticks = report.expired_ticks,
                orders = report.expired_orders.len(),
                proposals = report.expired_proposals,
                holds = report.expired_holds,
                aborted = report.aborted_transactions.len(),
                proposed = report.proposals_sent,
                "Expiry sweep"
            );
        }
        Ok((report, out))
    }
}
