//! Per-trader market state and inbound dispatch.
//!
//! [`MarketState`] owns everything one trader's node knows: its orders, its
//! view of the book, open negotiations, transactions, the reservation
//! ledger and the duplicate-delivery guard. Every operation takes the
//! current time and returns the messages to send; nothing here blocks or
//! touches the network.
//!
//! ## Flow
//!
//! ```text
//! place_order ──▶ tick in book ──▶ match_tick ──▶ proposed-trade ──▶ peer
//!                                                        │
//!      ┌──────────── accepted / declined / counter ◀─────┘
//!      ▼
//! Transaction ──▶ start-transaction ──▶ payments (two rails) ──▶ end-transaction
//! ```
//!
//! ## Reservations
//!
//! A local order's tick is rebuilt from the order after every mutation
//! ([`MarketState::refresh_local_tick`]), so its reservation always mirrors
//! the order's. Reservations on peers' ticks are released explicitly and
//! tolerate the tick having been superseded, shrunk or removed meanwhile.
//! An accepted trade keeps its pledge on the peer's tick until the
//! transaction completes (the quantity is consumed) or fails (it is
//! released and the tick is whole again).
//!
//! ## Crossing proposals
//!
//! Two nodes can propose on the same pair of orders at the same time. The
//! proposal from the lower [`TraderId`] wins: the higher trader supersedes
//! its own pending proposal and answers the other, the lower trader ignores
//! the incoming one.

use std::net::SocketAddr;

use p2pdex_orderbook::{Match, OrderBook, match_tick};
use p2pdex_settlement::{
    IdempotencyGuard, PaymentOutcome, ReservationLedger, TransactionState, TransactionTerms,
    TransactionTracker, settlement_digest_hex,
};
use p2pdex_types::{
    AcceptedTrade, BitcoinAddress, BitcoinPayment, DeclinedTrade, DexError, EndTransaction,
    Message, MessageId, MultiChainPayment, NegotiationConfig, NodeConfig, Offer, Order, OrderId,
    OrderSide, PaymentRail, Price, Quantity, Result, StartTransaction, Tick, Timeout, Timestamp,
    TradeProposal, TraderId, TraderSequence, TransactionId,
};

use crate::negotiation::{AcceptedHold, NegotiationState, NegotiationTable, PendingProposal};
use crate::order_manager::OrderManager;
use crate::outbound::Outbound;
use crate::policy::{Decision, LimitPricePolicy, NegotiationPolicy};

/// Everything one trader's node knows.
pub struct MarketState {
    pub(crate) seq: TraderSequence,
    pub(crate) config: NegotiationConfig,
    pub(crate) address: SocketAddr,
    pub(crate) orders: OrderManager,
    pub(crate) book: OrderBook,
    pub(crate) negotiations: NegotiationTable,
    pub(crate) transactions: TransactionTracker,
    pub(crate) ledger: ReservationLedger,
    pub(crate) seen: IdempotencyGuard<MessageId>,
    pub(crate) policy: Box<dyn NegotiationPolicy>,
}

impl MarketState {
    /// State with the default [`LimitPricePolicy`].
    #[must_use]
    pub fn new(config: &NodeConfig) -> Self {
        Self::with_policy(config, Box::new(LimitPricePolicy))
    }

    #[must_use]
    pub fn with_policy(config: &NodeConfig, policy: Box<dyn NegotiationPolicy>) -> Self {
        Self {
            seq: TraderSequence::new(config.trader),
            config: config.negotiation.clone(),
            address: config.listen_addr,
            orders: OrderManager::new(config.trader),
            book: OrderBook::new(),
            negotiations: NegotiationTable::new(),
            transactions: TransactionTracker::new(),
            ledger: ReservationLedger::new(),
            seen: IdempotencyGuard::new(config.idempotency_cache_size.max(1)),
            policy,
        }
    }

    #[must_use]
    pub fn trader(&self) -> TraderId {
        self.seq.trader_id()
    }

    #[must_use]
    pub fn orders(&self) -> &OrderManager {
        &self.orders
    }

    #[must_use]
    pub fn book(&self) -> &OrderBook {
        &self.book
    }

    #[must_use]
    pub fn negotiations(&self) -> &NegotiationTable {
        &self.negotiations
    }

    #[must_use]
    pub fn transactions(&self) -> &TransactionTracker {
        &self.transactions
    }

    #[must_use]
    pub fn ledger(&self) -> &ReservationLedger {
        &self.ledger
    }

    /// Check every local order's reservation against the ledger.
    pub fn verify_reservations(&self) -> Result<()> {
        self.orders
            .iter()
            .try_for_each(|o| self.ledger.verify(&o.id(), o.reserved_quantity()))
    }

    // =================================================================
    // Local operations
    // =================================================================

    /// Create an order, publish its tick and propose against the book.
    pub fn place_order(
        &mut self,
        side: OrderSide,
        price: Price,
        quantity: Quantity,
        timeout: Timeout,
        now: Timestamp,
    ) -> Result<(OrderId, Vec<Outbound>)> {
        let id = self.seq.next_order_id();
        self.orders
            .insert(Order::new(id, side, price, quantity, timeout, now)?)?;
        self.refresh_local_tick(&id, now);
        tracing::info!(order = %id, side = %side, price = %price, qty = %quantity, "Order placed");

        let mut out = vec![self.offer_for(&id)?];
        out.extend(self.rematch(&id, now)?);
        Ok((id, out))
    }

    /// Republish an order's current tick.
    pub fn publish_tick(&mut self, order_id: &OrderId, now: Timestamp) -> Result<Vec<Outbound>> {
        let order = self
            .orders
            .get(order_id)
            .ok_or(DexError::OrderNotFound(*order_id))?;
        if !order.is_valid(now) {
            return Err(DexError::OrderNotValid(*order_id));
        }
        self.refresh_local_tick(order_id, now);
        Ok(vec![self.offer_for(order_id)?])
    }

    /// Cancel an order: its tick leaves the book and every proposal we have
    /// pending for it is released. Accepted trades and started transactions
    /// are unaffected.
    pub fn cancel_order(&mut self, order_id: &OrderId, now: Timestamp) -> Result<()> {
        if self.orders.get(order_id).is_none() {
            return Err(DexError::OrderNotFound(*order_id));
        }
        for pending in self.negotiations.take_pending_for_order(order_id) {
            self.release_pending(&pending, NegotiationState::Cancelled, now)?;
        }
        self.orders.cancel(order_id)?;
        self.refresh_local_tick(order_id, now);
        tracing::info!(order = %order_id, "Order cancelled");
        Ok(())
    }

    /// Record our multi-chain payment and forward it to the counter-party.
    pub fn submit_multi_chain_payment(
        &mut self,
        transaction_id: TransactionId,
        bitcoin_address: BitcoinAddress,
        transferor_quantity: Quantity,
        transferee_quantity: Quantity,
        now: Timestamp,
    ) -> Result<Vec<Outbound>> {
        let counterparty = self.counterparty(&transaction_id)?;
        let payment = MultiChainPayment {
            message_id: self.seq.next_message_id(),
            transaction_id,
            bitcoin_address,
            transferor_quantity,
            transferee_quantity,
            timestamp: now,
        };
        let outcome = self.transactions.record_multi_chain(&payment)?;
        let mut out = vec![Outbound::Direct {
            to: counterparty,
            message: Message::MultiChainPayment(payment),
        }];
        out.extend(self.after_payment(transaction_id, PaymentRail::MultiChain, outcome, now)?);
        Ok(out)
    }

    /// Record our bitcoin payment and forward it to the counter-party.
    pub fn submit_bitcoin_payment(
        &mut self,
        transaction_id: TransactionId,
        quantity: Quantity,
        now: Timestamp,
    ) -> Result<Vec<Outbound>> {
        let counterparty = self.counterparty(&transaction_id)?;
        let payment = BitcoinPayment {
            message_id: self.seq.next_message_id(),
            transaction_id,
            quantity,
            timestamp: now,
        };
        let outcome = self.transactions.record_bitcoin(&payment)?;
        let mut out = vec![Outbound::Direct {
            to: counterparty,
            message: Message::BitcoinPayment(payment),
        }];
        out.extend(self.after_payment(transaction_id, PaymentRail::Bitcoin, outcome, now)?);
        Ok(out)
    }

    // =================================================================
    // Inbound dispatch
    // =================================================================

    /// Apply one inbound message.
    ///
    /// Our own messages and redeliveries are dropped. A message rejected
    /// with an error leaves no state behind and may be retried.
    pub fn handle(&mut self, message: Message, now: Timestamp) -> Result<Vec<Outbound>> {
        let id = message.message_id();
        if id.trader_id == self.trader() {
            tracing::trace!(msg = %id, "Own message ignored");
            return Ok(Vec::new());
        }
        if !self.seen.insert(id) {
            tracing::debug!(msg = %id, kind = message.kind(), "Duplicate delivery dropped");
            return Ok(Vec::new());
        }

        let result = match message {
            Message::Ask(offer) => self.on_offer(OrderSide::Ask, offer, now),
            Message::Bid(offer) => self.on_offer(OrderSide::Bid, offer, now),
            Message::ProposedTrade(proposal) => self.on_proposal(&proposal, 0, now),
            Message::CounterTrade(counter) => self.on_counter(&counter, now),
            Message::AcceptedTrade(accepted) => self.on_accepted(accepted, now),
            Message::DeclinedTrade(declined) => self.on_declined(&declined, now),
            Message::StartTransaction(start) => self.on_start(&start, now),
            Message::MultiChainPayment(payment) => {
                self.check_party(&payment.transaction_id, id.trader_id)
                    .and_then(|()| self.transactions.record_multi_chain(&payment))
                    .and_then(|outcome| {
                        self.after_payment(
                            payment.transaction_id,
                            PaymentRail::MultiChain,
                            outcome,
                            now,
                        )
                    })
            }
            Message::BitcoinPayment(payment) => {
                self.check_party(&payment.transaction_id, id.trader_id)
                    .and_then(|()| self.transactions.record_bitcoin(&payment))
                    .and_then(|outcome| {
                        self.after_payment(payment.transaction_id, PaymentRail::Bitcoin, outcome, now)
                    })
            }
            Message::EndTransaction(end) => self.on_end(&end),
        };

        if result.is_err() {
            self.seen.forget(&id);
        }
        result
    }

    fn on_offer(&mut self, side: OrderSide, offer: Offer, now: Timestamp) -> Result<Vec<Outbound>> {
        let tick = offer.to_tick(side);
        let order_id = tick.order_id();
        if tick.is_expired(now) {
            tracing::debug!(order = %order_id, "Expired tick ignored");
            return Ok(Vec::new());
        }
        if self.book.republish(tick).is_none() {
            tracing::debug!(order = %order_id, side = %side, price = %offer.price, qty = %offer.quantity, "Tick added");
        }

        let mut out = Vec::new();
        if offer.ttl.can_relay() {
            out.push(Outbound::Relay(Message::offer(side, offer)));
        }
        out.extend(self.rematch(&order_id, now)?);
        Ok(out)
    }

    /// Answer a proposed trade (`depth` 0) or a counter-trade.
    fn on_proposal(
        &mut self,
        proposal: &TradeProposal,
        depth: u32,
        now: Timestamp,
    ) -> Result<Vec<Outbound>> {
        if proposal.recipient() != self.trader() {
            tracing::debug!(msg = %proposal.message_id, "Proposal for another trader ignored");
            return Ok(Vec::new());
        }
        let local_id = proposal.recipient_order_id;
        let remote_id = proposal.order_id();

        if self.negotiations.has_pending(&local_id, &remote_id) {
            if proposal.message_id.trader_id > self.trader() {
                tracing::debug!(msg = %proposal.message_id, "Crossing proposal ignored");
                self.negotiations
                    .conclude(proposal.message_id, NegotiationState::Superseded);
                return Ok(Vec::new());
            }
            if let Some(ours) = self.negotiations.take_pending_for(&local_id, &remote_id) {
                self.release_pending(&ours, NegotiationState::Superseded, now)?;
            }
        }

        let Some(order) = self.orders.get(&local_id) else {
            tracing::debug!(order = %local_id, "Proposal for unknown order declined");
            return Ok(vec![self.decline(proposal, now)]);
        };
        let local_side = order.side();
        match self.policy.evaluate(order, proposal, now) {
            Decision::Accept => self.accept(proposal, local_side, now),
            Decision::Decline => Ok(vec![self.decline(proposal, now)]),
            Decision::Counter { price, quantity } => {
                self.counter(proposal, local_side, depth + 1, price, quantity, now)
            }
        }
    }

    fn accept(
        &mut self,
        proposal: &TradeProposal,
        local_side: OrderSide,
        now: Timestamp,
    ) -> Result<Vec<Outbound>> {
        let local_id = proposal.recipient_order_id;
        let remote_id = proposal.order_id();
        if let Err(e) = self.orders.reserve(&local_id, proposal.quantity) {
            tracing::debug!(order = %local_id, error = %e, "Cannot reserve for acceptance");
            return Ok(vec![self.decline(proposal, now)]);
        }

        let remote_reserved = self.book.reserve(&remote_id, proposal.quantity).is_ok();

        let accepted_id = self.seq.next_message_id();
        self.ledger.open(accepted_id, local_id, proposal.quantity)?;
        self.negotiations.insert_hold(AcceptedHold {
            accepted_id,
            local_order_id: local_id,
            remote_order_id: remote_id,
            local_side,
            price: proposal.price,
            quantity: proposal.quantity,
            remote_reserved,
            deadline: now.plus(self.config.acceptance_timeout()),
        });
        self.negotiations
            .conclude(proposal.message_id, NegotiationState::Accepted);
        self.refresh_local_tick(&local_id, now);
        tracing::info!(
            msg = %accepted_id,
            local = %local_id,
            remote = %remote_id,
            price = %proposal.price,
            qty = %proposal.quantity,
            "Trade accepted"
        );

        let accepted = Message::AcceptedTrade(AcceptedTrade {
            message_id: accepted_id,
            order_number: local_id.order_number,
            recipient_order_id: remote_id,
            price: proposal.price,
            quantity: proposal.quantity,
            timestamp: now,
            ttl: self.config.ttl(),
        });
        Ok(vec![
            Outbound::Direct {
                to: remote_id.trader_id,
                message: accepted.clone(),
            },
            Outbound::Broadcast(accepted),
        ])
    }

    fn counter(
        &mut self,
        proposal: &TradeProposal,
        local_side: OrderSide,
        depth: u32,
        price: Price,
        quantity: Quantity,
        now: Timestamp,
    ) -> Result<Vec<Outbound>> {
        let max = self.config.max_negotiation_depth;
        if depth > max {
            let err = DexError::NegotiationDepthExceeded { depth, max };
            tracing::warn!(msg = %proposal.message_id, error = %err, "Counter refused, declining");
            return Ok(vec![self.decline(proposal, now)]);
        }
        if quantity.is_zero() || !price.is_positive() {
            return Ok(vec![self.decline(proposal, now)]);
        }

        let local_id = proposal.recipient_order_id;
        let remote_id = proposal.order_id();
        if let Err(e) = self.orders.reserve(&local_id, quantity) {
            tracing::debug!(order = %local_id, error = %e, "Cannot reserve for counter");
            return Ok(vec![self.decline(proposal, now)]);
        }
        let remote_reserved = self.book.reserve(&remote_id, quantity).is_ok();

        let message_id = self.seq.next_message_id();
        self.ledger.open(message_id, local_id, quantity)?;
        self.negotiations.insert_pending(PendingProposal {
            message_id,
            local_order_id: local_id,
            remote_order_id: remote_id,
            local_side,
            price,
            quantity,
            depth,
            remote_reserved,
            deadline: now.plus(self.config.proposal_timeout()),
        })?;
        self.negotiations
            .conclude(proposal.message_id, NegotiationState::CounterProposed);
        self.refresh_local_tick(&local_id, now);
        tracing::debug!(msg = %message_id, depth, price = %price, qty = %quantity, "Counter proposed");

        Ok(vec![Outbound::Direct {
            to: remote_id.trader_id,
            message: Message::CounterTrade(TradeProposal {
                message_id,
                order_number: local_id.order_number,
                recipient_order_id: remote_id,
                price,
                quantity,
                timestamp: now,
            }),
        }])
    }

    fn decline(&mut self, proposal: &TradeProposal, now: Timestamp) -> Outbound {
        self.negotiations
            .conclude(proposal.message_id, NegotiationState::Declined);
        Outbound::Direct {
            to: proposal.message_id.trader_id,
            message: Message::DeclinedTrade(DeclinedTrade {
                message_id: self.seq.next_message_id(),
                order_number: proposal.recipient_order_id.order_number,
                recipient_order_id: proposal.order_id(),
                timestamp: now,
            }),
        }
    }

    fn on_counter(&mut self, counter: &TradeProposal, now: Timestamp) -> Result<Vec<Outbound>> {
        if counter.recipient() != self.trader() {
            return Ok(Vec::new());
        }
        let Some(ours) = self
            .negotiations
            .take_pending_for(&counter.recipient_order_id, &counter.order_id())
        else {
            let err = DexError::ProposalNotFound(counter.message_id);
            tracing::warn!(error = %err, "Unmatched counter-trade dropped");
            return Ok(Vec::new());
        };
        self.release_pending(&ours, NegotiationState::CounterProposed, now)?;
        self.on_proposal(counter, ours.depth + 1, now)
    }

    fn on_accepted(&mut self, accepted: AcceptedTrade, now: Timestamp) -> Result<Vec<Outbound>> {
        if accepted.recipient() != self.trader() {
            return Ok(self.observe_accepted(accepted));
        }
        let local_id = accepted.recipient_order_id;
        let remote_id = accepted.order_id();
        let Some(pending) = self.negotiations.pending_for(&local_id, &remote_id) else {
            let err = DexError::ProposalNotFound(accepted.message_id);
            tracing::warn!(error = %err, "Unmatched accepted-trade dropped");
            return Ok(Vec::new());
        };
        if pending.price != accepted.price || pending.quantity != accepted.quantity {
            tracing::warn!(
                msg = %accepted.message_id,
                proposed_qty = %pending.quantity,
                accepted_qty = %accepted.quantity,
                "Accepted-trade terms differ from the proposal, dropped"
            );
            return Ok(Vec::new());
        }
        let reservation_key = pending.message_id;
        let local_side = pending.local_side;
        let remote_pledged = pending.remote_reserved
            || self.book.reserve(&remote_id, accepted.quantity).is_ok();

        // The order may have expired since we proposed; the acceptance
        // already reserved the counter-party, so the trade stands.
        let transaction_id = self.seq.next_transaction_id();
        self.transactions.start(
            TransactionTerms {
                transaction_id,
                local_order_id: local_id,
                local_side,
                remote_order_id: remote_id,
                accepted_trade_id: accepted.message_id,
                price: accepted.price,
                quantity: accepted.quantity,
            },
            reservation_key,
            now,
            now.plus(self.config.transaction_timeout()),
        )?;
        if remote_pledged {
            self.transactions.get_mut(&transaction_id)?.remote_pledge = accepted.quantity;
        }
        self.negotiations.take_pending_for(&local_id, &remote_id);
        self.negotiations
            .conclude(reservation_key, NegotiationState::Accepted);

        Ok(vec![Outbound::Direct {
            to: remote_id.trader_id,
            message: Message::StartTransaction(StartTransaction {
                message_id: self.seq.next_message_id(),
                transaction_id,
                order_number: local_id.order_number,
                recipient_order_id: remote_id,
                accepted_trade_id: accepted.message_id,
                price: accepted.price,
                quantity: accepted.quantity,
                timestamp: now,
            }),
        }])
    }

    /// A trade between two other traders: both ticks lose the quantity.
    fn observe_accepted(&mut self, accepted: AcceptedTrade) -> Vec<Outbound> {
        self.consume_tick(&accepted.order_id(), accepted.quantity, false);
        self.consume_tick(&accepted.recipient_order_id, accepted.quantity, false);
        if accepted.ttl.can_relay() {
            vec![Outbound::Relay(Message::AcceptedTrade(accepted))]
        } else {
            Vec::new()
        }
    }

    fn on_declined(&mut self, declined: &DeclinedTrade, now: Timestamp) -> Result<Vec<Outbound>> {
        if declined.recipient() != self.trader() {
            return Ok(Vec::new());
        }
        let local_id = declined.recipient_order_id;
        let remote_id = declined.order_id();
        let Some(ours) = self.negotiations.take_pending_for(&local_id, &remote_id) else {
            let err = DexError::ProposalNotFound(declined.message_id);
            tracing::warn!(error = %err, "Unmatched declined-trade dropped");
            return Ok(Vec::new());
        };
        self.release_pending(&ours, NegotiationState::Declined, now)?;
        if self.book.remove(&remote_id).is_ok() {
            tracing::debug!(order = %remote_id, "Stale tick removed after decline");
        }
        self.rematch(&local_id, now)
    }

    fn on_start(&mut self, start: &StartTransaction, now: Timestamp) -> Result<Vec<Outbound>> {
        let sender = start.message_id.trader_id;
        if !start.recipient_order_id.is_owned_by(&self.trader()) {
            return Ok(Vec::new());
        }
        if start.transaction_id.trader_id != sender {
            return Err(DexError::InvalidProposal {
                reason: format!(
                    "{} carries transaction {} not issued by its sender",
                    start.message_id, start.transaction_id
                ),
            });
        }
        if let Some(existing) = self.transactions.by_acceptance(&start.accepted_trade_id) {
            if existing.id() == start.transaction_id {
                tracing::debug!(tx = %start.transaction_id, "Start-transaction resent");
                return Ok(Vec::new());
            }
            return Err(DexError::DuplicateTransaction(start.transaction_id));
        }

        let Some(hold) = self.negotiations.hold(&start.accepted_trade_id) else {
            tracing::warn!(msg = %start.message_id, accepted = %start.accepted_trade_id, "Start-transaction without accepted trade dropped");
            return Ok(Vec::new());
        };
        if hold.local_order_id != start.recipient_order_id
            || hold.remote_order_id != start.order_id()
            || hold.price != start.price
            || hold.quantity != start.quantity
        {
            return Err(DexError::InvalidProposal {
                reason: format!(
                    "{} does not match accepted trade {}",
                    start.message_id, start.accepted_trade_id
                ),
            });
        }

        let terms = TransactionTerms {
            transaction_id: start.transaction_id,
            local_order_id: hold.local_order_id,
            local_side: hold.local_side,
            remote_order_id: hold.remote_order_id,
            accepted_trade_id: start.accepted_trade_id,
            price: hold.price,
            quantity: hold.quantity,
        };
        let pledge = if hold.remote_reserved {
            hold.quantity
        } else {
            Quantity::ZERO
        };
        let deadline = now.plus(self.config.transaction_timeout());
        self.transactions
            .start(terms, start.accepted_trade_id, now, deadline)?;
        self.transactions.get_mut(&start.transaction_id)?.remote_pledge = pledge;
        self.negotiations.take_hold(&start.accepted_trade_id);
        Ok(Vec::new())
    }

    fn on_end(&mut self, end: &EndTransaction) -> Result<Vec<Outbound>> {
        self.check_party(&end.transaction_id, end.message_id.trader_id)?;
        let tx = self.transactions.get_mut(&end.transaction_id)?;
        if tx.note_end_claim(end.message_id) {
            if tx.state() == TransactionState::Completed {
                tracing::info!(tx = %end.transaction_id, "Counter-party confirmed settlement");
            } else {
                tracing::warn!(
                    tx = %end.transaction_id,
                    state = %tx.state(),
                    "End-transaction claimed before both rails reconciled"
                );
            }
        }
        Ok(Vec::new())
    }

    // =================================================================
    // Settlement
    // =================================================================

    fn counterparty(&self, transaction_id: &TransactionId) -> Result<TraderId> {
        self.transactions
            .get(transaction_id)
            .map(|tx| tx.terms.counterparty())
            .ok_or(DexError::TransactionNotFound(*transaction_id))
    }

    fn check_party(&self, transaction_id: &TransactionId, sender: TraderId) -> Result<()> {
        if self.counterparty(transaction_id)? != sender {
            return Err(DexError::NotAParty {
                transaction: *transaction_id,
                sender,
            });
        }
        Ok(())
    }

    fn after_payment(
        &mut self,
        transaction_id: TransactionId,
        rail: PaymentRail,
        outcome: PaymentOutcome,
        now: Timestamp,
    ) -> Result<Vec<Outbound>> {
        match outcome {
            PaymentOutcome::Duplicate => {
                tracing::debug!(tx = %transaction_id, rail = %rail, "Payment redelivered");
                Ok(Vec::new())
            }
            PaymentOutcome::Recorded => {
                tracing::debug!(tx = %transaction_id, rail = %rail, "Payment recorded");
                Ok(Vec::new())
            }
            PaymentOutcome::Flagged => {
                if let Some(m) = self
                    .transactions
                    .get(&transaction_id)
                    .and_then(|tx| tx.mismatches().last())
                {
                    tracing::warn!(
                        tx = %transaction_id,
                        rail = %m.rail,
                        agreed = %m.agreed,
                        paid = %m.paid,
                        "Reconciliation mismatch, transaction flagged"
                    );
                }
                Ok(Vec::new())
            }
            PaymentOutcome::Completed => self.complete(transaction_id, now),
        }
    }

    /// Both rails reconciled: reserved becomes traded on our order and on
    /// the counter-party's tick, `end-transaction` goes out once and the
    /// order's remainder is republished.
    fn complete(&mut self, transaction_id: TransactionId, now: Timestamp) -> Result<Vec<Outbound>> {
        let tx = self
            .transactions
            .get(&transaction_id)
            .ok_or(DexError::TransactionNotFound(transaction_id))?;
        let terms = tx.terms.clone();
        let reservation_key = tx.reservation_key;
        let pledged = !tx.remote_pledge.is_zero();
        let digest = settlement_digest_hex(tx);

        self.orders.commit(&terms.local_order_id, terms.quantity)?;
        self.ledger.settle(&reservation_key)?;
        self.refresh_local_tick(&terms.local_order_id, now);
        self.consume_tick(&terms.remote_order_id, terms.quantity, pledged);
        tracing::info!(
            tx = %transaction_id,
            order = %terms.local_order_id,
            price = %terms.price,
            qty = %terms.quantity,
            digest = %digest,
            "Transaction completed"
        );

        let mut out = Vec::new();
        if self.transactions.get_mut(&transaction_id)?.mark_end_sent() {
            out.push(Outbound::Direct {
                to: terms.counterparty(),
                message: Message::EndTransaction(EndTransaction {
                    message_id: self.seq.next_message_id(),
                    transaction_id,
                    timestamp: now,
                }),
            });
        }
        if self
            .orders
            .get(&terms.local_order_id)
            .is_some_and(|o| o.is_valid(now))
        {
            out.push(self.offer_for(&terms.local_order_id)?);
        }
        Ok(out)
    }

    // =================================================================
    // Book plumbing
    // =================================================================

    /// Match a tick and turn every reserved match into a proposal.
    pub(crate) fn rematch(&mut self, order_id: &OrderId, now: Timestamp) -> Result<Vec<Outbound>> {
        let matches = match_tick(&mut self.book, &mut self.orders, order_id, now);
        self.propose(matches, now)
    }

    pub(crate) fn propose(&mut self, matches: Vec<Match>, now: Timestamp) -> Result<Vec<Outbound>> {
        let mut out = Vec::with_capacity(matches.len());
        for m in matches {
            if self
                .negotiations
                .has_pending(&m.local_order_id, &m.remote_order_id)
            {
                // One proposal per pair; give the extra reservation back.
                self.orders.release(&m.local_order_id, m.quantity)?;
                self.release_remote_tick(&m.remote_order_id, m.quantity);
                self.refresh_local_tick(&m.local_order_id, now);
                continue;
            }

            let message_id = self.seq.next_message_id();
            self.ledger.open(message_id, m.local_order_id, m.quantity)?;
            self.negotiations.insert_pending(PendingProposal {
                message_id,
                local_order_id: m.local_order_id,
                remote_order_id: m.remote_order_id,
                local_side: m.local_side,
                price: m.price,
                quantity: m.quantity,
                depth: 0,
                remote_reserved: true,
                deadline: now.plus(self.config.proposal_timeout()),
            })?;
            tracing::debug!(
                msg = %message_id,
                local = %m.local_order_id,
                remote = %m.remote_order_id,
                price = %m.price,
                qty = %m.quantity,
                "Trade proposed"
            );
            out.push(Outbound::Direct {
                to: m.remote_order_id.trader_id,
                message: Message::ProposedTrade(TradeProposal {
                    message_id,
                    order_number: m.local_order_id.order_number,
                    recipient_order_id: m.remote_order_id,
                    price: m.price,
                    quantity: m.quantity,
                    timestamp: now,
                }),
            });
        }
        Ok(out)
    }

    /// Hand a proposal's reservation back and record how it ended.
    pub(crate) fn release_pending(
        &mut self,
        pending: &PendingProposal,
        outcome: NegotiationState,
        now: Timestamp,
    ) -> Result<()> {
        self.orders
            .release(&pending.local_order_id, pending.quantity)?;
        if pending.remote_reserved {
            self.release_remote_tick(&pending.remote_order_id, pending.quantity);
        }
        self.ledger.release(&pending.message_id)?;
        self.negotiations.conclude(pending.message_id, outcome);
        self.refresh_local_tick(&pending.local_order_id, now);
        tracing::debug!(msg = %pending.message_id, outcome = %outcome, qty = %pending.quantity, "Proposal closed");
        Ok(())
    }

    /// Rebuild a local order's tick, or drop it once the order can no
    /// longer trade.
    pub(crate) fn refresh_local_tick(&mut self, order_id: &OrderId, now: Timestamp) {
        let tick = self
            .orders
            .get(order_id)
            .filter(|o| !o.is_cancelled() && !o.is_expired(now) && !o.untraded_quantity().is_zero())
            .map(Tick::from_order);
        match tick {
            Some(tick) => {
                self.book.insert(tick);
            }
            None => {
                let _ = self.book.remove(order_id);
            }
        }
    }

    /// Give back a pledge on a peer's tick. A republish may have shrunk the
    /// reservation below the pledge; whatever is still held is released.
    pub(crate) fn release_remote_tick(&mut self, order_id: &OrderId, quantity: Quantity) {
        match self.book.release_up_to(order_id, quantity) {
            Ok(released) if released < quantity => tracing::debug!(
                order = %order_id,
                pledged = %quantity,
                released = %released,
                "Tick reservation shrunk by republish"
            ),
            Ok(_) => {}
            Err(e) => tracing::debug!(order = %order_id, error = %e, "Tick already gone"),
        }
    }

    fn consume_tick(&mut self, order_id: &OrderId, quantity: Quantity, from_reserved: bool) {
        match self.book.consume(order_id, quantity, from_reserved) {
            Ok(true) => tracing::debug!(order = %order_id, "Tick exhausted and removed"),
            Ok(false) => {}
            Err(e) => tracing::trace!(order = %order_id, error = %e, "No tick to consume"),
        }
    }

    pub(crate) fn offer_for(&mut self, order_id: &OrderId) -> Result<Outbound> {
        let order = self
            .orders
            .get(order_id)
            .ok_or(DexError::OrderNotFound(*order_id))?;
        let offer = Offer {
            message_id: self.seq.next_message_id(),
            order_number: order_id.order_number,
            price: order.price(),
            quantity: order.available_quantity(),
            timeout: order.timeout(),
            timestamp: order.timestamp(),
            ttl: self.config.ttl(),
            address: self.address,
        };
        Ok(Outbound::Broadcast(Message::offer(order.side(), offer)))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;

    use p2pdex_settlement::Transaction;
    use p2pdex_types::*;

    use super::*;

    fn p(mil: i64) -> Price {
        Price::from_mil(mil).unwrap()
    }

    fn q(mil: i64) -> Quantity {
        Quantity::from_mil(mil).unwrap()
    }

    fn t(ms: u64) -> Timestamp {
        Timestamp::from_millis(ms)
    }

    fn state(byte: u8) -> MarketState {
        MarketState::new(&NodeConfig::new(TraderId([byte; 32])))
    }

    /// Deliver `out` from `from` to every other node, breadth first, until
    /// nothing is left in flight.
    fn pump(nodes: &mut [&mut MarketState], from: TraderId, out: Vec<Outbound>, now: Timestamp) {
        let mut queue: VecDeque<(TraderId, Outbound)> = out.into_iter().map(|o| (from, o)).collect();
        while let Some((sender, o)) = queue.pop_front() {
            for node in nodes.iter_mut() {
                let me = node.trader();
                if me == sender || o.destination().is_some_and(|d| d != me) {
                    continue;
                }
                let replies = node.handle(o.message().clone(), now).unwrap();
                queue.extend(replies.into_iter().map(|r| (me, r)));
            }
        }
    }

    fn proposals(out: &[Outbound]) -> Vec<&TradeProposal> {
        out.iter()
            .filter_map(|o| match o.message() {
                Message::ProposedTrade(p) => Some(p),
                _ => None,
            })
            .collect()
    }

    fn only_tx(s: &MarketState) -> Transaction {
        let all: Vec<_> = s.transactions().iter().cloned().collect();
        assert_eq!(all.len(), 1, "expected exactly one transaction");
        all.into_iter().next().unwrap()
    }

    #[test]
    fn bid_against_resting_ask_proposes_at_ask_price() {
        let mut a = state(1);
        let mut b = state(2);
        let (ask_id, out) = a
            .place_order(OrderSide::Ask, p(10_000), q(5_000), Timeout::from_secs(60), t(0))
            .unwrap();
        let offer = out[0].message().clone();
        b.handle(offer, t(1)).unwrap();

        let (bid_id, out) = b
            .place_order(OrderSide::Bid, p(12_000), q(3_000), Timeout::from_secs(60), t(2))
            .unwrap();
        let sent = proposals(&out);
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].price, p(10_000));
        assert_eq!(sent[0].quantity, q(3_000));
        assert_eq!(sent[0].recipient_order_id, ask_id);
        assert_eq!(sent[0].order_id(), bid_id);
        assert_eq!(b.book().get(&ask_id).unwrap().remaining(), q(2_000));
        b.verify_reservations().unwrap();
    }

    #[test]
    fn negotiation_to_completed_settlement() {
        let mut a = state(1);
        let mut b = state(2);
        let (ask_id, out) = a
            .place_order(OrderSide::Ask, p(10_000), q(5_000), Timeout::from_secs(60), t(0))
            .unwrap();
        let a_trader = a.trader();
        pump(&mut [&mut a, &mut b], a_trader, out, t(1));
        let (bid_id, out) = b
            .place_order(OrderSide::Bid, p(12_000), q(3_000), Timeout::from_secs(60), t(2))
            .unwrap();
        let b_trader = b.trader();
        pump(&mut [&mut a, &mut b], b_trader, out, t(3));

        let tx_a = only_tx(&a);
        let tx_b = only_tx(&b);
        assert_eq!(tx_a.id(), tx_b.id());
        assert_eq!(tx_a.terms.local_order_id, ask_id);
        assert_eq!(tx_b.terms.local_order_id, bid_id);
        assert_eq!(tx_a.terms.quantity, q(3_000));
        assert_eq!(b.negotiations().hold_count(), 0);

        let tx = tx_b.id();
        let out = b
            .submit_multi_chain_payment(
                tx,
                BitcoinAddress::new("bc1qar0srrr7xfkvy5l643lydnw9re59gtzzwf5mdq").unwrap(),
                q(3_000),
                q(30_000),
                t(4),
            )
            .unwrap();
        pump(&mut [&mut a, &mut b], b_trader, out, t(4));
        let out = a.submit_bitcoin_payment(tx, q(3_000), t(5)).unwrap();
        pump(&mut [&mut a, &mut b], a_trader, out, t(5));

        for s in [&a, &b] {
            let tx = only_tx(s);
            assert_eq!(tx.state(), TransactionState::Completed);
            assert!(tx.end_claimed_by_peer());
            s.verify_reservations().unwrap();
        }
        let ask = a.orders().get(&ask_id).unwrap();
        assert_eq!(ask.traded_quantity(), q(3_000));
        assert_eq!(ask.reserved_quantity(), Quantity::ZERO);
        assert!(b.orders().get(&bid_id).unwrap().is_filled());
        assert!(!b.book().contains(&bid_id), "filled order leaves the book");
        assert_eq!(b.book().get(&ask_id).unwrap().quantity(), q(2_000));
    }

    #[test]
    fn decline_releases_and_forgets_stale_tick() {
        let mut a = state(1);
        let mut b = state(2);
        let (ask_id, out) = a
            .place_order(OrderSide::Ask, p(10_000), q(5_000), Timeout::from_secs(60), t(0))
            .unwrap();
        b.handle(out[0].message().clone(), t(1)).unwrap();
        a.cancel_order(&ask_id, t(1)).unwrap();

        let (bid_id, out) = b
            .place_order(OrderSide::Bid, p(12_000), q(3_000), Timeout::from_secs(60), t(2))
            .unwrap();
        let proposal = proposals(&out)[0].clone();
        let reply = a.handle(Message::ProposedTrade(proposal.clone()), t(3)).unwrap();
        assert!(matches!(reply[0].message(), Message::DeclinedTrade(_)));

        b.handle(reply[0].message().clone(), t(4)).unwrap();
        assert_eq!(b.orders().get(&bid_id).unwrap().reserved_quantity(), Quantity::ZERO);
        assert!(!b.book().contains(&ask_id));
        assert_eq!(
            b.negotiations().state(&proposal.message_id),
            Some(NegotiationState::Declined)
        );
        b.verify_reservations().unwrap();
    }

    #[test]
    fn short_acceptor_counters_and_proposer_accepts() {
        let mut a = state(1);
        let mut b = state(2);
        let (ask_id, _) = a
            .place_order(OrderSide::Ask, p(10_000), q(2_000), Timeout::from_secs(60), t(0))
            .unwrap();
        // b holds an older, larger view of a's ask.
        let stale = Message::Ask(Offer {
            message_id: MessageId::new(a.trader(), MessageNumber(900)),
            order_number: ask_id.order_number,
            price: p(10_000),
            quantity: q(5_000),
            timeout: Timeout::from_secs(60),
            timestamp: t(0),
            ttl: Ttl(0),
            address: "127.0.0.1:7759".parse().unwrap(),
        });
        b.handle(stale, t(1)).unwrap();

        let (bid_id, out) = b
            .place_order(OrderSide::Bid, p(12_000), q(3_000), Timeout::from_secs(60), t(2))
            .unwrap();
        let direct: Vec<Outbound> = out.into_iter().filter(|o| o.destination().is_some()).collect();
        let b_trader = b.trader();
        pump(&mut [&mut a, &mut b], b_trader, direct, t(3));

        let tx_a = only_tx(&a);
        assert_eq!(tx_a.terms.quantity, q(2_000));
        assert_eq!(tx_a.terms.local_order_id, ask_id);
        assert_eq!(only_tx(&b).terms.local_order_id, bid_id);
        assert_eq!(b.orders().get(&bid_id).unwrap().reserved_quantity(), q(2_000));
        a.verify_reservations().unwrap();
        b.verify_reservations().unwrap();
    }

    /// Always counters with the proposal's own terms.
    struct Stubborn;

    impl NegotiationPolicy for Stubborn {
        fn evaluate(&self, _: &Order, proposal: &TradeProposal, _: Timestamp) -> Decision {
            Decision::Counter {
                price: proposal.price,
                quantity: proposal.quantity,
            }
        }
    }

    #[test]
    fn counter_loop_is_bounded() {
        let mut a = MarketState::with_policy(&NodeConfig::new(TraderId([1; 32])), Box::new(Stubborn));
        let mut b = MarketState::with_policy(&NodeConfig::new(TraderId([2; 32])), Box::new(Stubborn));
        let (ask_id, out) = a
            .place_order(OrderSide::Ask, p(10_000), q(5_000), Timeout::from_secs(60), t(0))
            .unwrap();
        b.handle(out[0].message().clone(), t(1)).unwrap();
        let (bid_id, out) = b
            .place_order(OrderSide::Bid, p(12_000), q(3_000), Timeout::from_secs(60), t(2))
            .unwrap();
        let direct: Vec<Outbound> = out.into_iter().filter(|o| o.destination().is_some()).collect();
        let b_trader = b.trader();
        pump(&mut [&mut a, &mut b], b_trader, direct, t(3));

        assert!(a.transactions().is_empty() && b.transactions().is_empty());
        assert_eq!(a.negotiations().pending_count(), 0);
        assert_eq!(b.negotiations().pending_count(), 0);
        assert_eq!(a.orders().get(&ask_id).unwrap().reserved_quantity(), Quantity::ZERO);
        assert_eq!(b.orders().get(&bid_id).unwrap().reserved_quantity(), Quantity::ZERO);
        a.verify_reservations().unwrap();
        b.verify_reservations().unwrap();
    }

    #[test]
    fn crossing_proposals_resolve_to_lower_trader() {
        let mut a = state(1);
        let mut b = state(2);
        let (_, a_out) = a
            .place_order(OrderSide::Ask, p(10_000), q(5_000), Timeout::from_secs(60), t(0))
            .unwrap();
        let (_, b_out) = b
            .place_order(OrderSide::Bid, p(12_000), q(3_000), Timeout::from_secs(60), t(0))
            .unwrap();

        let from_a = a.handle(b_out[0].message().clone(), t(1)).unwrap();
        let from_b = b.handle(a_out[0].message().clone(), t(1)).unwrap();
        let p_a = proposals(&from_a)[0].clone();
        let p_b = proposals(&from_b)[0].clone();

        assert!(a.handle(Message::ProposedTrade(p_b.clone()), t(2)).unwrap().is_empty());
        let reply = b.handle(Message::ProposedTrade(p_a.clone()), t(2)).unwrap();
        assert!(matches!(reply[0].message(), Message::AcceptedTrade(_)));
        assert_eq!(b.negotiations().state(&p_b.message_id), Some(NegotiationState::Superseded));

        let b_trader = b.trader();
        pump(&mut [&mut a, &mut b], b_trader, reply, t(3));
        assert_eq!(only_tx(&a).id(), only_tx(&b).id());
        assert_eq!(only_tx(&a).id().trader_id, a.trader());
        a.verify_reservations().unwrap();
        b.verify_reservations().unwrap();
    }

    #[test]
    fn redelivery_and_own_messages_are_noops() {
        let mut a = state(1);
        let mut b = state(2);
        let (_, out) = a
            .place_order(OrderSide::Ask, p(10_000), q(5_000), Timeout::from_secs(60), t(0))
            .unwrap();
        let offer = out[0].message().clone();
        assert!(a.handle(offer.clone(), t(1)).unwrap().is_empty());
        assert!(!b.handle(offer.clone(), t(1)).unwrap().is_empty(), "relayed once");
        assert!(b.handle(offer, t(1)).unwrap().is_empty());
        assert_eq!(b.book().tick_count(), 1);
    }

    #[test]
    fn settlement_messages_checked_against_parties() {
        let mut a = state(1);
        let mut b = state(2);
        let (_, out) = a
            .place_order(OrderSide::Ask, p(10_000), q(5_000), Timeout::from_secs(60), t(0))
            .unwrap();
        let a_trader = a.trader();
        pump(&mut [&mut a, &mut b], a_trader, out, t(1));
        let (_, out) = b
            .place_order(OrderSide::Bid, p(12_000), q(3_000), Timeout::from_secs(60), t(2))
            .unwrap();
        let b_trader = b.trader();
        pump(&mut [&mut a, &mut b], b_trader, out, t(3));
        let tx = only_tx(&a).id();

        let intruder = TraderId([9; 32]);
        let forged = Message::BitcoinPayment(BitcoinPayment {
            message_id: MessageId::new(intruder, MessageNumber(1)),
            transaction_id: tx,
            quantity: q(3_000),
            timestamp: t(4),
        });
        assert!(matches!(a.handle(forged, t(4)), Err(DexError::NotAParty { .. })));

        let unknown = Message::BitcoinPayment(BitcoinPayment {
            message_id: MessageId::new(b_trader, MessageNumber(500)),
            transaction_id: TransactionId::new(b_trader, TransactionNumber(77)),
            quantity: q(3_000),
            timestamp: t(4),
        });
        assert!(matches!(
            a.handle(unknown.clone(), t(4)),
            Err(DexError::TransactionNotFound(_))
        ));
        // Rejected messages are not remembered as seen.
        assert!(matches!(
            a.handle(unknown, t(4)),
            Err(DexError::TransactionNotFound(_))
        ));
        assert_eq!(only_tx(&a).state(), TransactionState::Started);
    }

    #[test]
    fn flagged_payment_blocks_completion() {
        let mut a = state(1);
        let mut b = state(2);
        let (ask_id, out) = a
            .place_order(OrderSide::Ask, p(10_000), q(5_000), Timeout::from_secs(60), t(0))
            .unwrap();
        let a_trader = a.trader();
        pump(&mut [&mut a, &mut b], a_trader, out, t(1));
        let (_, out) = b
            .place_order(OrderSide::Bid, p(12_000), q(3_000), Timeout::from_secs(60), t(2))
            .unwrap();
        let b_trader = b.trader();
        pump(&mut [&mut a, &mut b], b_trader, out, t(3));
        let tx = only_tx(&a).id();
        let out = a.submit_bitcoin_payment(tx, q(2_500), t(4)).unwrap();
        pump(&mut [&mut a, &mut b], a_trader, out, t(4));
        let out = b
            .submit_multi_chain_payment(
                tx,
                BitcoinAddress::new("1BoatSLRHtKNngkdXEeobR76b53LETtpyT").unwrap(),
                q(3_000),
                q(30_000),
                t(5),
            )
            .unwrap();
        pump(&mut [&mut a, &mut b], b_trader, out, t(5));

        let flagged = only_tx(&a);
        assert_eq!(flagged.state(), TransactionState::Flagged);
        assert_eq!(flagged.mismatches().len(), 1);
        assert_eq!(a.orders().get(&ask_id).unwrap().traded_quantity(), Quantity::ZERO);
        assert_eq!(a.orders().get(&ask_id).unwrap().reserved_quantity(), q(3_000));
    }

    #[test]
    fn third_party_applies_accepted_trade_to_its_book() {
        let mut a = state(1);
        let mut b = state(2);
        let mut c = state(3);
        let (ask_id, out) = a
            .place_order(OrderSide::Ask, p(10_000), q(5_000), Timeout::from_secs(60), t(0))
            .unwrap();
        let a_trader = a.trader();
        pump(&mut [&mut a, &mut b, &mut c], a_trader, out, t(1));
        let (bid_id, out) = b
            .place_order(OrderSide::Bid, p(12_000), q(3_000), Timeout::from_secs(60), t(2))
            .unwrap();
        let b_trader = b.trader();
        pump(&mut [&mut a, &mut b, &mut c], b_trader, out, t(3));

        assert!(c.transactions().is_empty());
        assert_eq!(c.book().get(&ask_id).unwrap().quantity(), q(2_000));
        assert!(!c.book().contains(&bid_id));
    }

    #[test]
    fn start_with_wrong_terms_is_rejected_without_side_effects() {
        let mut a = state(1);
        let mut b = state(2);
        let (ask_id, out) = a
            .place_order(OrderSide::Ask, p(10_000), q(5_000), Timeout::from_secs(60), t(0))
            .unwrap();
        b.handle(out[0].message().clone(), t(1)).unwrap();
        let (bid_id, out) = b
            .place_order(OrderSide::Bid, p(12_000), q(3_000), Timeout::from_secs(60), t(2))
            .unwrap();
        let reply = a
            .handle(Message::ProposedTrade(proposals(&out)[0].clone()), t(3))
            .unwrap();
        let Message::AcceptedTrade(accepted) = reply[0].message().clone() else {
            panic!("expected acceptance");
        };

        let b_trader = b.trader();
        let bogus = StartTransaction {
            message_id: MessageId::new(b_trader, MessageNumber(800)),
            transaction_id: TransactionId::new(b_trader, TransactionNumber(1)),
            order_number: bid_id.order_number,
            recipient_order_id: ask_id,
            accepted_trade_id: accepted.message_id,
            price: p(10_000),
            quantity: q(4_000),
            timestamp: t(4),
        };
        assert!(matches!(
            a.handle(Message::StartTransaction(bogus), t(4)),
            Err(DexError::InvalidProposal { .. })
        ));
        assert!(a.transactions().is_empty());
        assert_eq!(a.negotiations().hold_count(), 1);
        a.verify_reservations().unwrap();
    }

    #[test]
    fn cancel_releases_pending_proposals() {
        let mut a = state(1);
        let mut b = state(2);
        let (_, out) = a
            .place_order(OrderSide::Ask, p(10_000), q(5_000), Timeout::from_secs(60), t(0))
            .unwrap();
        b.handle(out[0].message().clone(), t(1)).unwrap();
        let (bid_id, out) = b
            .place_order(OrderSide::Bid, p(12_000), q(3_000), Timeout::from_secs(60), t(2))
            .unwrap();
        let proposal = proposals(&out)[0].message_id;

        b.cancel_order(&bid_id, t(3)).unwrap();
        assert_eq!(b.negotiations().state(&proposal), Some(NegotiationState::Cancelled));
        assert_eq!(b.orders().get(&bid_id).unwrap().reserved_quantity(), Quantity::ZERO);
        assert!(!b.book().contains(&bid_id));
        assert!(matches!(
            b.publish_tick(&bid_id, t(4)),
            Err(DexError::OrderNotValid(_))
        ));
        b.verify_reservations().unwrap();
    }
}
