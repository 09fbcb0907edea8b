//! Thread-safe node facade.
//!
//! [`MarketNode`] serializes every state transition behind one mutex, so a
//! local order operation, a message handler and the expiry sweep never
//! interleave. Outbound messages are encoded and handed to the
//! [`Transport`] after the lock is released.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use p2pdex_settlement::Transaction;
use p2pdex_types::{
    BitcoinAddress, MessageId, NodeConfig, Order, OrderId, OrderSide, Price, Quantity, Result,
    Tick, Timeout, TraderId, TransactionId,
};

use crate::clock::Clock;
use crate::expiry::SweepReport;
use crate::market::MarketState;
use crate::negotiation::NegotiationState;
use crate::outbound::{Outbound, Transport};
use crate::policy::NegotiationPolicy;

/// One trader's node: market state plus its transport and clock.
pub struct MarketNode<T: Transport, C: Clock> {
    state: Mutex<MarketState>,
    transport: T,
    clock: C,
    sweep_interval: Duration,
    trader: TraderId,
}

impl<T: Transport, C: Clock> MarketNode<T, C> {
    pub fn new(config: &NodeConfig, transport: T, clock: C) -> Result<Self> {
        config.validate()?;
        Ok(Self::assemble(config, MarketState::new(config), transport, clock))
    }

    pub fn with_policy(
        config: &NodeConfig,
        policy: Box<dyn NegotiationPolicy>,
        transport: T,
        clock: C,
    ) -> Result<Self> {
        config.validate()?;
        let state = MarketState::with_policy(config, policy);
        Ok(Self::assemble(config, state, transport, clock))
    }

    fn assemble(config: &NodeConfig, state: MarketState, transport: T, clock: C) -> Self {
        tracing::info!(
            trader = %config.trader,
            listen = %config.listen_addr,
            sweep_ms = config.sweep_interval_ms,
            "Node ready"
        );
        Self {
            state: Mutex::new(state),
            transport,
            clock,
            sweep_interval: Duration::from_millis(config.sweep_interval_ms),
            trader: config.trader,
        }
    }

    #[must_use]
    pub fn trader(&self) -> TraderId {
        self.trader
    }

    #[must_use]
    pub fn transport(&self) -> &T {
        &self.transport
    }

    // =================================================================
    // Operations
    // =================================================================

    pub fn place_order(
        &self,
        side: OrderSide,
        price: Price,
        quantity: Quantity,
        timeout: Timeout,
    ) -> Result<OrderId> {
        let now = self.clock.now();
        let (id, out) = self
            .state
            .lock()
            .place_order(side, price, quantity, timeout, now)?;
        self.dispatch(out);
        Ok(id)
    }

    pub fn cancel_order(&self, order_id: &OrderId) -> Result<()> {
        let now = self.clock.now();
        self.state.lock().cancel_order(order_id, now)
    }

    /// Republish an order's tick.
    pub fn publish(&self, order_id: &OrderId) -> Result<()> {
        let now = self.clock.now();
        let out = self.state.lock().publish_tick(order_id, now)?;
        self.dispatch(out);
        Ok(())
    }

    pub fn submit_multi_chain_payment(
        &self,
        transaction_id: TransactionId,
        bitcoin_address: BitcoinAddress,
        transferor_quantity: Quantity,
        transferee_quantity: Quantity,
    ) -> Result<()> {
        let now = self.clock.now();
        let out = self.state.lock().submit_multi_chain_payment(
            transaction_id,
            bitcoin_address,
            transferor_quantity,
            transferee_quantity,
            now,
        )?;
        self.dispatch(out);
        Ok(())
    }

    pub fn submit_bitcoin_payment(
        &self,
        transaction_id: TransactionId,
        quantity: Quantity,
    ) -> Result<()> {
        let now = self.clock.now();
        let out = self
            .state
            .lock()
            .submit_bitcoin_payment(transaction_id, quantity, now)?;
        self.dispatch(out);
        Ok(())
    }

    /// Decode and apply one payload from the overlay.
    ///
    /// Undecodable payloads are rejected before any state is touched.
    pub fn on_receive(&self, payload: &[u8]) -> Result<()> {
        let message = match p2pdex_wire::decode(payload) {
            Ok(m) => m,
            Err(e) => {
                tracing::warn!(trader = %self.trader, len = payload.len(), error = %e, "Payload rejected");
                return Err(e);
            }
        };
        let id = message.message_id();
        let kind = message.kind();
        let now = self.clock.now();
        let result = self.state.lock().handle(message, now);
        match result {
            Ok(out) => {
                self.dispatch(out);
                Ok(())
            }
            Err(e) => {
                tracing::warn!(trader = %self.trader, msg = %id, kind, error = %e, class = ?e.kind(), "Message rejected");
                Err(e)
            }
        }
    }

    /// Run one expiry sweep now.
    pub fn sweep(&self) -> Result<SweepReport> {
        let now = self.clock.now();
        let (report, out) = self.state.lock().sweep(now)?;
        self.dispatch(out);
        Ok(report)
    }

    fn dispatch(&self, out: Vec<Outbound>) {
        for o in out {
            let bytes = match p2pdex_wire::encode(o.message()) {
                Ok(b) => b,
                Err(e) => {
                    tracing::error!(msg = %o.message(), error = %e, "Outbound message not encodable");
                    continue;
                }
            };
            match o {
                Outbound::Direct { to, .. } => self.transport.send(&to, bytes),
                Outbound::Broadcast(_) => self.transport.broadcast(bytes),
                Outbound::Relay(_) => self.transport.relay(bytes),
            }
        }
    }

    // =================================================================
    // Snapshots
    // =================================================================

    #[must_use]
    pub fn order(&self, order_id: &OrderId) -> Option<Order> {
        self.state.lock().orders().get(order_id).cloned()
    }

    /// This node's current view of a tick.
    #[must_use]
    pub fn tick(&self, order_id: &OrderId) -> Option<Tick> {
        self.state.lock().book().get(order_id).cloned()
    }

    #[must_use]
    pub fn transaction(&self, transaction_id: &TransactionId) -> Option<Transaction> {
        self.state.lock().transactions().get(transaction_id).cloned()
    }

    #[must_use]
    pub fn transactions(&self) -> Vec<Transaction> {
        let mut all: Vec<Transaction> = self.state.lock().transactions().iter().cloned().collect();
        all.sort_by_key(Transaction::id);
        all
    }

    #[must_use]
    pub fn negotiation_state(&self, proposal_id: &MessageId) -> Option<NegotiationState> {
        self.state.lock().negotiations().state(proposal_id)
    }

    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.state.lock().negotiations().pending_count()
    }

    pub fn verify_reservations(&self) -> Result<()> {
        self.state.lock().verify_reservations()
    }

    /// Read the state under the lock.
    pub fn inspect<R>(&self, f: impl FnOnce(&MarketState) -> R) -> R {
        f(&self.state.lock())
    }
}

impl<T, C> MarketNode<T, C>
where
    T: Transport + 'static,
    C: Clock + 'static,
{
    /// Sweep on the configured interval until `shutdown` flips to `true`
    /// or its sender is dropped.
    pub fn spawn_sweeper(self: &Arc<Self>, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        let node = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(node.sweep_interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(e) = node.sweep() {
                            tracing::error!(trader = %node.trader, error = %e, "Sweep failed");
                        }
                    }
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            tracing::info!(trader = %node.trader, "Sweeper stopped");
                            break;
                        }
                    }
                }
            }
        })
    }
}
