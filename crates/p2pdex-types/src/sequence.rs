//! Per-trader sequence state.
//!
//! Order, message and transaction numbers are monotonic per trader. The
//! counters live in one value owned by the local trader context and are
//! passed explicitly to whatever constructs a numbered entity.

use serde::{Deserialize, Serialize};

use crate::{
    MessageId, MessageNumber, OrderId, OrderNumber, TraderId, TransactionId, TransactionNumber,
};

/// Monotonic counters for one trader.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraderSequence {
    trader_id: TraderId,
    next_order: u64,
    next_message: u64,
    next_transaction: u64,
}

impl TraderSequence {
    /// Fresh counters starting at 1.
    #[must_use]
    pub fn new(trader_id: TraderId) -> Self {
        Self {
            trader_id,
            next_order: 1,
            next_message: 1,
            next_transaction: 1,
        }
    }

    #[must_use]
    pub fn trader_id(&self) -> TraderId {
        self.trader_id
    }

    pub fn next_order_id(&mut self) -> OrderId {
        let number = OrderNumber(self.next_order);
        self.next_order += 1;
        OrderId::new(self.trader_id, number)
    }

    pub fn next_message_id(&mut self) -> MessageId {
        let number = MessageNumber(self.next_message);
        self.next_message += 1;
        MessageId::new(self.trader_id, number)
    }

    pub fn next_transaction_id(&mut self) -> TransactionId {
        let number = TransactionNumber(self.next_transaction);
        self.next_transaction += 1;
        TransactionId::new(self.trader_id, number)
    }
}
