//! Typed protocol messages.
//!
//! One struct per wire message, with validated value types in every field.
//! The closed [`Message`] enum is what the node dispatches on; the byte
//! encoding lives in `p2pdex-wire`.
//!
//! | Message              | Payload                    | Direction            |
//! |----------------------|----------------------------|----------------------|
//! | `ask` / `bid`        | [`Offer`]                  | broadcast (ttl)      |
//! | `proposed-trade`     | [`TradeProposal`]          | direct               |
//! | `counter-trade`      | [`TradeProposal`]          | direct               |
//! | `accepted-trade`     | [`AcceptedTrade`]          | direct + broadcast   |
//! | `declined-trade`     | [`DeclinedTrade`]          | direct               |
//! | `start-transaction`  | [`StartTransaction`]       | direct               |
//! | `multi-chain-payment`| [`MultiChainPayment`]      | direct               |
//! | `bitcoin-payment`    | [`BitcoinPayment`]         | direct               |
//! | `end-transaction`    | [`EndTransaction`]         | direct               |

use std::{fmt, net::SocketAddr};

use serde::{Deserialize, Serialize};

use crate::{
    BitcoinAddress, MessageId, OrderId, OrderNumber, OrderSide, Price, Quantity, Tick, Timeout,
    Timestamp, TraderId, TransactionId, Ttl,
};

// ---------------------------------------------------------------------------
// Payment rails
// ---------------------------------------------------------------------------

/// The two independent settlement rails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub enum PaymentRail {
    /// Primary ledger (multichain) transfer.
    MultiChain,
    /// Secondary bitcoin-style transfer.
    Bitcoin,
}

impl PaymentRail {
    pub const ALL: [Self; 2] = [Self::MultiChain, Self::Bitcoin];
}

impl fmt::Display for PaymentRail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MultiChain => write!(f, "multi-chain"),
            Self::Bitcoin => write!(f, "bitcoin"),
        }
    }
}

// ---------------------------------------------------------------------------
// Tick publication
// ---------------------------------------------------------------------------

/// Payload of `ask` and `bid`: a tick plus its gossip envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Offer {
    pub message_id: MessageId,
    pub order_number: OrderNumber,
    pub price: Price,
    pub quantity: Quantity,
    pub timeout: Timeout,
    pub timestamp: Timestamp,
    pub ttl: Ttl,
    /// Where the publishing trader can be reached.
    pub address: SocketAddr,
}

impl Offer {
    #[must_use]
    pub fn order_id(&self) -> OrderId {
        OrderId::new(self.message_id.trader_id, self.order_number)
    }

    /// The book entry this offer describes.
    #[must_use]
    pub fn to_tick(&self, side: OrderSide) -> Tick {
        Tick::new(
            self.order_id(),
            side,
            self.price,
            self.quantity,
            self.timeout,
            self.timestamp,
        )
    }
}

// ---------------------------------------------------------------------------
// Negotiation
// ---------------------------------------------------------------------------

/// Payload of `proposed-trade` and `counter-trade`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradeProposal {
    pub message_id: MessageId,
    /// The sender's own order.
    pub order_number: OrderNumber,
    /// The recipient's order being traded against.
    pub recipient_order_id: OrderId,
    pub price: Price,
    pub quantity: Quantity,
    pub timestamp: Timestamp,
}

impl TradeProposal {
    #[must_use]
    pub fn order_id(&self) -> OrderId {
        OrderId::new(self.message_id.trader_id, self.order_number)
    }

    #[must_use]
    pub fn recipient(&self) -> TraderId {
        self.recipient_order_id.trader_id
    }
}

/// Payload of `accepted-trade`. Sent to the proposer and gossiped so other
/// nodes can update their books.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcceptedTrade {
    pub message_id: MessageId,
    pub order_number: OrderNumber,
    pub recipient_order_id: OrderId,
    pub price: Price,
    pub quantity: Quantity,
    pub timestamp: Timestamp,
    pub ttl: Ttl,
}

impl AcceptedTrade {
    #[must_use]
    pub fn order_id(&self) -> OrderId {
        OrderId::new(self.message_id.trader_id, self.order_number)
    }

    #[must_use]
    pub fn recipient(&self) -> TraderId {
        self.recipient_order_id.trader_id
    }
}

/// Payload of `declined-trade`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeclinedTrade {
    pub message_id: MessageId,
    pub order_number: OrderNumber,
    pub recipient_order_id: OrderId,
    pub timestamp: Timestamp,
}

impl DeclinedTrade {
    #[must_use]
    pub fn order_id(&self) -> OrderId {
        OrderId::new(self.message_id.trader_id, self.order_number)
    }

    #[must_use]
    pub fn recipient(&self) -> TraderId {
        self.recipient_order_id.trader_id
    }
}

// ---------------------------------------------------------------------------
// Settlement
// ---------------------------------------------------------------------------

/// Payload of `start-transaction`. Sent by the proposer once it has received
/// the acceptance; carries the agreed terms so the acceptor can bind it to
/// the reservation it is holding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartTransaction {
    pub message_id: MessageId,
    pub transaction_id: TransactionId,
    /// The sender's order.
    pub order_number: OrderNumber,
    /// The recipient's order.
    pub recipient_order_id: OrderId,
    /// The `accepted-trade` this transaction settles.
    pub accepted_trade_id: MessageId,
    pub price: Price,
    pub quantity: Quantity,
    pub timestamp: Timestamp,
}

impl StartTransaction {
    #[must_use]
    pub fn order_id(&self) -> OrderId {
        OrderId::new(self.message_id.trader_id, self.order_number)
    }
}

/// Payload of `multi-chain-payment`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MultiChainPayment {
    pub message_id: MessageId,
    pub transaction_id: TransactionId,
    /// Where the counter-party should send the bitcoin leg.
    pub bitcoin_address: BitcoinAddress,
    pub transferor_quantity: Quantity,
    pub transferee_quantity: Quantity,
    pub timestamp: Timestamp,
}

/// Payload of `bitcoin-payment`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BitcoinPayment {
    pub message_id: MessageId,
    pub transaction_id: TransactionId,
    pub quantity: Quantity,
    pub timestamp: Timestamp,
}

/// Payload of `end-transaction`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndTransaction {
    pub message_id: MessageId,
    pub transaction_id: TransactionId,
    pub timestamp: Timestamp,
}

// ---------------------------------------------------------------------------
// Message
// ---------------------------------------------------------------------------

/// Every message the core sends or receives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Message {
    Ask(Offer),
    Bid(Offer),
    ProposedTrade(TradeProposal),
    CounterTrade(TradeProposal),
    AcceptedTrade(AcceptedTrade),
    DeclinedTrade(DeclinedTrade),
    StartTransaction(StartTransaction),
    MultiChainPayment(MultiChainPayment),
    BitcoinPayment(BitcoinPayment),
    EndTransaction(EndTransaction),
}

impl Message {
    /// Identity used for duplicate detection.
    #[must_use]
    pub fn message_id(&self) -> MessageId {
        match self {
            Self::Ask(m) | Self::Bid(m) => m.message_id,
            Self::ProposedTrade(m) | Self::CounterTrade(m) => m.message_id,
            Self::AcceptedTrade(m) => m.message_id,
            Self::DeclinedTrade(m) => m.message_id,
            Self::StartTransaction(m) => m.message_id,
            Self::MultiChainPayment(m) => m.message_id,
            Self::BitcoinPayment(m) => m.message_id,
            Self::EndTransaction(m) => m.message_id,
        }
    }

    /// The trader that created the message.
    #[must_use]
    pub fn sender(&self) -> TraderId {
        self.message_id().trader_id
    }

    /// The wire name of the message kind.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Ask(_) => "ask",
            Self::Bid(_) => "bid",
            Self::ProposedTrade(_) => "proposed-trade",
            Self::CounterTrade(_) => "counter-trade",
            Self::AcceptedTrade(_) => "accepted-trade",
            Self::DeclinedTrade(_) => "declined-trade",
            Self::StartTransaction(_) => "start-transaction",
            Self::MultiChainPayment(_) => "multi-chain-payment",
            Self::BitcoinPayment(_) => "bitcoin-payment",
            Self::EndTransaction(_) => "end-transaction",
        }
    }

    /// Build the publication message for a tick.
    #[must_use]
    pub fn offer(side: OrderSide, offer: Offer) -> Self {
        match side {
            OrderSide::Ask => Self::Ask(offer),
            OrderSide::Bid => Self::Bid(offer),
        }
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.kind(), self.message_id())
    }
}
