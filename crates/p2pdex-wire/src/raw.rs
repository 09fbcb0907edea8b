//! Raw wire payloads.
//!
//! These mirror the typed messages field for field, but with the primitive
//! representation that goes on the wire: trader IDs as hex, prices and
//! quantities as mil integers, times as integer milliseconds. Unknown or
//! missing fields fail the parse. Conversion into the typed [`Message`]
//! validates every value and is the only way out of this module.

use std::net::{IpAddr, SocketAddr};

use p2pdex_types::{
    AcceptedTrade, BitcoinAddress, BitcoinPayment, DeclinedTrade, DexError, EndTransaction,
    Message, MessageId, MessageNumber, MultiChainPayment, Offer, OrderId, OrderNumber, Price,
    Quantity, Result, StartTransaction, Timeout, Timestamp, TradeProposal, TraderId,
    TransactionId, TransactionNumber, Ttl,
};
use serde::{Deserialize, Serialize};

/// The closed set of wire payloads, tagged by message kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "kebab-case")]
pub enum RawMessage {
    Ask(RawOffer),
    Bid(RawOffer),
    ProposedTrade(RawTrade),
    CounterTrade(RawTrade),
    AcceptedTrade(RawAcceptedTrade),
    DeclinedTrade(RawDeclinedTrade),
    StartTransaction(RawStartTransaction),
    MultiChainPayment(RawMultiChainPayment),
    BitcoinPayment(RawBitcoinPayment),
    EndTransaction(RawEndTransaction),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawOffer {
    pub trader_id: String,
    pub message_number: u64,
    pub order_number: u64,
    pub price: i64,
    pub quantity: i64,
    pub timeout: i64,
    pub timestamp: i64,
    pub ttl: i64,
    pub ip: String,
    pub port: u16,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawTrade {
    pub trader_id: String,
    pub message_number: u64,
    pub order_number: u64,
    pub recipient_trader_id: String,
    pub recipient_order_number: u64,
    pub price: i64,
    pub quantity: i64,
    pub timestamp: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawAcceptedTrade {
    pub trader_id: String,
    pub message_number: u64,
    pub order_number: u64,
    pub recipient_trader_id: String,
    pub recipient_order_number: u64,
    pub price: i64,
    pub quantity: i64,
    pub timestamp: i64,
    pub ttl: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawDeclinedTrade {
    pub trader_id: String,
    pub message_number: u64,
    pub order_number: u64,
    pub recipient_trader_id: String,
    pub recipient_order_number: u64,
    pub timestamp: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawStartTransaction {
    pub trader_id: String,
    pub message_number: u64,
    pub transaction_number: u64,
    pub order_number: u64,
    pub recipient_trader_id: String,
    pub recipient_order_number: u64,
    /// Message number of the recipient's `accepted-trade`.
    pub accepted_message_number: u64,
    pub price: i64,
    pub quantity: i64,
    pub timestamp: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawMultiChainPayment {
    pub trader_id: String,
    pub message_number: u64,
    pub transaction_trader_id: String,
    pub transaction_number: u64,
    pub bitcoin_address: String,
    pub transferor_quantity: i64,
    pub transferee_quantity: i64,
    pub timestamp: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawBitcoinPayment {
    pub trader_id: String,
    pub message_number: u64,
    pub transaction_trader_id: String,
    pub transaction_number: u64,
    pub quantity: i64,
    pub timestamp: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawEndTransaction {
    pub trader_id: String,
    pub message_number: u64,
    pub transaction_trader_id: String,
    pub transaction_number: u64,
    pub timestamp: i64,
}

// ---------------------------------------------------------------------------
// Field validation
// ---------------------------------------------------------------------------

fn message_id(trader_hex: &str, number: u64) -> Result<MessageId> {
    Ok(MessageId::new(
        TraderId::from_hex(trader_hex)?,
        MessageNumber(number),
    ))
}

fn order_id(trader_hex: &str, number: u64) -> Result<OrderId> {
    Ok(OrderId::new(
        TraderId::from_hex(trader_hex)?,
        OrderNumber(number),
    ))
}

fn transaction_id(trader_hex: &str, number: u64) -> Result<TransactionId> {
    Ok(TransactionId::new(
        TraderId::from_hex(trader_hex)?,
        TransactionNumber(number),
    ))
}

fn positive_price(mil: i64) -> Result<Price> {
    let price = Price::from_mil(mil)?;
    if !price.is_positive() {
        return Err(DexError::InvalidValue {
            field: "price",
            reason: "must be positive".to_string(),
        });
    }
    Ok(price)
}

fn positive_quantity(mil: i64) -> Result<Quantity> {
    let quantity = Quantity::from_mil(mil)?;
    if quantity.is_zero() {
        return Err(DexError::InvalidValue {
            field: "quantity",
            reason: "must be positive".to_string(),
        });
    }
    Ok(quantity)
}

fn address(ip: &str, port: u16) -> Result<SocketAddr> {
    let ip: IpAddr = ip.parse().map_err(|_| DexError::InvalidValue {
        field: "address",
        reason: format!("bad ip '{ip}'"),
    })?;
    Ok(SocketAddr::new(ip, port))
}

// ---------------------------------------------------------------------------
// Raw -> typed
// ---------------------------------------------------------------------------

impl TryFrom<RawOffer> for Offer {
    type Error = DexError;

    fn try_from(raw: RawOffer) -> Result<Self> {
        Ok(Self {
            message_id: message_id(&raw.trader_id, raw.message_number)?,
            order_number: OrderNumber(raw.order_number),
            price: positive_price(raw.price)?,
            quantity: positive_quantity(raw.quantity)?,
            timeout: Timeout::from_wire(raw.timeout)?,
            timestamp: Timestamp::from_wire(raw.timestamp)?,
            ttl: Ttl::from_wire(raw.ttl)?,
            address: address(&raw.ip, raw.port)?,
        })
    }
}

impl TryFrom<RawTrade> for TradeProposal {
    type Error = DexError;

    fn try_from(raw: RawTrade) -> Result<Self> {
        Ok(Self {
            message_id: message_id(&raw.trader_id, raw.message_number)?,
            order_number: OrderNumber(raw.order_number),
            recipient_order_id: order_id(&raw.recipient_trader_id, raw.recipient_order_number)?,
            price: positive_price(raw.price)?,
            quantity: positive_quantity(raw.quantity)?,
            timestamp: Timestamp::from_wire(raw.timestamp)?,
        })
    }
}

impl TryFrom<RawAcceptedTrade> for AcceptedTrade {
    type Error = DexError;

    fn try_from(raw: RawAcceptedTrade) -> Result<Self> {
        Ok(Self {
            message_id: message_id(&raw.trader_id, raw.message_number)?,
            order_number: OrderNumber(raw.order_number),
            recipient_order_id: order_id(&raw.recipient_trader_id, raw.recipient_order_number)?,
            price: positive_price(raw.price)?,
            quantity: positive_quantity(raw.quantity)?,
            timestamp: Timestamp::from_wire(raw.timestamp)?,
            ttl: Ttl::from_wire(raw.ttl)?,
        })
    }
}

impl TryFrom<RawDeclinedTrade> for DeclinedTrade {
    type Error = DexError;

    fn try_from(raw: RawDeclinedTrade) -> Result<Self> {
        Ok(Self {
            message_id: message_id(&raw.trader_id, raw.message_number)?,
            order_number: OrderNumber(raw.order_number),
            recipient_order_id: order_id(&raw.recipient_trader_id, raw.recipient_order_number)?,
            timestamp: Timestamp::from_wire(raw.timestamp)?,
        })
    }
}

impl TryFrom<RawStartTransaction> for StartTransaction {
    type Error = DexError;

    fn try_from(raw: RawStartTransaction) -> Result<Self> {
        let message_id = message_id(&raw.trader_id, raw.message_number)?;
        let recipient_order_id = order_id(&raw.recipient_trader_id, raw.recipient_order_number)?;
        Ok(Self {
            message_id,
            transaction_id: TransactionId::new(
                message_id.trader_id,
                TransactionNumber(raw.transaction_number),
            ),
            order_number: OrderNumber(raw.order_number),
            recipient_order_id,
            accepted_trade_id: MessageId::new(
                recipient_order_id.trader_id,
                MessageNumber(raw.accepted_message_number),
            ),
            price: positive_price(raw.price)?,
            quantity: positive_quantity(raw.quantity)?,
            timestamp: Timestamp::from_wire(raw.timestamp)?,
        })
    }
}

impl TryFrom<RawMultiChainPayment> for MultiChainPayment {
    type Error = DexError;

    fn try_from(raw: RawMultiChainPayment) -> Result<Self> {
        Ok(Self {
            message_id: message_id(&raw.trader_id, raw.message_number)?,
            transaction_id: transaction_id(&raw.transaction_trader_id, raw.transaction_number)?,
            bitcoin_address: BitcoinAddress::new(raw.bitcoin_address)?,
            transferor_quantity: Quantity::from_mil(raw.transferor_quantity)?,
            transferee_quantity: Quantity::from_mil(raw.transferee_quantity)?,
            timestamp: Timestamp::from_wire(raw.timestamp)?,
        })
    }
}

impl TryFrom<RawBitcoinPayment> for BitcoinPayment {
    type Error = DexError;

    fn try_from(raw: RawBitcoinPayment) -> Result<Self> {
        Ok(Self {
            message_id: message_id(&raw.trader_id, raw.message_number)?,
            transaction_id: transaction_id(&raw.transaction_trader_id, raw.transaction_number)?,
            quantity: Quantity::from_mil(raw.quantity)?,
            timestamp: Timestamp::from_wire(raw.timestamp)?,
        })
    }
}

impl TryFrom<RawEndTransaction> for EndTransaction {
    type Error = DexError;

    fn try_from(raw: RawEndTransaction) -> Result<Self> {
        Ok(Self {
            message_id: message_id(&raw.trader_id, raw.message_number)?,
            transaction_id: transaction_id(&raw.transaction_trader_id, raw.transaction_number)?,
            timestamp: Timestamp::from_wire(raw.timestamp)?,
        })
    }
}

impl TryFrom<RawMessage> for Message {
    type Error = DexError;

    fn try_from(raw: RawMessage) -> Result<Self> {
        Ok(match raw {
            RawMessage::Ask(p) => Self::Ask(p.try_into()?),
            RawMessage::Bid(p) => Self::Bid(p.try_into()?),
            RawMessage::ProposedTrade(p) => Self::ProposedTrade(p.try_into()?),
            RawMessage::CounterTrade(p) => Self::CounterTrade(p.try_into()?),
            RawMessage::AcceptedTrade(p) => Self::AcceptedTrade(p.try_into()?),
            RawMessage::DeclinedTrade(p) => Self::DeclinedTrade(p.try_into()?),
            RawMessage::StartTransaction(p) => Self::StartTransaction(p.try_into()?),
            RawMessage::MultiChainPayment(p) => Self::MultiChainPayment(p.try_into()?),
            RawMessage::BitcoinPayment(p) => Self::BitcoinPayment(p.try_into()?),
            RawMessage::EndTransaction(p) => Self::EndTransaction(p.try_into()?),
        })
    }
}

// ---------------------------------------------------------------------------
// Typed -> raw
// ---------------------------------------------------------------------------

fn raw_offer(m: &Offer) -> RawOffer {
    RawOffer {
        trader_id: m.message_id.trader_id.to_hex(),
        message_number: m.message_id.message_number.0,
        order_number: m.order_number.0,
        price: m.price.mil(),
        quantity: m.quantity.mil(),
        timeout: m.timeout.wire(),
        timestamp: m.timestamp.wire(),
        ttl: i64::from(m.ttl.0),
        ip: m.address.ip().to_string(),
        port: m.address.port(),
    }
}

fn raw_trade(m: &TradeProposal) -> RawTrade {
    RawTrade {
        trader_id: m.message_id.trader_id.to_hex(),
        message_number: m.message_id.message_number.0,
        order_number: m.order_number.0,
        recipient_trader_id: m.recipient_order_id.trader_id.to_hex(),
        recipient_order_number: m.recipient_order_id.order_number.0,
        price: m.price.mil(),
        quantity: m.quantity.mil(),
        timestamp: m.timestamp.wire(),
    }
}

impl From<&Message> for RawMessage {
    fn from(message: &Message) -> Self {
        match message {
            Message::Ask(m) => Self::Ask(raw_offer(m)),
            Message::Bid(m) => Self::Bid(raw_offer(m)),
            Message::ProposedTrade(m) => Self::ProposedTrade(raw_trade(m)),
            Message::CounterTrade(m) => Self::CounterTrade(raw_trade(m)),
            Message::AcceptedTrade(m) => Self::AcceptedTrade(RawAcceptedTrade {
                trader_id: m.message_id.trader_id.to_hex(),
                message_number: m.message_id.message_number.0,
                order_number: m.order_number.0,
                recipient_trader_id: m.recipient_order_id.trader_id.to_hex(),
                recipient_order_number: m.recipient_order_id.order_number.0,
                price: m.price.mil(),
                quantity: m.quantity.mil(),
                timestamp: m.timestamp.wire(),
                ttl: i64::from(m.ttl.0),
            }),
            Message::DeclinedTrade(m) => Self::DeclinedTrade(RawDeclinedTrade {
                trader_id: m.message_id.trader_id.to_hex(),
                message_number: m.message_id.message_number.0,
                order_number: m.order_number.0,
                recipient_trader_id: m.recipient_order_id.trader_id.to_hex(),
                recipient_order_number: m.recipient_order_id.order_number.0,
                timestamp: m.timestamp.wire(),
            }),
            Message::StartTransaction(m) => Self::StartTransaction(RawStartTransaction {
                trader_id: m.message_id.trader_id.to_hex(),
                message_number: m.message_id.message_number.0,
                transaction_number: m.transaction_id.transaction_number.0,
                order_number: m.order_number.0,
                recipient_trader_id: m.recipient_order_id.trader_id.to_hex(),
                recipient_order_number: m.recipient_order_id.order_number.0,
                accepted_message_number: m.accepted_trade_id.message_number.0,
                price: m.price.mil(),
                quantity: m.quantity.mil(),
                timestamp: m.timestamp.wire(),
            }),
            Message::MultiChainPayment(m) => Self::MultiChainPayment(RawMultiChainPayment {
                trader_id: m.message_id.trader_id.to_hex(),
                message_number: m.message_id.message_number.0,
                transaction_trader_id: m.transaction_id.trader_id.to_hex(),
                transaction_number: m.transaction_id.transaction_number.0,
                bitcoin_address: m.bitcoin_address.as_str().to_string(),
                transferor_quantity: m.transferor_quantity.mil(),
                transferee_quantity: m.transferee_quantity.mil(),
                timestamp: m.timestamp.wire(),
            }),
            Message::BitcoinPayment(m) => Self::BitcoinPayment(RawBitcoinPayment {
                trader_id: m.message_id.trader_id.to_hex(),
                message_number: m.message_id.message_number.0,
                transaction_trader_id: m.transaction_id.trader_id.to_hex(),
                transaction_number: m.transaction_id.transaction_number.0,
                quantity: m.quantity.mil(),
                timestamp: m.timestamp.wire(),
            }),
            Message::EndTransaction(m) => Self::EndTransaction(RawEndTransaction {
                trader_id: m.message_id.trader_id.to_hex(),
                message_number: m.message_id.message_number.0,
                transaction_trader_id: m.transaction_id.trader_id.to_hex(),
                transaction_number: m.transaction_id.transaction_number.0,
                timestamp: m.timestamp.wire(),
            }),
        }
    }
}
