//! Identifiers used throughout p2pdex.
//!
//! Every globally unique identity is a pair of the issuing [`TraderId`] and a
//! number that is monotonic per trader: orders, messages and transactions.
//! The numbers are handed out by [`TraderSequence`](crate::TraderSequence).

use std::fmt;

use ed25519_dalek::VerifyingKey;
use serde::{Deserialize, Serialize};

use crate::{DexError, Result};

// ---------------------------------------------------------------------------
// TraderId
// ---------------------------------------------------------------------------

/// Stable identifier of a network participant.
///
/// This is the raw ed25519 public key (32 bytes) of the trader's node and is
/// carried on the wire as 64 lowercase hex characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TraderId(pub [u8; 32]);

impl TraderId {
    #[must_use]
    pub fn from_pubkey(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    #[must_use]
    pub fn from_verifying_key(key: &VerifyingKey) -> Self {
        Self(key.to_bytes())
    }

    /// Parse the 64-character hex form used on the wire.
    pub fn from_hex(s: &str) -> Result<Self> {
        let bytes = hex::decode(s).map_err(|e| DexError::InvalidValue {
            field: "trader_id",
            reason: e.to_string(),
        })?;
        let bytes: [u8; 32] = bytes.try_into().map_err(|_| DexError::InvalidValue {
            field: "trader_id",
            reason: "expected 32 bytes".to_string(),
        })?;
        Ok(Self(bytes))
    }

    #[must_use]
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    #[must_use]
    pub fn short(&self) -> String {
        hex::encode(&self.0[..4])
    }
}

impl fmt::Display for TraderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "trader:{}", hex::encode(&self.0[..8]))
    }
}

impl TryFrom<String> for TraderId {
    type Error = DexError;

    fn try_from(value: String) -> Result<Self> {
        Self::from_hex(&value)
    }
}

impl From<TraderId> for String {
    fn from(id: TraderId) -> Self {
        id.to_hex()
    }
}

/// Test helpers.
#[cfg(any(test, feature = "test-helpers"))]
impl TraderId {
    /// A random trader identity. **Never use in production.**
    pub fn random() -> Self {
        Self(rand::random::<[u8; 32]>())
    }
}

// ---------------------------------------------------------------------------
// OrderNumber / OrderId
// ---------------------------------------------------------------------------

/// Locally unique, monotonically assigned order number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct OrderNumber(pub u64);

impl fmt::Display for OrderNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Globally unique order identity: the owning trader plus its order number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct OrderId {
    pub trader_id: TraderId,
    pub order_number: OrderNumber,
}

impl OrderId {
    #[must_use]
    pub fn new(trader_id: TraderId, order_number: OrderNumber) -> Self {
        Self {
            trader_id,
            order_number,
        }
    }

    /// Returns `true` if this order belongs to `trader`.
    #[must_use]
    pub fn is_owned_by(&self, trader: &TraderId) -> bool {
        self.trader_id == *trader
    }
}

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.trader_id.short(), self.order_number)
    }
}

// ---------------------------------------------------------------------------
// MessageNumber / MessageId
// ---------------------------------------------------------------------------

/// Locally unique number assigned to each outgoing message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct MessageNumber(pub u64);

impl fmt::Display for MessageNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Globally unique message identity, used for causality and duplicate
/// detection (not for physical ordering).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct MessageId {
    pub trader_id: TraderId,
    pub message_number: MessageNumber,
}

impl MessageId {
    #[must_use]
    pub fn new(trader_id: TraderId, message_number: MessageNumber) -> Self {
        Self {
            trader_id,
            message_number,
        }
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "msg:{}.{}", self.trader_id.short(), self.message_number)
    }
}

// ---------------------------------------------------------------------------
// TransactionNumber / TransactionId
// ---------------------------------------------------------------------------

/// Locally unique number assigned to each transaction a trader starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct TransactionNumber(pub u64);

impl fmt::Display for TransactionNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Globally unique settlement identity: the trader that started the
/// transaction plus its transaction number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct TransactionId {
    pub trader_id: TraderId,
    pub transaction_number: TransactionNumber,
}

impl TransactionId {
    #[must_use]
    pub fn new(trader_id: TraderId, transaction_number: TransactionNumber) -> Self {
        Self {
            trader_id,
            transaction_number,
        }
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tx:{}.{}", self.trader_id.short(), self.transaction_number)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
