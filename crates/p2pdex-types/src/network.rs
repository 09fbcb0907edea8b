//! Network-facing scalar types: [`Ttl`] and [`BitcoinAddress`].
//!
//! The core never interprets these beyond validation. The overlay decrements
//! the TTL on relay; the settlement address is forwarded to the payment rail.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{DexError, Result, constants};

/// Hop budget attached to gossiped messages (ticks, accepted trades).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct Ttl(pub u8);

impl Ttl {
    pub const DEFAULT: Self = Self(constants::DEFAULT_TTL);

    /// Build a TTL from its wire form.
    pub fn from_wire(value: i64) -> Result<Self> {
        u8::try_from(value)
            .map(Self)
            .map_err(|_| DexError::InvalidValue {
                field: "ttl",
                reason: format!("{value} out of range 0..=255"),
            })
    }

    /// Whether the overlay should still forward a message carrying this TTL.
    #[must_use]
    pub fn can_relay(self) -> bool {
        self.0 > 0
    }
}

impl Default for Ttl {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl fmt::Display for Ttl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Settlement address on the secondary (bitcoin-style) rail.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct BitcoinAddress(String);

impl BitcoinAddress {
    pub fn new(address: impl Into<String>) -> Result<Self> {
        let address = address.into();
        if address.is_empty() {
            return Err(DexError::InvalidValue {
                field: "bitcoin_address",
                reason: "empty".to_string(),
            });
        }
        if address.len() > constants::MAX_BITCOIN_ADDRESS_LEN {
            return Err(DexError::InvalidValue {
                field: "bitcoin_address",
                reason: format!("longer than {}", constants::MAX_BITCOIN_ADDRESS_LEN),
            });
        }
        if !address.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(DexError::InvalidValue {
                field: "bitcoin_address",
                reason: "non-alphanumeric character".to_string(),
            });
        }
        Ok(Self(address))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for BitcoinAddress {
    type Error = DexError;

    fn try_from(value: String) -> Result<Self> {
        Self::new(value)
    }
}

impl From<BitcoinAddress> for String {
    fn from(addr: BitcoinAddress) -> Self {
        addr.0
    }
}

impl fmt::Display for BitcoinAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
