//! Transport seam.
//!
//! The core never touches the network. Every state transition returns the
//! messages it wants delivered as [`Outbound`] values; the node encodes them
//! and hands the bytes to a [`Transport`] after releasing its lock.

use p2pdex_types::{Message, TraderId};

/// A message the core wants delivered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    /// To one trader (negotiation and settlement traffic).
    Direct { to: TraderId, message: Message },
    /// Gossip originated by this node.
    Broadcast(Message),
    /// Gossip received from a peer, forwarded while its Ttl allows.
    Relay(Message),
}

impl Outbound {
    #[must_use]
    pub fn message(&self) -> &Message {
        match self {
            Self::Direct { message, .. } | Self::Broadcast(message) | Self::Relay(message) => {
                message
            }
        }
    }

    /// The addressed trader, if this is a direct send.
    #[must_use]
    pub fn destination(&self) -> Option<TraderId> {
        match self {
            Self::Direct { to, .. } => Some(*to),
            Self::Broadcast(_) | Self::Relay(_) => None,
        }
    }
}

/// The peer-to-peer overlay as the core sees it.
///
/// Delivery is fire-and-forget: no outcome is reported back, loss is covered
/// by negotiation and transaction deadlines.
pub trait Transport: Send + Sync {
    fn send(&self, to: &TraderId, payload: Vec<u8>);

    fn broadcast(&self, payload: Vec<u8>);

    /// Forward a peer's gossip. The overlay owns the hop count.
    fn relay(&self, payload: Vec<u8>) {
        self.broadcast(payload);
    }
}
