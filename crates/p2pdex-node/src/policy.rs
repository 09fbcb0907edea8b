//! Negotiation policy seam.
//!
//! How to answer an incoming proposal is a caller decision. The node asks a
//! [`NegotiationPolicy`] and enforces the mechanics (reservations, depth
//! bound) itself.

use p2pdex_types::{Order, Price, Quantity, Timestamp, TradeProposal};

/// Answer to an incoming proposed or counter trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Accept,
    Decline,
    /// Propose different terms back.
    Counter { price: Price, quantity: Quantity },
}

/// Decides how the local trader answers a proposal against `order`.
pub trait NegotiationPolicy: Send + Sync {
    fn evaluate(&self, order: &Order, proposal: &TradeProposal, now: Timestamp) -> Decision;
}

/// Default policy: honour the order's limit price.
///
/// - invalid order or incompatible price: decline
/// - enough available quantity: accept
/// - some but not enough: counter with what is available at the same price
#[derive(Debug, Clone, Copy, Default)]
pub struct LimitPricePolicy;

impl NegotiationPolicy for LimitPricePolicy {
    fn evaluate(&self, order: &Order, proposal: &TradeProposal, now: Timestamp) -> Decision {
        if !order.is_valid(now) || !order.side().accepts(order.price(), proposal.price) {
            return Decision::Decline;
        }
        let available = order.available_quantity();
        if available >= proposal.quantity {
            Decision::Accept
        } else if available.is_zero() {
            Decision::Decline
        } else {
            Decision::Counter {
                price: proposal.price,
                quantity: available,
            }
        }
    }
}
