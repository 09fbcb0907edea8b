//! # p2pdex-node
//!
//! **The trader node core.**
//!
//! Ties the book, the wire codec and settlement tracking into one trader's
//! node:
//!
//! - [`OrderManager`]: the trader's own orders and their quantity accounting
//! - [`MarketState`]: inbound dispatch and the negotiation state machine
//! - [`MarketState::sweep`]: deadline expiry for ticks, proposals, holds and
//!   transactions
//! - [`MarketNode`]: the lock-protected handle the transport and the
//!   sweeper task share
//!
//! The network and the clock are seams ([`Transport`], [`Clock`]); nothing
//! in this crate opens a socket.

pub mod clock;
pub mod expiry;
pub mod market;
pub mod negotiation;
pub mod node;
pub mod order_manager;
pub mod outbound;
pub mod policy;
pub mod telemetry;

pub use clock::{Clock, ManualClock, SystemClock};
pub use expiry::SweepReport;
pub use market::MarketState;
pub use negotiation::{AcceptedHold, NegotiationState, NegotiationTable, PendingProposal};
pub use node::MarketNode;
pub use order_manager::OrderManager;
pub use outbound::{Outbound, Transport};
pub use policy::{Decision, LimitPricePolicy, NegotiationPolicy};
pub use telemetry::init_tracing;
