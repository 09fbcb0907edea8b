//! # p2pdex-types
//!
//! Shared types, errors, and configuration for the **p2pdex** trading core.
//!
//! This crate is the leaf dependency of the workspace: every other crate
//! depends on it. It defines:
//!
//! - **Identifiers**: [`TraderId`], [`OrderId`], [`MessageId`], [`TransactionId`] and their numbers
//! - **Values**: [`Price`], [`Quantity`] (mil fixed-point), [`Timestamp`], [`Timeout`], [`Ttl`], [`BitcoinAddress`]
//! - **Order model**: [`Order`], [`OrderSide`], [`OrderStatus`]
//! - **Tick model**: [`Tick`]
//! - **Messages**: [`Message`] and one struct per wire message
//! - **Sequencing**: [`TraderSequence`]
//! - **Configuration**: [`NodeConfig`], [`NegotiationConfig`], [`LogConfig`]
//! - **Errors**: [`DexError`] with `DEX_ERR_` prefix codes
//! - **Constants**: system-wide limits and defaults

pub mod amount;
pub mod config;
pub mod constants;
pub mod error;
pub mod ids;
pub mod message;
pub mod network;
pub mod order;
pub mod sequence;
pub mod tick;
pub mod time;

// Re-export all primary types at crate root for ergonomic imports:
//   use p2pdex_types::{Order, OrderSide, Tick, Message, ...};

pub use amount::*;
pub use config::*;
pub use error::*;
pub use ids::*;
pub use message::*;
pub use network::*;
pub use order::*;
pub use sequence::*;
pub use tick::*;
pub use time::*;

// Constants are accessed via `p2pdex_types::constants::FOO`
// (not re-exported to avoid name collisions).
