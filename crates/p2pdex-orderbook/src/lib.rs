//! # p2pdex-orderbook
//!
//! **The local order book and matcher for a p2pdex trader node.**
//!
//! Each node keeps its own view of the market, built from gossiped ticks
//! and its own orders. This crate holds that view and pairs compatible
//! ticks:
//!
//! - **Price-time priority**: best price first, earliest timestamp within a price
//! - **Scan-and-reserve**: every match reserves quantity before the next candidate
//! - **Locality**: only local-vs-peer pairs are proposed, self trades are skipped
//! - **No I/O**: callers turn [`Match`]es into protocol messages

pub mod matcher;
pub mod orderbook;
pub mod price_level;

pub use matcher::{LocalOrders, Match, match_all, match_tick};
pub use orderbook::OrderBook;
pub use price_level::PriceLevel;
