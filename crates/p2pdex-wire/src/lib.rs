//! # p2pdex-wire
//!
//! Serialization of p2pdex protocol messages.
//!
//! The core treats this crate as a black box: [`encode`] a typed
//! [`Message`](p2pdex_types::Message) into bytes, [`decode`] bytes back.
//! Prices and quantities travel as mil integers, times as integer
//! milliseconds, so the same decimal value is bit-identical on every node.
//! A decode either yields a fully validated message or an error; there is
//! no partial result.

pub mod codec;
pub mod raw;

pub use codec::{decode, encode};
pub use raw::RawMessage;
