//! System-wide constants for the p2pdex trading core.

/// Scale factor between a decimal value and its mil integer representation.
pub const MIL_SCALE: u64 = 1000;

/// Number of fractional digits carried by a mil value.
pub const MIL_DECIMALS: u32 = 3;

/// Largest mil integer accepted for a [`Price`](crate::Price) or
/// [`Quantity`](crate::Quantity).
#[allow(clippy::cast_sign_loss)]
pub const MAX_MIL: u64 = i64::MAX as u64;

/// Default hop budget attached to gossiped messages.
pub const DEFAULT_TTL: u8 = 2;

/// Default response timeout for an outstanding proposed trade (milliseconds).
pub const DEFAULT_PROPOSAL_TIMEOUT_MS: u64 = 30_000;

/// Default time an acceptor holds its reservation waiting for a
/// start-transaction (milliseconds).
pub const DEFAULT_ACCEPTANCE_TIMEOUT_MS: u64 = 30_000;

/// Default settlement deadline for a started transaction (milliseconds).
pub const DEFAULT_TRANSACTION_TIMEOUT_MS: u64 = 300_000;

/// Default bound on counter-offer rounds within one negotiation.
pub const DEFAULT_MAX_NEGOTIATION_DEPTH: u32 = 3;

/// Default expiry sweep period (milliseconds).
pub const DEFAULT_SWEEP_INTERVAL_MS: u64 = 1_000;

/// Number of message IDs remembered for duplicate detection.
pub const DEFAULT_IDEMPOTENCY_CACHE_SIZE: usize = 100_000;

/// Default port advertised in tick publications.
pub const DEFAULT_LISTEN_PORT: u16 = 7759;

/// Longest accepted bitcoin-style settlement address.
pub const MAX_BITCOIN_ADDRESS_LEN: usize = 90;

/// Version string.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Engine name.
pub const ENGINE_NAME: &str = "p2pdex";

/// Number of concluded negotiation outcomes kept for inspection.
pub const NEGOTIATION_HISTORY_SIZE: usize = 10_000;

/// Number of closed reservations the ledger remembers.
pub const RESERVATION_HISTORY_SIZE: usize = 10_000;
