//! # p2pdex-settlement
//!
//! **Settlement tracking** for accepted trades.
//!
//! After two traders agree on a trade, value moves over two independent
//! payment rails outside this crate. This crate records the claims:
//! 1. Creates a [`Transaction`] per accepted trade (exactly once)
//! 2. Records one payment per rail, reconciling it against the agreed quantity
//! 3. Completes when both rails reconcile, flags mismatches, aborts at deadline
//! 4. Tracks every reservation to a single terminal outcome
//! 5. Fingerprints completed settlements for cross-node comparison
//!
//! It also provides the bounded [`IdempotencyGuard`] the node uses to drop
//! duplicate message deliveries.

pub mod digest;
pub mod idempotency;
pub mod reservation_ledger;
pub mod tracker;
pub mod transaction;

pub use digest::{settlement_digest, settlement_digest_hex, verify_settlement_digest};
pub use idempotency::IdempotencyGuard;
pub use reservation_ledger::{ReservationLedger, ReservationState};
pub use tracker::{StartOutcome, TransactionTracker};
pub use transaction::{
    MismatchRecord, PaymentOutcome, RecordedPayment, Transaction, TransactionState,
    TransactionTerms,
};
