//! Error types for the p2pdex trading core.
//!
//! All errors use the `DEX_ERR_` prefix convention for easy grepping in logs.
//! Error codes are grouped by subsystem:
//! - 1xx: Order errors
//! - 2xx: Order book / tick errors
//! - 3xx: Negotiation errors
//! - 4xx: Transaction / payment errors
//! - 5xx: Protocol (decode) errors
//! - 6xx: Reconciliation errors
//! - 9xx: General / internal errors
//!
//! Every variant also maps onto an [`ErrorKind`], which decides how a node
//! treats the failure: protocol and validation errors are handled locally and
//! never leave the node, reconciliation errors are surfaced for external
//! dispute handling.

use thiserror::Error;

use crate::{MessageId, OrderId, PaymentRail, Quantity, TraderId, TransactionId};

/// Coarse classification of a [`DexError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Malformed or inconsistent wire payload. Rejected with no state change.
    Protocol,
    /// A claim that violates a local invariant. Rejected, never fatal.
    Validation,
    /// Payment amounts that do not reconcile with the agreed terms.
    Reconciliation,
    /// Local contract violation or environment failure.
    Internal,
}

/// Central error enum for all p2pdex operations.
#[derive(Debug, Error)]
pub enum DexError {
    // =================================================================
    // Order Errors (1xx)
    // =================================================================
    /// The requested local order does not exist.
    #[error("DEX_ERR_100: Order not found: {0}")]
    OrderNotFound(OrderId),

    /// The order failed validation (bad price, zero quantity, etc.).
    #[error("DEX_ERR_101: Invalid order: {reason}")]
    InvalidOrder { reason: String },

    /// Not enough unreserved, untraded quantity left on the order.
    #[error("DEX_ERR_102: Insufficient quantity: requested {requested}, available {available}")]
    InsufficientQuantity {
        requested: Quantity,
        available: Quantity,
    },

    /// Attempted to commit more than is currently reserved.
    #[error("DEX_ERR_103: Insufficient reservation: requested {requested}, reserved {reserved}")]
    InsufficientReservation {
        requested: Quantity,
        reserved: Quantity,
    },

    /// The order is expired or cancelled and cannot take new reservations.
    #[error("DEX_ERR_104: Order is not valid: {0}")]
    OrderNotValid(OrderId),

    // =================================================================
    // Order Book Errors (2xx)
    // =================================================================
    /// No tick for this order is held in the book.
    #[error("DEX_ERR_200: Tick not found: {0}")]
    TickNotFound(OrderId),

    /// Releasing more than the tick currently has reserved.
    #[error("DEX_ERR_201: Tick reservation underflow on {0}")]
    TickReservationUnderflow(OrderId),

    // =================================================================
    // Negotiation Errors (3xx)
    // =================================================================
    /// No pending proposal matches the response.
    #[error("DEX_ERR_300: No pending proposal for {0}")]
    ProposalNotFound(MessageId),

    /// A counter-offer would exceed the configured negotiation depth.
    #[error("DEX_ERR_301: Negotiation depth exceeded: depth {depth}, max {max}")]
    NegotiationDepthExceeded { depth: u32, max: u32 },

    /// A proposal paired two orders on the same side, or the same trader.
    #[error("DEX_ERR_302: Invalid proposal: {reason}")]
    InvalidProposal { reason: String },

    // =================================================================
    // Transaction / Payment Errors (4xx)
    // =================================================================
    /// The transaction is not known to this node.
    #[error("DEX_ERR_400: Transaction not found: {0}")]
    TransactionNotFound(TransactionId),

    /// A payment for this rail has already been recorded.
    #[error("DEX_ERR_401: Duplicate payment on {rail} rail for {transaction}")]
    DuplicatePayment {
        transaction: TransactionId,
        rail: PaymentRail,
    },

    /// The transaction has reached a terminal state.
    #[error("DEX_ERR_402: Transaction {0} is closed")]
    TransactionClosed(TransactionId),

    /// A transaction with this ID already exists.
    #[error("DEX_ERR_403: Transaction already exists: {0}")]
    DuplicateTransaction(TransactionId),

    /// A settlement message came from a trader that is not the counter-party.
    #[error("DEX_ERR_404: {sender} is not a party to {transaction}")]
    NotAParty {
        transaction: TransactionId,
        sender: TraderId,
    },

    // =================================================================
    // Protocol Errors (5xx)
    // =================================================================
    /// The payload could not be decoded into a known message.
    #[error("DEX_ERR_500: Decode error: {0}")]
    Decode(String),

    /// A decoded field failed its value-type validation.
    #[error("DEX_ERR_501: Invalid '{field}': {reason}")]
    InvalidValue { field: &'static str, reason: String },

    // =================================================================
    // Reconciliation Errors (6xx)
    // =================================================================
    /// A rail payment does not sum to the agreed quantity.
    #[error(
        "DEX_ERR_600: Reconciliation mismatch on {rail} rail for {transaction}: agreed {agreed}, paid {paid}"
    )]
    ReconciliationMismatch {
        transaction: TransactionId,
        rail: PaymentRail,
        agreed: Quantity,
        paid: Quantity,
    },

    // =================================================================
    // General / Internal (9xx)
    // =================================================================
    /// A local invariant was broken (double release, over-commit, ...).
    #[error("DEX_ERR_900: Invariant violation: {0}")]
    InvariantViolation(String),

    /// Serialization error outside of wire decoding.
    #[error("DEX_ERR_901: Serialization error: {0}")]
    Serialization(String),

    /// Configuration error (invalid config file, missing fields, etc.).
    #[error("DEX_ERR_902: Configuration error: {0}")]
    Configuration(String),

    /// I/O error (disk, network).
    #[error("DEX_ERR_903: I/O error: {0}")]
    Io(String),
}

impl DexError {
    /// Classify the error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Decode(_) | Self::InvalidValue { .. } => ErrorKind::Protocol,
            Self::ReconciliationMismatch { .. } => ErrorKind::Reconciliation,
            Self::InvariantViolation(_)
            | Self::Serialization(_)
            | Self::Configuration(_)
            | Self::Io(_) => ErrorKind::Internal,
            _ => ErrorKind::Validation,
        }
    }
}

/// Crate-wide `Result` alias.
pub type Result<T> = std::result::Result<T, DexError>;

// Conversion from std::io::Error
impl From<std::io::Error> for DexError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}
