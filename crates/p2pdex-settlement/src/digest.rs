//! Settlement digest for cross-node comparison.
//!
//! Both parties to a transaction record the same terms and the same two
//! payments. The digest is a SHA-256 over those facts in a fixed,
//! orientation-free order (ask side before bid side, multi-chain before
//! bitcoin), so the two nodes can compare one hash instead of full records.

use sha2::{Digest, Sha256};

use crate::transaction::{RecordedPayment, Transaction};

fn hash_payment(hasher: &mut Sha256, payment: Option<&RecordedPayment>) {
    match payment {
        None => hasher.update([0u8]),
        Some(p) => {
            hasher.update([1u8]);
            hasher.update(p.message_id.trader_id.as_bytes());
            hasher.update(p.message_id.message_number.0.to_le_bytes());
            hasher.update(p.quantity.mil().to_le_bytes());
            if let Some(q) = p.transferee_quantity {
                hasher.update(q.mil().to_le_bytes());
            }
            if let Some(addr) = &p.bitcoin_address {
                hasher.update(addr.as_str().as_bytes());
            }
        }
    }
}

/// Compute the settlement digest of a transaction.
#[must_use]
pub fn settlement_digest(tx: &Transaction) -> [u8; 32] {
    let terms = &tx.terms;
    let ask = terms.ask_order_id();
    let bid = terms.bid_order_id();

    let mut hasher = Sha256::new();
    hasher.update(b"p2pdex:settlement:v1:");
    hasher.update(terms.transaction_id.trader_id.as_bytes());
    hasher.update(terms.transaction_id.transaction_number.0.to_le_bytes());
    hasher.update(ask.trader_id.as_bytes());
    hasher.update(ask.order_number.0.to_le_bytes());
    hasher.update(bid.trader_id.as_bytes());
    hasher.update(bid.order_number.0.to_le_bytes());
    hasher.update(terms.price.mil().to_le_bytes());
    hasher.update(terms.quantity.mil().to_le_bytes());
    hash_payment(&mut hasher, tx.multi_chain_payment());
    hash_payment(&mut hasher, tx.bitcoin_payment());

    let result = hasher.finalize();
    let mut digest = [0u8; 32];
    digest.copy_from_slice(&result);
    digest
}

/// Hex form of [`settlement_digest`], for logs.
#[must_use]
pub fn settlement_digest_hex(tx: &Transaction) -> String {
    hex::encode(settlement_digest(tx))
}

/// Recompute and compare against a digest reported by the counter-party.
#[must_use]
pub fn verify_settlement_digest(tx: &Transaction, expected: &[u8; 32]) -> bool {
    settlement_digest(tx) == *expected
}
