//! The idempotency index: detects duplicate submissions by a stable
//! fingerprint over the identifying fields of an order.

use crate::core::types::{OrderId, Side};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use rust_decimal::Decimal;

/// A stable hash of `(user_id, symbol, side, quantity, limit_price,
/// client_order_id)`. Computed with a fixed FNV-1a accumulator rather than
/// `std::collections::hash_map::DefaultHasher` so the value is documented-
/// stable across process invocations, not merely an implementation detail of
/// the current toolchain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fingerprint(pub u64);

const FNV_OFFSET: u64 = 0xcbf29ce484222325;
const FNV_PRIME: u64 = 0x100000001b3;

fn fnv1a(bytes: &[u8], mut hash: u64) -> u64 {
    for &b in bytes {
        hash ^= b as u64;
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}

/// Computes the fingerprint for a submission. When `client_order_id` is
/// absent, `nonce` (specific to this submission) is folded in instead, so
/// absence of a client order id disables deduplication.
pub fn compute_fingerprint(
    user_id: &str,
    symbol: &str,
    side: Side,
    quantity: Decimal,
    limit_price: Decimal,
    client_order_id: Option<&str>,
    nonce: u128,
) -> Fingerprint {
    let mut hash = FNV_OFFSET;
    hash = fnv1a(user_id.as_bytes(), hash);
    hash = fnv1a(symbol.as_bytes(), hash);
    hash = fnv1a(&[side.sign() as u8], hash);
    hash = fnv1a(quantity.to_string().as_bytes(), hash);
    hash = fnv1a(limit_price.to_string().as_bytes(), hash);
    match client_order_id {
        Some(id) => hash = fnv1a(id.as_bytes(), hash),
        None => hash = fnv1a(&nonce.to_le_bytes(), hash),
    }
    Fingerprint(hash)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimOutcome {
    Accepted,
    Duplicate(OrderId),
}

/// Detects duplicate submissions by fingerprint. `claim` is a single
/// critical section per fingerprint via `DashMap`'s entry API.
pub struct IdempotencyIndex {
    claims: DashMap<Fingerprint, OrderId>,
}

impl IdempotencyIndex {
    pub fn new() -> Self {
        Self {
            claims: DashMap::new(),
        }
    }

    /// Atomically inserts `order_id` under `fingerprint` if absent;
    /// otherwise returns the prior order's identifier.
    pub fn claim(&self, fingerprint: Fingerprint, order_id: OrderId) -> ClaimOutcome {
        match self.claims.entry(fingerprint) {
            Entry::Occupied(o) => ClaimOutcome::Duplicate(*o.get()),
            Entry::Vacant(v) => {
                v.insert(order_id);
                ClaimOutcome::Accepted
            }
        }
    }
}

impl Default for IdempotencyIndex {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn fingerprint_is_stable_for_identical_input() {
        let a = compute_fingerprint("u1", "AAPL", Side::Buy, dec!(100), dec!(150), Some("k1"), 0);
        let b = compute_fingerprint("u1", "AAPL", Side::Buy, dec!(100), dec!(150), Some("k1"), 0);
        assert_eq!(a, b);
    }

    #[test]
    fn fingerprint_differs_on_any_field() {
        let base = compute_fingerprint("u1", "AAPL", Side::Buy, dec!(100), dec!(150), Some("k1"), 0);
        let diff_qty = compute_fingerprint("u1", "AAPL", Side::Buy, dec!(101), dec!(150), Some("k1"), 0);
        assert_ne!(base, diff_qty);
    }

    #[test]
    fn absent_client_order_id_disables_dedup_via_nonce() {
        let a = compute_fingerprint("u1", "AAPL", Side::Buy, dec!(100), dec!(150), None, 1);
        let b = compute_fingerprint("u1", "AAPL", Side::Buy, dec!(100), dec!(150), None, 2);
        assert_ne!(a, b);
    }

    #[test]
    fn second_claim_of_same_fingerprint_is_duplicate() {
        let index = IdempotencyIndex::new();
        let fp = compute_fingerprint("u1", "AAPL", Side::Buy, dec!(100), dec!(150), Some("k1"), 0);
        let first = OrderId::generate();
        let second = OrderId::generate();
        assert_eq!(index.claim(fp, first), ClaimOutcome::Accepted);
        assert_eq!(index.claim(fp, second), ClaimOutcome::Duplicate(first));
    }
}
