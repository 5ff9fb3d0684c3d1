//! The position store: the in-memory materialization of executed fills into
//! symbol-level positions. The store is the only component allowed to
//! mutate positions; all mutations happen in response to `EXECUTION_COMPLETED`.

use crate::core::types::{now_micros, Side};
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use rust_decimal::Decimal;
use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PositionError {
    /// A consistency violation that should be structurally unreachable.
    /// A programming error, not a recoverable runtime condition.
    #[error("position state inconsistent: {reason}")]
    InconsistentState { reason: String },
}

/// A symbol's position. `average_price` is the reference price used for
/// exposure calculations: the last fill price of that symbol.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize)]
pub struct Position {
    pub quantity: Decimal,
    pub average_price: Decimal,
    pub last_update: i64,
}

impl Position {
    pub const FLAT: Position = Position {
        quantity: Decimal::ZERO,
        average_price: Decimal::ZERO,
        last_update: 0,
    };

    /// `quantity × reference_price`, this position's contribution to net
    /// and gross exposure.
    pub fn signed_notional(&self) -> Decimal {
        self.quantity * self.average_price
    }
}

/// Applies a fill to an existing (possibly absent) position. Pure so it can
/// be reused both by `PositionStore::apply_fill` and by the risk engine's
/// hypothetical projection, without mutating shared state.
pub fn apply_fill_pure(
    existing: Option<Position>,
    side: Side,
    quantity: Decimal,
    price: Decimal,
    now: i64,
) -> Result<Position, PositionError> {
    if quantity <= Decimal::ZERO {
        return Err(PositionError::InconsistentState {
            reason: format!("apply_fill called with non-positive quantity {quantity}"),
        });
    }

    let signed_qty = Decimal::from(side.sign()) * quantity;

    let Some(pos) = existing else {
        return Ok(Position {
            quantity: signed_qty,
            average_price: price,
            last_update: now,
        });
    };

    if pos.quantity == Decimal::ZERO {
        // Flat row (possibly a prior zero-crossing): opens cleanly on either side.
        return Ok(Position {
            quantity: signed_qty,
            average_price: price,
            last_update: now,
        });
    }

    let same_direction = pos.quantity.signum() == signed_qty.signum();

    if same_direction {
        let old_abs = pos.quantity.abs();
        let new_abs = old_abs + quantity;
        let average_price = (old_abs * pos.average_price + quantity * price) / new_abs;
        Ok(Position {
            quantity: pos.quantity + signed_qty,
            average_price,
            last_update: now,
        })
    } else {
        let old_abs = pos.quantity.abs();
        if quantity < old_abs {
            // Partial reduction: average price unchanged.
            Ok(Position {
                quantity: pos.quantity + signed_qty,
                average_price: pos.average_price,
                last_update: now,
            })
        } else if quantity == old_abs {
            // Exact zero-crossing: keep the row at zero so the next fill of
            // either side opens cleanly.
            Ok(Position {
                quantity: Decimal::ZERO,
                average_price: price,
                last_update: now,
            })
        } else {
            // Signs cross: the residual opens a new position on the
            // opposite side at the fill price.
            let residual = quantity - old_abs;
            Ok(Position {
                quantity: Decimal::from(side.sign()) * residual,
                average_price: price,
                last_update: now,
            })
        }
    }
}

/// Per-symbol state sharded behind a `DashMap<String, Mutex<Position>>`,
/// plus a coarse `RwLock<()>` over the whole table for consistent
/// snapshots.
///
/// - `apply_fill` takes the table lock in read mode, so distinct symbols
///   still mutate concurrently, each guarded by its own `Mutex`.
/// - `snapshot()` takes it in write mode, excluding every `apply_fill` for
///   the duration of the walk, so the resulting copy is genuinely
///   point-in-time consistent rather than merely per-symbol consistent.
pub struct PositionStore {
    positions: DashMap<String, Mutex<Position>>,
    table_lock: RwLock<()>,
}

impl PositionStore {
    pub fn new() -> Self {
        Self {
            positions: DashMap::new(),
            table_lock: RwLock::new(()),
        }
    }

    pub fn apply_fill(
        &self,
        symbol: &str,
        side: Side,
        quantity: Decimal,
        price: Decimal,
    ) -> Result<Position, PositionError> {
        use dashmap::mapref::entry::Entry;

        let _table_guard = self.table_lock.read();
        let now = now_micros();
        match self.positions.entry(symbol.to_string()) {
            Entry::Vacant(v) => {
                let updated = apply_fill_pure(None, side, quantity, price, now)?;
                v.insert(Mutex::new(updated));
                Ok(updated)
            }
            Entry::Occupied(o) => {
                let mut guard = o.get().lock();
                let updated = apply_fill_pure(Some(*guard), side, quantity, price, now)?;
                *guard = updated;
                Ok(updated)
            }
        }
    }

    pub fn position(&self, symbol: &str) -> Option<Position> {
        self.positions.get(symbol).map(|m| *m.lock())
    }

    /// A truly consistent point-in-time copy across all symbols. The
    /// write-locked `table_lock` excludes every concurrent `apply_fill`
    /// for the duration of the walk.
    pub fn snapshot(&self) -> HashMap<String, Position> {
        let _table_guard = self.table_lock.write();
        self.positions
            .iter()
            .map(|entry| (entry.key().clone(), *entry.value().lock()))
            .collect()
    }
}

impl Default for PositionStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn new_buy_position_opens_long() {
        let store = PositionStore::new();
        let pos = store.apply_fill("AAPL", Side::Buy, dec!(100), dec!(150.50)).unwrap();
        assert_eq!(pos.quantity, dec!(100));
        assert_eq!(pos.average_price, dec!(150.50));
    }

    #[test]
    fn new_sell_position_opens_short() {
        let store = PositionStore::new();
        let pos = store.apply_fill("AAPL", Side::Sell, dec!(50), dec!(100)).unwrap();
        assert_eq!(pos.quantity, dec!(-50));
    }

    #[test]
    fn repeated_buys_average_the_price() {
        let store = PositionStore::new();
        store.apply_fill("AAPL", Side::Buy, dec!(100), dec!(100)).unwrap();
        let pos = store.apply_fill("AAPL", Side::Buy, dec!(100), dec!(200)).unwrap();
        assert_eq!(pos.quantity, dec!(200));
        assert_eq!(pos.average_price, dec!(150));
    }

    #[test]
    fn partial_opposite_fill_reduces_without_changing_average() {
        let store = PositionStore::new();
        store.apply_fill("AAPL", Side::Buy, dec!(100), dec!(100)).unwrap();
        let pos = store.apply_fill("AAPL", Side::Sell, dec!(40), dec!(500)).unwrap();
        assert_eq!(pos.quantity, dec!(60));
        assert_eq!(pos.average_price, dec!(100));
    }

    #[test]
    fn exact_zero_crossing_keeps_flat_row_at_fill_price() {
        let store = PositionStore::new();
        store.apply_fill("AAPL", Side::Buy, dec!(100), dec!(100)).unwrap();
        let pos = store.apply_fill("AAPL", Side::Sell, dec!(100), dec!(222)).unwrap();
        assert_eq!(pos.quantity, Decimal::ZERO);
        assert_eq!(pos.average_price, dec!(222));
    }

    #[test]
    fn sign_crossing_opens_opposite_side_at_fill_price() {
        let store = PositionStore::new();
        store.apply_fill("AAPL", Side::Buy, dec!(100), dec!(100)).unwrap();
        let pos = store.apply_fill("AAPL", Side::Sell, dec!(150), dec!(300)).unwrap();
        assert_eq!(pos.quantity, dec!(-50));
        assert_eq!(pos.average_price, dec!(300));
    }

    #[test]
    fn flat_row_reopens_cleanly_on_either_side() {
        let store = PositionStore::new();
        store.apply_fill("AAPL", Side::Buy, dec!(100), dec!(100)).unwrap();
        store.apply_fill("AAPL", Side::Sell, dec!(100), dec!(200)).unwrap();
        let pos = store.apply_fill("AAPL", Side::Sell, dec!(10), dec!(300)).unwrap();
        assert_eq!(pos.quantity, dec!(-10));
        assert_eq!(pos.average_price, dec!(300));
    }

    #[test]
    fn snapshot_reflects_every_symbol() {
        let store = PositionStore::new();
        store.apply_fill("AAPL", Side::Buy, dec!(1), dec!(1)).unwrap();
        store.apply_fill("TSLA", Side::Sell, dec!(1), dec!(1)).unwrap();
        let snap = store.snapshot();
        assert_eq!(snap.len(), 2);
        assert!(snap.contains_key("AAPL"));
        assert!(snap.contains_key("TSLA"));
    }

    #[test]
    fn n_successive_same_side_buys_average_to_the_common_price() {
        // N successive same-side buys at a common price settle at that price.
        let store = PositionStore::new();
        for _ in 0..7 {
            store.apply_fill("AAPL", Side::Buy, dec!(10), dec!(150)).unwrap();
        }
        let pos = store.position("AAPL").unwrap();
        assert_eq!(pos.quantity, dec!(70));
        assert_eq!(pos.average_price, dec!(150));
    }
}
