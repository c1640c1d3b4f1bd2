//! Average-cost accounting: how one transaction moves a holding.
//! Pure functions, no I/O.

use std::collections::BTreeMap;

use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;

use crate::error::{FieldError, LedgerError, LedgerResult};
use crate::types::{Holding, HoldingKey, NewTransaction, TransactionKind, TransactionRecord};

/// Fractional digits kept for quantities, prices and amounts (matches `NUMERIC(28, 10)`).
pub const SCALE: u32 = 10;

/// Exclusive upper bound for any stored quantity, price or amount.
pub const MAX_AMOUNT: Decimal = dec!(1000000000000000000);

/// Result of applying one transaction to a holding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Applied {
    /// New holding state; `None` when the position is closed.
    pub holding: Option<Holding>,
    /// Signed quantity change: positive for buys, negative for sells.
    pub applied_quantity: Decimal,
}

/// Round to the stored scale, midpoint away from zero.
pub fn round_amount(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(SCALE, RoundingStrategy::MidpointAwayFromZero)
}

/// Apply one transaction to the current holding for its (user, symbol, type).
///
/// Buys blend into a volume-weighted average price. Sells reduce quantity and
/// leave the average untouched; selling the whole position removes it.
/// Selling without a holding, or more than is held, is rejected.
pub fn apply(existing: Option<&Holding>, tx: &NewTransaction) -> LedgerResult<Applied> {
    if tx.symbol.trim().is_empty() {
        return Err(LedgerError::validation(vec![FieldError::missing("symbol")]));
    }
    if tx.quantity <= Decimal::ZERO {
        return Err(LedgerError::InvalidQuantity(tx.quantity));
    }
    if tx.price_per_unit <= Decimal::ZERO {
        return Err(LedgerError::InvalidPrice(tx.price_per_unit));
    }
    if let Some(h) = existing {
        debug_assert_eq!(h.key(), tx.key());
    }

    match tx.kind {
        TransactionKind::Buy => {
            let holding = match existing {
                Some(h) => {
                    let new_qty = h.quantity + tx.quantity;
                    let new_avg = h
                        .quantity
                        .checked_mul(h.average_price)
                        .and_then(|cost| cost.checked_add(tx.total_amount))
                        .and_then(|cost| cost.checked_div(new_qty))
                        .filter(|_| new_qty < MAX_AMOUNT)
                        .map(round_amount)
                        .ok_or_else(|| {
                            LedgerError::validation(vec![FieldError::invalid(
                                "quantity",
                                "resulting position is out of range",
                            )])
                        })?;
                    Holding {
                        quantity: new_qty,
                        average_price: new_avg,
                        ..h.clone()
                    }
                }
                None => Holding {
                    user_id: tx.user_id,
                    symbol: tx.symbol.clone(),
                    asset_type: tx.asset_type,
                    quantity: tx.quantity,
                    average_price: tx.price_per_unit,
                },
            };
            Ok(Applied {
                holding: Some(holding),
                applied_quantity: tx.quantity,
            })
        }
        TransactionKind::Sell => {
            let held = existing.map(|h| h.quantity).unwrap_or(Decimal::ZERO);
            let h = match existing {
                Some(h) if tx.quantity <= h.quantity => h,
                _ => {
                    return Err(LedgerError::InsufficientHolding {
                        symbol: tx.symbol.clone(),
                        asset_type: tx.asset_type,
                        held,
                        requested: tx.quantity,
                    });
                }
            };
            let new_qty = h.quantity - tx.quantity;
            let holding = if new_qty > Decimal::ZERO {
                Some(Holding {
                    quantity: new_qty,
                    ..h.clone()
                })
            } else {
                None
            };
            Ok(Applied {
                holding,
                applied_quantity: -tx.quantity,
            })
        }
    }
}

impl From<&TransactionRecord> for NewTransaction {
    fn from(r: &TransactionRecord) -> Self {
        NewTransaction {
            user_id: r.user_id,
            symbol: r.symbol.clone(),
            asset_type: r.asset_type,
            kind: r.transaction_type,
            quantity: r.quantity,
            price_per_unit: r.price_per_unit,
            total_amount: r.total_amount,
            transaction_date: Some(r.transaction_date),
        }
    }
}

/// Rebuild one holding from its transactions, oldest first.
/// Records are expected to share a single key.
pub fn replay_key<'a>(
    records: impl IntoIterator<Item = &'a TransactionRecord>,
) -> LedgerResult<Option<Holding>> {
    let mut holding: Option<Holding> = None;
    for record in records {
        holding = apply(holding.as_ref(), &NewTransaction::from(record))?.holding;
    }
    Ok(holding)
}

/// Group transactions by key and order each group by date (stable for ties).
pub fn group_chronologically(
    records: &[TransactionRecord],
) -> BTreeMap<HoldingKey, Vec<&TransactionRecord>> {
    let mut groups: BTreeMap<HoldingKey, Vec<&TransactionRecord>> = BTreeMap::new();
    for record in records {
        groups.entry(record.key()).or_default().push(record);
    }
    for group in groups.values_mut() {
        group.sort_by_key(|r| r.transaction_date);
    }
    groups
}

/// Rebuild every holding from a transaction log. Input order is the
/// recording order; it breaks ties between equal timestamps.
pub fn replay(records: &[TransactionRecord]) -> LedgerResult<BTreeMap<HoldingKey, Holding>> {
    let mut holdings = BTreeMap::new();
    for (key, group) in group_chronologically(records) {
        if let Some(holding) = replay_key(group)? {
            holdings.insert(key, holding);
        }
    }
    Ok(holdings)
}
