//! Transaction processing: validate an order, then append it to the ledger and
//! move the holding in one unit of work.

use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::cost_basis::{self, MAX_AMOUNT, SCALE};
use crate::error::{FieldError, LedgerError, LedgerResult};
use crate::persistence::LedgerStore;
use crate::types::{
    AssetType, NewTransaction, TransactionKind, TransactionRecord, TransactionRequest, normalize_symbol,
};

#[derive(Clone)]
pub struct TransactionProcessor {
    store: Arc<dyn LedgerStore>,
}

impl TransactionProcessor {
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self { store }
    }

    /// Record a buy or sell for `user_id`.
    ///
    /// Either the transaction row and the holding change are both committed,
    /// or neither is. Not idempotent: resubmitting records a second transaction.
    pub async fn record_transaction(
        &self,
        user_id: Uuid,
        request: TransactionRequest,
    ) -> LedgerResult<TransactionRecord> {
        let tx = match validate_request(user_id, &request) {
            Ok(tx) => tx,
            Err(e) => {
                warn!(%user_id, error = %e, "transaction rejected");
                return Err(e);
            }
        };

        match self.apply(&tx).await {
            Ok(record) => {
                info!(
                    %user_id,
                    transaction_id = %record.id,
                    symbol = %record.symbol,
                    asset_type = %record.asset_type,
                    kind = %record.transaction_type,
                    quantity = %record.quantity,
                    price = %record.price_per_unit,
                    "transaction recorded"
                );
                Ok(record)
            }
            Err(e) if e.is_rejection() => {
                warn!(%user_id, symbol = %tx.symbol, error = %e, "transaction rejected");
                Err(e)
            }
            Err(e) => {
                error!(%user_id, symbol = %tx.symbol, error = %e, "transaction failed, rolled back");
                Err(e)
            }
        }
    }

    async fn apply(&self, tx: &NewTransaction) -> LedgerResult<TransactionRecord> {
        let key = tx.key();
        let mut unit = self.store.begin().await?;

        // Held until commit or drop; serializes writers on the same key.
        let existing = unit.lock_holding(&key).await?;

        // Holdings move in recording order and replay runs in date order;
        // the two agree only if each key's dates never go backwards.
        if let Some(date) = tx.transaction_date {
            if let Some(latest) = unit.latest_transaction_date(&key).await? {
                if date < latest {
                    return Err(LedgerError::validation(vec![FieldError::invalid(
                        "transaction_date",
                        format!("is earlier than the latest {} transaction ({})", tx.symbol, latest),
                    )]));
                }
            }
        }
        let applied = cost_basis::apply(existing.as_ref(), tx)?;

        let record = unit.insert_transaction(tx).await?;
        match &applied.holding {
            Some(holding) => unit.upsert_holding(holding).await?,
            None => unit.delete_holding(&key).await?,
        }
        unit.commit().await?;
        Ok(record)
    }
}

/// Check a raw request and turn it into a [`NewTransaction`].
///
/// Missing or malformed fields are all reported together. Sign checks on
/// quantity and price run only once every field is well-formed.
pub fn validate_request(user_id: Uuid, request: &TransactionRequest) -> LedgerResult<NewTransaction> {
    let mut fields = Vec::new();

    let symbol = match request.symbol.as_deref().map(normalize_symbol) {
        Some(s) if !s.is_empty() => Some(s),
        _ => {
            fields.push(FieldError::missing("symbol"));
            None
        }
    };

    let asset_type = match request.asset_type.as_deref() {
        None => {
            fields.push(FieldError::missing("type"));
            None
        }
        Some(raw) => match raw.parse::<AssetType>() {
            Ok(t) => Some(t),
            Err(reason) => {
                fields.push(FieldError::invalid("type", reason));
                None
            }
        },
    };

    let kind = match request.transaction_type.as_deref() {
        None => {
            fields.push(FieldError::missing("transaction_type"));
            None
        }
        Some(raw) => match raw.parse::<TransactionKind>() {
            Ok(k) => Some(k),
            Err(reason) => {
                fields.push(FieldError::invalid("transaction_type", reason));
                None
            }
        },
    };

    let quantity = check_decimal("quantity", request.quantity, &mut fields);
    let price_per_unit = check_decimal("price_per_unit", request.price_per_unit, &mut fields);

    if request.transaction_date.is_some_and(|date| date > Utc::now()) {
        fields.push(FieldError::invalid("transaction_date", "is in the future"));
    }

    let (Some(symbol), Some(asset_type), Some(kind), Some(quantity), Some(price_per_unit)) =
        (symbol, asset_type, kind, quantity, price_per_unit)
    else {
        return Err(LedgerError::validation(fields));
    };
    if !fields.is_empty() {
        return Err(LedgerError::validation(fields));
    }

    if quantity <= Decimal::ZERO {
        return Err(LedgerError::InvalidQuantity(quantity));
    }
    if price_per_unit <= Decimal::ZERO {
        return Err(LedgerError::InvalidPrice(price_per_unit));
    }

    let total_amount = match quantity.checked_mul(price_per_unit) {
        Some(total) if total < MAX_AMOUNT => cost_basis::round_amount(total),
        _ => {
            return Err(LedgerError::validation(vec![FieldError::invalid(
                "quantity",
                "total amount is out of range",
            )]));
        }
    };

    Ok(NewTransaction {
        user_id,
        symbol,
        asset_type,
        kind,
        quantity,
        price_per_unit,
        total_amount,
        transaction_date: request.transaction_date,
    })
}

fn check_decimal(field: &'static str, value: Option<Decimal>, fields: &mut Vec<FieldError>) -> Option<Decimal> {
    let Some(value) = value else {
        fields.push(FieldError::missing(field));
        return None;
    };
    if value.normalize().scale() > SCALE {
        fields.push(FieldError::invalid(
            field,
            format!("has more than {} decimal places", SCALE),
        ));
        return None;
    }
    if value.abs() >= MAX_AMOUNT {
        fields.push(FieldError::invalid(field, "is out of range"));
        return None;
    }
    Some(value)
}
