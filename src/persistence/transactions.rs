//! Transaction persistence: append and list. Rows are never updated or deleted.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{FromRow, PgExecutor};
use uuid::Uuid;

use crate::error::{LedgerError, LedgerResult};
use crate::types::{HoldingKey, NewTransaction, TransactionRecord};

#[derive(Debug, FromRow)]
pub struct TransactionRow {
    pub id: Uuid,
    pub user_id: Uuid,
    pub symbol: String,
    pub asset_type: String,
    pub transaction_type: String,
    pub quantity: Decimal,
    pub price_per_unit: Decimal,
    pub total_amount: Decimal,
    pub transaction_date: DateTime<Utc>,
}

const COLUMNS: &str = "id, user_id, symbol, asset_type, transaction_type, quantity, \
                       price_per_unit, total_amount, transaction_date";

pub fn transaction_row_to_record(row: TransactionRow) -> LedgerResult<TransactionRecord> {
    let id = row.id;
    let corrupt = move |e: String| LedgerError::Persistence(format!("corrupt transaction row {}: {}", id, e));
    let asset_type = row.asset_type.parse().map_err(corrupt)?;
    let transaction_type = row.transaction_type.parse().map_err(corrupt)?;
    Ok(TransactionRecord {
        id: row.id,
        user_id: row.user_id,
        symbol: row.symbol,
        asset_type,
        transaction_type,
        quantity: row.quantity,
        price_per_unit: row.price_per_unit,
        total_amount: row.total_amount,
        transaction_date: row.transaction_date,
    })
}

/// Append one transaction. When no date is given the database assigns the
/// later of its clock and the key's newest date, so each key's log stays
/// in date order even under clock skew.
pub async fn insert_transaction<'e>(
    executor: impl PgExecutor<'e>,
    id: Uuid,
    tx: &NewTransaction,
) -> LedgerResult<TransactionRecord> {
    let sql = format!(
        "INSERT INTO transactions \
         (id, user_id, symbol, asset_type, transaction_type, quantity, price_per_unit, total_amount, transaction_date) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, COALESCE($9, GREATEST(clock_timestamp(), \
         (SELECT max(transaction_date) FROM transactions \
          WHERE user_id = $2 AND symbol = $3 AND asset_type = $4)))) \
         RETURNING {}",
        COLUMNS
    );
    let row = sqlx::query_as::<_, TransactionRow>(&sql)
        .bind(id)
        .bind(tx.user_id)
        .bind(tx.symbol.as_str())
        .bind(tx.asset_type.as_str())
        .bind(tx.kind.as_str())
        .bind(tx.quantity)
        .bind(tx.price_per_unit)
        .bind(tx.total_amount)
        .bind(tx.transaction_date)
        .fetch_one(executor)
        .await?;
    transaction_row_to_record(row)
}

pub async fn latest_transaction_date<'e>(
    executor: impl PgExecutor<'e>,
    key: &HoldingKey,
) -> LedgerResult<Option<DateTime<Utc>>> {
    let latest = sqlx::query_scalar::<_, Option<DateTime<Utc>>>(
        "SELECT max(transaction_date) FROM transactions \
         WHERE user_id = $1 AND symbol = $2 AND asset_type = $3",
    )
    .bind(key.user_id)
    .bind(key.symbol.as_str())
    .bind(key.asset_type.as_str())
    .fetch_one(executor)
    .await?;
    Ok(latest)
}

/// List a user's transactions, newest first.
pub async fn list_transactions_for_user<'e>(
    executor: impl PgExecutor<'e>,
    user_id: Uuid,
) -> LedgerResult<Vec<TransactionRecord>> {
    let sql = format!(
        "SELECT {} FROM transactions WHERE user_id = $1 ORDER BY transaction_date DESC, seq DESC",
        COLUMNS
    );
    let rows = sqlx::query_as::<_, TransactionRow>(&sql)
        .bind(user_id)
        .fetch_all(executor)
        .await?;
    rows.into_iter().map(transaction_row_to_record).collect()
}
