//! Holding persistence: lock, fetch, upsert, delete, list.

use rust_decimal::Decimal;
use sqlx::{FromRow, PgConnection, PgExecutor};
use uuid::Uuid;

use crate::error::{LedgerError, LedgerResult};
use crate::types::{Holding, HoldingKey};

#[derive(Debug, FromRow)]
pub struct HoldingRow {
    pub user_id: Uuid,
    pub symbol: String,
    pub asset_type: String,
    pub quantity: Decimal,
    pub average_price: Decimal,
}

pub fn holding_row_to_holding(row: HoldingRow) -> LedgerResult<Holding> {
    let asset_type = row
        .asset_type
        .parse()
        .map_err(|e| LedgerError::Persistence(format!("corrupt holding row: {}", e)))?;
    Ok(Holding {
        user_id: row.user_id,
        symbol: row.symbol,
        asset_type,
        quantity: row.quantity,
        average_price: row.average_price,
    })
}

/// Serialize writers on `key` until the surrounding transaction ends, then
/// read the row under `FOR UPDATE`. The advisory lock also covers a key with
/// no row yet, which `FOR UPDATE` alone cannot.
pub async fn lock_holding(conn: &mut PgConnection, key: &HoldingKey) -> LedgerResult<Option<Holding>> {
    sqlx::query("SELECT pg_advisory_xact_lock(hashtextextended($1, 0))")
        .bind(key.lock_key())
        .execute(&mut *conn)
        .await?;

    let row = sqlx::query_as::<_, HoldingRow>(
        "SELECT user_id, symbol, asset_type, quantity, average_price FROM holdings \
         WHERE user_id = $1 AND symbol = $2 AND asset_type = $3 FOR UPDATE",
    )
    .bind(key.user_id)
    .bind(key.symbol.as_str())
    .bind(key.asset_type.as_str())
    .fetch_optional(&mut *conn)
    .await?;
    row.map(holding_row_to_holding).transpose()
}

pub async fn get_holding<'e>(
    executor: impl PgExecutor<'e>,
    key: &HoldingKey,
) -> LedgerResult<Option<Holding>> {
    let row = sqlx::query_as::<_, HoldingRow>(
        "SELECT user_id, symbol, asset_type, quantity, average_price FROM holdings \
         WHERE user_id = $1 AND symbol = $2 AND asset_type = $3",
    )
    .bind(key.user_id)
    .bind(key.symbol.as_str())
    .bind(key.asset_type.as_str())
    .fetch_optional(executor)
    .await?;
    row.map(holding_row_to_holding).transpose()
}

/// Insert or overwrite a holding (insert on first buy, update afterwards).
pub async fn upsert_holding<'e>(executor: impl PgExecutor<'e>, holding: &Holding) -> LedgerResult<()> {
    sqlx::query(
        "INSERT INTO holdings (user_id, symbol, asset_type, quantity, average_price) \
         VALUES ($1, $2, $3, $4, $5) \
         ON CONFLICT (user_id, symbol, asset_type) \
         DO UPDATE SET quantity = $4, average_price = $5, updated_at = now()",
    )
    .bind(holding.user_id)
    .bind(holding.symbol.as_str())
    .bind(holding.asset_type.as_str())
    .bind(holding.quantity)
    .bind(holding.average_price)
    .execute(executor)
    .await?;
    Ok(())
}

pub async fn delete_holding<'e>(executor: impl PgExecutor<'e>, key: &HoldingKey) -> LedgerResult<()> {
    sqlx::query("DELETE FROM holdings WHERE user_id = $1 AND symbol = $2 AND asset_type = $3")
        .bind(key.user_id)
        .bind(key.symbol.as_str())
        .bind(key.asset_type.as_str())
        .execute(executor)
        .await?;
    Ok(())
}

/// List a user's holdings ordered by symbol.
pub async fn list_holdings_for_user<'e>(
    executor: impl PgExecutor<'e>,
    user_id: Uuid,
) -> LedgerResult<Vec<Holding>> {
    let rows = sqlx::query_as::<_, HoldingRow>(
        "SELECT user_id, symbol, asset_type, quantity, average_price FROM holdings \
         WHERE user_id = $1 ORDER BY symbol, asset_type",
    )
    .bind(user_id)
    .fetch_all(executor)
    .await?;
    rows.into_iter().map(holding_row_to_holding).collect()
}
