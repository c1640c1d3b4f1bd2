//! Postgres-backed ledger store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use super::{LedgerStore, LedgerUnit, holdings, transactions};
use crate::error::LedgerResult;
use crate::types::{Holding, HoldingKey, NewTransaction, TransactionRecord};

#[derive(Clone)]
pub struct PgLedgerStore {
    pool: PgPool,
}

impl PgLedgerStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl LedgerStore for PgLedgerStore {
    async fn begin(&self) -> LedgerResult<Box<dyn LedgerUnit>> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgLedgerUnit { tx }))
    }

    async fn get_holding(&self, key: &HoldingKey) -> LedgerResult<Option<Holding>> {
        holdings::get_holding(&self.pool, key).await
    }

    async fn list_holdings(&self, user_id: Uuid) -> LedgerResult<Vec<Holding>> {
        holdings::list_holdings_for_user(&self.pool, user_id).await
    }

    async fn list_transactions(&self, user_id: Uuid) -> LedgerResult<Vec<TransactionRecord>> {
        transactions::list_transactions_for_user(&self.pool, user_id).await
    }
}

/// A database transaction at the default (read committed) isolation level.
/// sqlx rolls it back when dropped uncommitted.
struct PgLedgerUnit {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl LedgerUnit for PgLedgerUnit {
    async fn lock_holding(&mut self, key: &HoldingKey) -> LedgerResult<Option<Holding>> {
        holdings::lock_holding(&mut *self.tx, key).await
    }

    async fn latest_transaction_date(&mut self, key: &HoldingKey) -> LedgerResult<Option<DateTime<Utc>>> {
        transactions::latest_transaction_date(&mut *self.tx, key).await
    }

    async fn insert_transaction(&mut self, tx: &NewTransaction) -> LedgerResult<TransactionRecord> {
        transactions::insert_transaction(&mut *self.tx, Uuid::new_v4(), tx).await
    }

    async fn upsert_holding(&mut self, holding: &Holding) -> LedgerResult<()> {
        holdings::upsert_holding(&mut *self.tx, holding).await
    }

    async fn delete_holding(&mut self, key: &HoldingKey) -> LedgerResult<()> {
        holdings::delete_holding(&mut *self.tx, key).await
    }

    async fn commit(self: Box<Self>) -> LedgerResult<()> {
        let PgLedgerUnit { tx } = *self;
        tx.commit().await?;
        Ok(())
    }
}
