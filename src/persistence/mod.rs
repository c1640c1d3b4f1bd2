//! Ledger store: the persistence boundary for holdings and transactions.
//!
//! Writes go through a [`LedgerUnit`], an all-or-nothing unit of work. Reads go
//! straight to the store and see committed state only.

mod holdings;
mod memory;
mod pool;
mod postgres;
mod transactions;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::LedgerResult;
use crate::types::{Holding, HoldingKey, NewTransaction, TransactionRecord};

pub use memory::MemoryLedgerStore;
pub use pool::{create_pool_and_migrate, run_migrations};
pub use postgres::PgLedgerStore;
pub use sqlx::PgPool;

/// Shared, injected handle to the ledger.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Open a unit of work. Nothing it writes is visible until `commit`.
    async fn begin(&self) -> LedgerResult<Box<dyn LedgerUnit>>;

    async fn get_holding(&self, key: &HoldingKey) -> LedgerResult<Option<Holding>>;

    /// Holdings for a user, ordered by symbol then asset type.
    async fn list_holdings(&self, user_id: Uuid) -> LedgerResult<Vec<Holding>>;

    /// Transactions for a user, newest first; equal dates newest-recorded first.
    async fn list_transactions(&self, user_id: Uuid) -> LedgerResult<Vec<TransactionRecord>>;
}

/// One open unit of work. Dropping it without `commit` discards every write.
#[async_trait]
pub trait LedgerUnit: Send {
    /// Take the exclusive lock on `key` for the rest of this unit and return
    /// the holding as of that moment. The lock also covers keys with no row.
    async fn lock_holding(&mut self, key: &HoldingKey) -> LedgerResult<Option<Holding>>;

    /// Date of the newest transaction recorded for `key`, including ones
    /// appended earlier in this unit. Call after `lock_holding`.
    async fn latest_transaction_date(&mut self, key: &HoldingKey) -> LedgerResult<Option<DateTime<Utc>>>;

    /// Append a transaction; assigns its id and, if unset, its date. An
    /// assigned date is never earlier than the latest one for the same key.
    async fn insert_transaction(&mut self, tx: &NewTransaction) -> LedgerResult<TransactionRecord>;

    async fn upsert_holding(&mut self, holding: &Holding) -> LedgerResult<()>;

    async fn delete_holding(&mut self, key: &HoldingKey) -> LedgerResult<()>;

    async fn commit(self: Box<Self>) -> LedgerResult<()>;
}
