//! In-process ledger store. Same guarantees as the Postgres store for a single
//! process: per-key write serialization, all-or-nothing commit.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{Mutex as KeyMutex, OwnedMutexGuard, RwLock};
use uuid::Uuid;

use super::{LedgerStore, LedgerUnit};
use crate::error::LedgerResult;
use crate::types::{Holding, HoldingKey, NewTransaction, TransactionRecord};

#[derive(Debug, Default)]
struct MemoryState {
    holdings: HashMap<HoldingKey, Holding>,
    /// Recording order.
    transactions: Vec<TransactionRecord>,
}

/// One entry per key that some unit holds or waits on. The map mutex is
/// never held across an await.
type KeyLocks = Arc<Mutex<HashMap<HoldingKey, Arc<KeyMutex<()>>>>>;

#[derive(Clone, Default)]
pub struct MemoryLedgerStore {
    state: Arc<RwLock<MemoryState>>,
    locks: KeyLocks,
}

impl MemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every transaction ever committed, in recording order.
    pub async fn all_transactions(&self) -> Vec<TransactionRecord> {
        self.state.read().await.transactions.clone()
    }

    /// Keys currently locked or awaited by an open unit.
    pub fn locked_key_count(&self) -> usize {
        self.locks.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

#[async_trait]
impl LedgerStore for MemoryLedgerStore {
    async fn begin(&self) -> LedgerResult<Box<dyn LedgerUnit>> {
        Ok(Box::new(MemoryUnit {
            state: Arc::clone(&self.state),
            locks: Arc::clone(&self.locks),
            guards: HashMap::new(),
            transactions: Vec::new(),
            writes: Vec::new(),
        }))
    }

    async fn get_holding(&self, key: &HoldingKey) -> LedgerResult<Option<Holding>> {
        Ok(self.state.read().await.holdings.get(key).cloned())
    }

    async fn list_holdings(&self, user_id: Uuid) -> LedgerResult<Vec<Holding>> {
        let guard = self.state.read().await;
        let mut holdings: Vec<Holding> = guard
            .holdings
            .values()
            .filter(|h| h.user_id == user_id)
            .cloned()
            .collect();
        holdings.sort_by(|a, b| (&a.symbol, a.asset_type).cmp(&(&b.symbol, b.asset_type)));
        Ok(holdings)
    }

    async fn list_transactions(&self, user_id: Uuid) -> LedgerResult<Vec<TransactionRecord>> {
        let guard = self.state.read().await;
        let mut records: Vec<TransactionRecord> = guard
            .transactions
            .iter()
            .rev()
            .filter(|t| t.user_id == user_id)
            .cloned()
            .collect();
        // Stable: equal dates stay newest-recorded first.
        records.sort_by(|a, b| b.transaction_date.cmp(&a.transaction_date));
        Ok(records)
    }
}

enum HoldingWrite {
    Upsert(Holding),
    Delete(HoldingKey),
}

struct MemoryUnit {
    state: Arc<RwLock<MemoryState>>,
    locks: KeyLocks,
    guards: HashMap<HoldingKey, OwnedMutexGuard<()>>,
    transactions: Vec<TransactionRecord>,
    writes: Vec<HoldingWrite>,
}

impl MemoryUnit {
    fn pending(&self, key: &HoldingKey) -> Option<Option<Holding>> {
        self.writes.iter().rev().find_map(|w| match w {
            HoldingWrite::Upsert(h) if &h.key() == key => Some(Some(h.clone())),
            HoldingWrite::Delete(k) if k == key => Some(None),
            _ => None,
        })
    }

    async fn latest_date(&self, key: &HoldingKey) -> Option<DateTime<Utc>> {
        let state = self.state.read().await;
        state
            .transactions
            .iter()
            .chain(self.transactions.iter())
            .filter(|t| &t.key() == key)
            .map(|t| t.transaction_date)
            .max()
    }
}

impl Drop for MemoryUnit {
    /// Release key locks and forget keys nobody else holds or awaits.
    fn drop(&mut self) {
        if self.guards.is_empty() {
            return;
        }
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        for (key, guard) in self.guards.drain() {
            drop(guard);
            // Waiters clone the Arc under the map lock, so a count of one is final.
            if locks.get(&key).is_some_and(|l| Arc::strong_count(l) == 1) {
                locks.remove(&key);
            }
        }
    }
}

#[async_trait]
impl LedgerUnit for MemoryUnit {
    async fn lock_holding(&mut self, key: &HoldingKey) -> LedgerResult<Option<Holding>> {
        if !self.guards.contains_key(key) {
            let key_lock = {
                let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
                Arc::clone(locks.entry(key.clone()).or_default())
            };
            let guard = key_lock.lock_owned().await;
            self.guards.insert(key.clone(), guard);
        }
        if let Some(pending) = self.pending(key) {
            return Ok(pending);
        }
        Ok(self.state.read().await.holdings.get(key).cloned())
    }

    async fn latest_transaction_date(&mut self, key: &HoldingKey) -> LedgerResult<Option<DateTime<Utc>>> {
        Ok(self.latest_date(key).await)
    }

    async fn insert_transaction(&mut self, tx: &NewTransaction) -> LedgerResult<TransactionRecord> {
        let transaction_date = match tx.transaction_date {
            Some(date) => date,
            None => {
                let now = Utc::now();
                self.latest_date(&tx.key()).await.map_or(now, |latest| latest.max(now))
            }
        };
        let record = TransactionRecord {
            id: Uuid::new_v4(),
            user_id: tx.user_id,
            symbol: tx.symbol.clone(),
            asset_type: tx.asset_type,
            transaction_type: tx.kind,
            quantity: tx.quantity,
            price_per_unit: tx.price_per_unit,
            total_amount: tx.total_amount,
            transaction_date,
        };
        self.transactions.push(record.clone());
        Ok(record)
    }

    async fn upsert_holding(&mut self, holding: &Holding) -> LedgerResult<()> {
        self.writes.push(HoldingWrite::Upsert(holding.clone()));
        Ok(())
    }

    async fn delete_holding(&mut self, key: &HoldingKey) -> LedgerResult<()> {
        self.writes.push(HoldingWrite::Delete(key.clone()));
        Ok(())
    }

    async fn commit(self: Box<Self>) -> LedgerResult<()> {
        let mut unit = self;
        let transactions = std::mem::take(&mut unit.transactions);
        let writes = std::mem::take(&mut unit.writes);
        let mut state = unit.state.write().await;
        state.transactions.extend(transactions);
        for write in writes {
            match write {
                HoldingWrite::Upsert(h) => {
                    state.holdings.insert(h.key(), h);
                }
                HoldingWrite::Delete(key) => {
                    state.holdings.remove(&key);
                }
            }
        }
        drop(state);
        // Dropping the unit releases its key locks.
        Ok(())
    }
}
