//! Transaction processor over the in-memory store: validation, ledger/holding
//! consistency, rollback and concurrent writers.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use portfolio_ledger::{LedgerError, LedgerResult};
use portfolio_ledger::persistence::{LedgerStore, LedgerUnit, MemoryLedgerStore};
use portfolio_ledger::processor::TransactionProcessor;
use portfolio_ledger::query::PortfolioQueryService;
use portfolio_ledger::types::{
    AssetType, Holding, HoldingKey, NewTransaction, TransactionKind, TransactionRecord,
    TransactionRequest,
};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use uuid::Uuid;

fn fresh() -> (MemoryLedgerStore, TransactionProcessor, PortfolioQueryService) {
    let store = MemoryLedgerStore::new();
    let shared: Arc<dyn LedgerStore> = Arc::new(store.clone());
    (
        store,
        TransactionProcessor::new(Arc::clone(&shared)),
        PortfolioQueryService::new(shared),
    )
}

fn buy(symbol: &str, qty: Decimal, price: Decimal) -> TransactionRequest {
    TransactionRequest::new(symbol, AssetType::Stock, TransactionKind::Buy, qty, price)
}

fn sell(symbol: &str, qty: Decimal, price: Decimal) -> TransactionRequest {
    TransactionRequest::new(symbol, AssetType::Stock, TransactionKind::Sell, qty, price)
}

#[tokio::test]
async fn buy_buy_sell_scenario() {
    let (_, processor, queries) = fresh();
    let user = Uuid::new_v4();

    let first = processor.record_transaction(user, buy("aapl", dec!(2), dec!(150))).await.unwrap();
    assert_eq!(first.symbol, "AAPL");
    assert_eq!(first.total_amount, dec!(300));
    let h = queries.get_holding(user, "AAPL", AssetType::Stock).await.unwrap().unwrap();
    assert_eq!((h.quantity, h.average_price), (dec!(2), dec!(150)));
    assert_eq!(queries.list_transactions(user).await.unwrap().len(), 1);

    processor.record_transaction(user, buy("AAPL", dec!(3), dec!(180))).await.unwrap();
    let h = queries.get_holding(user, "AAPL", AssetType::Stock).await.unwrap().unwrap();
    assert_eq!((h.quantity, h.average_price), (dec!(5), dec!(168)));
    let summary = queries.get_summary(user, None).await.unwrap();
    assert_eq!(summary.total_invested, dec!(840));
    let logged: Decimal = queries
        .list_transactions(user)
        .await
        .unwrap()
        .iter()
        .map(|t| t.total_amount)
        .sum();
    assert_eq!(logged, dec!(840));

    processor.record_transaction(user, sell("AAPL", dec!(5), dec!(200))).await.unwrap();
    assert!(queries.get_holding(user, "AAPL", AssetType::Stock).await.unwrap().is_none());
    assert!(queries.list_holdings(user).await.unwrap().is_empty());
    assert_eq!(queries.list_transactions(user).await.unwrap().len(), 3);
    assert_eq!(queries.get_summary(user, None).await.unwrap().total_invested, Decimal::ZERO);
}

#[tokio::test]
async fn sell_without_holding_fails_and_writes_nothing() {
    let (store, processor, _) = fresh();
    let user = Uuid::new_v4();

    let err = processor
        .record_transaction(user, sell("MSFT", dec!(1), dec!(300)))
        .await
        .unwrap_err();

    assert!(matches!(err, LedgerError::InsufficientHolding { .. }));
    assert!(store.all_transactions().await.is_empty());
    assert!(store.list_holdings(user).await.unwrap().is_empty());
}

#[tokio::test]
async fn oversell_fails_and_keeps_holding() {
    let (store, processor, queries) = fresh();
    let user = Uuid::new_v4();
    processor.record_transaction(user, buy("TSLA", dec!(4), dec!(250))).await.unwrap();

    let err = processor
        .record_transaction(user, sell("TSLA", dec!(5), dec!(260)))
        .await
        .unwrap_err();

    assert!(matches!(err, LedgerError::InsufficientHolding { held, .. } if held == dec!(4)));
    let h = queries.get_holding(user, "TSLA", AssetType::Stock).await.unwrap().unwrap();
    assert_eq!(h.quantity, dec!(4));
    assert_eq!(store.all_transactions().await.len(), 1);
}

#[tokio::test]
async fn zero_quantity_or_price_fails_before_any_write() {
    let (store, processor, _) = fresh();
    let user = Uuid::new_v4();

    let err = processor
        .record_transaction(user, buy("AAPL", dec!(0), dec!(100)))
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::InvalidQuantity(q) if q.is_zero()));

    let err = processor
        .record_transaction(user, buy("AAPL", dec!(1), dec!(0)))
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::InvalidPrice(p) if p.is_zero()));

    assert!(store.all_transactions().await.is_empty());
}

#[tokio::test]
async fn missing_fields_are_listed_together() {
    let (store, processor, _) = fresh();
    let request = TransactionRequest {
        symbol: Some("   ".to_string()),
        asset_type: Some("bond".to_string()),
        ..Default::default()
    };

    let err = processor
        .record_transaction(Uuid::new_v4(), request)
        .await
        .unwrap_err();

    let fields = match err {
        LedgerError::Validation { fields } => fields,
        other => panic!("expected Validation, got {:?}", other),
    };
    let names: Vec<&str> = fields.iter().map(|f| f.field).collect();
    assert_eq!(
        names,
        vec!["symbol", "type", "transaction_type", "quantity", "price_per_unit"]
    );
    assert!(fields[1].reason.contains("bond"));
    assert!(store.all_transactions().await.is_empty());
}

#[tokio::test]
async fn too_many_decimal_places_rejected() {
    let (_, processor, _) = fresh();
    let err = processor
        .record_transaction(Uuid::new_v4(), buy("ETH", dec!(0.00000000001), dec!(3000)))
        .await
        .unwrap_err();

    let fields = match err {
        LedgerError::Validation { fields } => fields,
        other => panic!("expected Validation, got {:?}", other),
    };
    assert_eq!(fields.len(), 1);
    assert_eq!(fields[0].field, "quantity");
}

#[tokio::test]
async fn asset_types_are_separate_holdings() {
    let (_, processor, queries) = fresh();
    let user = Uuid::new_v4();
    processor.record_transaction(user, buy("COIN", dec!(1), dec!(200))).await.unwrap();
    processor
        .record_transaction(
            user,
            TransactionRequest::new("COIN", AssetType::Crypto, TransactionKind::Buy, dec!(50), dec!(0.5)),
        )
        .await
        .unwrap();

    let holdings = queries.list_holdings(user).await.unwrap();
    assert_eq!(holdings.len(), 2);
    assert_eq!(holdings[0].asset_type, AssetType::Stock);
    assert_eq!(holdings[1].asset_type, AssetType::Crypto);
}

#[tokio::test]
async fn users_do_not_share_holdings_or_history() {
    let (_, processor, queries) = fresh();
    let alice = Uuid::new_v4();
    let bob = Uuid::new_v4();
    processor.record_transaction(alice, buy("NVDA", dec!(1), dec!(900))).await.unwrap();

    let err = processor
        .record_transaction(bob, sell("NVDA", dec!(1), dec!(900)))
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::InsufficientHolding { .. }));
    assert!(queries.list_holdings(bob).await.unwrap().is_empty());
    assert!(queries.list_transactions(bob).await.unwrap().is_empty());
    assert_eq!(queries.list_transactions(alice).await.unwrap().len(), 1);
}

#[tokio::test]
async fn ledger_only_grows_and_records_never_change() {
    let (store, processor, _) = fresh();
    let user = Uuid::new_v4();
    let mut seen: Vec<TransactionRecord> = Vec::new();

    let steps = vec![
        buy("AMD", dec!(10), dec!(100)),
        sell("AMD", dec!(20), dec!(100)),
        buy("AMD", dec!(5), dec!(120)),
        sell("AMD", dec!(15), dec!(130)),
        sell("AMD", dec!(1), dec!(130)),
    ];
    for step in steps {
        let _ = processor.record_transaction(user, step).await;
        let now = store.all_transactions().await;
        assert!(now.len() >= seen.len());
        assert_eq!(&now[..seen.len()], &seen[..]);
        seen = now;
    }
    assert_eq!(seen.len(), 3);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_first_buys_do_not_lose_updates() {
    let (store, processor, queries) = fresh();
    let user = Uuid::new_v4();

    let a = tokio::spawn({
        let p = processor.clone();
        async move { p.record_transaction(user, buy("SPY", dec!(10), dec!(100))).await }
    });
    let b = tokio::spawn({
        let p = processor.clone();
        async move { p.record_transaction(user, buy("SPY", dec!(10), dec!(100))).await }
    });
    a.await.unwrap().unwrap();
    b.await.unwrap().unwrap();

    let holdings = queries.list_holdings(user).await.unwrap();
    assert_eq!(holdings.len(), 1);
    assert_eq!(holdings[0].quantity, dec!(20));
    assert_eq!(holdings[0].average_price, dec!(100));
    assert_eq!(store.all_transactions().await.len(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn many_concurrent_writers_converge() {
    let (_, processor, queries) = fresh();
    let user = Uuid::new_v4();
    processor.record_transaction(user, buy("QQQ", dec!(1000), dec!(50))).await.unwrap();

    let mut handles = Vec::new();
    for i in 0..40 {
        let p = processor.clone();
        let symbol = if i % 2 == 0 { "QQQ" } else { "IWM" };
        handles.push(tokio::spawn(async move {
            if i % 4 == 0 {
                p.record_transaction(user, sell(symbol, dec!(10), dec!(55))).await
            } else {
                p.record_transaction(user, buy(symbol, dec!(10), dec!(50))).await
            }
        }));
    }
    for h in handles {
        h.await.unwrap().unwrap();
    }

    // QQQ: 10 sells, 10 buys. IWM: 20 buys.
    let qqq = queries.get_holding(user, "QQQ", AssetType::Stock).await.unwrap().unwrap();
    assert_eq!(qqq.quantity, dec!(1000));
    assert_eq!(qqq.average_price, dec!(50));
    let iwm = queries.get_holding(user, "IWM", AssetType::Stock).await.unwrap().unwrap();
    assert_eq!(iwm.quantity, dec!(200));
    assert_eq!(queries.list_transactions(user).await.unwrap().len(), 41);
    assert!(queries.audit(user).await.unwrap().is_empty());
}

#[tokio::test]
async fn backdated_sell_is_rejected_and_audit_stays_clean() {
    let (store, processor, queries) = fresh();
    let user = Uuid::new_v4();
    processor.record_transaction(user, buy("AAPL", dec!(10), dec!(100))).await.unwrap();

    let err = processor
        .record_transaction(user, sell("AAPL", dec!(10), dec!(110)).at(Utc::now() - Duration::days(1)))
        .await
        .unwrap_err();

    match err {
        LedgerError::Validation { fields } => {
            assert_eq!(fields.len(), 1);
            assert_eq!(fields[0].field, "transaction_date");
        }
        other => panic!("expected validation error, got {:?}", other),
    }
    assert_eq!(store.all_transactions().await.len(), 1);
    let h = queries.get_holding(user, "AAPL", AssetType::Stock).await.unwrap().unwrap();
    assert_eq!(h.quantity, dec!(10));
    assert!(queries.audit(user).await.unwrap().is_empty());
}

#[tokio::test]
async fn future_dated_transaction_is_rejected() {
    let (store, processor, _) = fresh();
    let err = processor
        .record_transaction(Uuid::new_v4(), buy("AAPL", dec!(1), dec!(100)).at(Utc::now() + Duration::days(1)))
        .await
        .unwrap_err();

    assert!(matches!(err, LedgerError::Validation { ref fields } if fields[0].field == "transaction_date"));
    assert!(store.all_transactions().await.is_empty());
}

#[tokio::test]
async fn dated_history_in_order_replays_to_the_same_holdings() {
    let (_, processor, queries) = fresh();
    let user = Uuid::new_v4();
    let day = |d| Utc.with_ymd_and_hms(2024, 6, d, 9, 30, 0).unwrap();

    processor.record_transaction(user, buy("NVDA", dec!(4), dec!(100)).at(day(3))).await.unwrap();
    processor.record_transaction(user, buy("NVDA", dec!(4), dec!(120)).at(day(3))).await.unwrap();
    // Other keys do not constrain this one.
    processor.record_transaction(user, buy("AMD", dec!(1), dec!(90)).at(day(20))).await.unwrap();
    processor.record_transaction(user, sell("NVDA", dec!(6), dec!(130)).at(day(5))).await.unwrap();
    // Undated: stamped now, after everything above.
    processor.record_transaction(user, sell("NVDA", dec!(1), dec!(140))).await.unwrap();

    let err = processor
        .record_transaction(user, buy("NVDA", dec!(1), dec!(90)).at(day(4)))
        .await
        .unwrap_err();
    assert!(err.is_rejection());

    let h = queries.get_holding(user, "NVDA", AssetType::Stock).await.unwrap().unwrap();
    assert_eq!((h.quantity, h.average_price), (dec!(1), dec!(110)));
    assert!(queries.audit(user).await.unwrap().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn key_locks_are_released_and_forgotten() {
    let (store, processor, _) = fresh();
    let user = Uuid::new_v4();

    let mut handles = Vec::new();
    for i in 0..20 {
        let p = processor.clone();
        let symbol = format!("S{}", i % 5);
        handles.push(tokio::spawn(async move {
            p.record_transaction(user, buy(&symbol, dec!(1), dec!(10))).await
        }));
    }
    for h in handles {
        h.await.unwrap().unwrap();
    }
    processor
        .record_transaction(user, sell("NONE", dec!(1), dec!(10)))
        .await
        .unwrap_err();
    assert_eq!(store.locked_key_count(), 0);

    // An open unit pins its key until it is dropped.
    let key = HoldingKey::new(user, "S0", AssetType::Stock);
    let mut unit = store.begin().await.unwrap();
    unit.lock_holding(&key).await.unwrap();
    assert_eq!(store.locked_key_count(), 1);
    drop(unit);
    assert_eq!(store.locked_key_count(), 0);
}

/// Store whose holding writes always fail, to observe rollback.
struct FailingHoldingWrites {
    inner: MemoryLedgerStore,
}

struct FailingUnit {
    inner: Box<dyn LedgerUnit>,
}

#[async_trait]
impl LedgerStore for FailingHoldingWrites {
    async fn begin(&self) -> LedgerResult<Box<dyn LedgerUnit>> {
        Ok(Box::new(FailingUnit {
            inner: self.inner.begin().await?,
        }))
    }

    async fn get_holding(&self, key: &HoldingKey) -> LedgerResult<Option<Holding>> {
        self.inner.get_holding(key).await
    }

    async fn list_holdings(&self, user_id: Uuid) -> LedgerResult<Vec<Holding>> {
        self.inner.list_holdings(user_id).await
    }

    async fn list_transactions(&self, user_id: Uuid) -> LedgerResult<Vec<TransactionRecord>> {
        self.inner.list_transactions(user_id).await
    }
}

#[async_trait]
impl LedgerUnit for FailingUnit {
    async fn lock_holding(&mut self, key: &HoldingKey) -> LedgerResult<Option<Holding>> {
        self.inner.lock_holding(key).await
    }

    async fn latest_transaction_date(&mut self, key: &HoldingKey) -> LedgerResult<Option<DateTime<Utc>>> {
        self.inner.latest_transaction_date(key).await
    }

    async fn insert_transaction(&mut self, tx: &NewTransaction) -> LedgerResult<TransactionRecord> {
        self.inner.insert_transaction(tx).await
    }

    async fn upsert_holding(&mut self, _holding: &Holding) -> LedgerResult<()> {
        Err(LedgerError::Persistence("disk full".to_string()))
    }

    async fn delete_holding(&mut self, key: &HoldingKey) -> LedgerResult<()> {
        self.inner.delete_holding(key).await
    }

    async fn commit(self: Box<Self>) -> LedgerResult<()> {
        let FailingUnit { inner } = *self;
        inner.commit().await
    }
}

#[tokio::test]
async fn failed_holding_write_rolls_back_transaction_insert() {
    let inner = MemoryLedgerStore::new();
    let processor = TransactionProcessor::new(Arc::new(FailingHoldingWrites {
        inner: inner.clone(),
    }));
    let user = Uuid::new_v4();

    let err = processor
        .record_transaction(user, buy("AAPL", dec!(1), dec!(100)))
        .await
        .unwrap_err();

    assert!(matches!(err, LedgerError::Persistence(_)));
    assert!(!err.is_rejection());
    assert!(inner.all_transactions().await.is_empty());
    assert!(inner.list_holdings(user).await.unwrap().is_empty());

    // The key lock was released with the aborted unit.
    assert_eq!(inner.locked_key_count(), 0);
    let ok = TransactionProcessor::new(Arc::new(inner.clone()));
    ok.record_transaction(user, buy("AAPL", dec!(1), dec!(100))).await.unwrap();
    assert_eq!(inner.all_transactions().await.len(), 1);
}
