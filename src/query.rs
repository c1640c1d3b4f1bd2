//! Read side: holdings, history, valuation summary and ledger audit.
//! Pure projections over committed ledger state.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use rust_decimal::{Decimal, RoundingStrategy};
use uuid::Uuid;

use crate::cost_basis;
use crate::error::{LedgerError, LedgerResult};
use crate::persistence::LedgerStore;
use crate::pricing::PriceSource;
use crate::types::{
    AssetType, Holding, HoldingDrift, HoldingKey, HoldingValuation, PortfolioSummary, TransactionRecord,
};

#[derive(Clone)]
pub struct PortfolioQueryService {
    store: Arc<dyn LedgerStore>,
}

impl PortfolioQueryService {
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self { store }
    }

    /// Holdings ordered by symbol.
    pub async fn list_holdings(&self, user_id: Uuid) -> LedgerResult<Vec<Holding>> {
        self.store.list_holdings(user_id).await
    }

    pub async fn get_holding(
        &self,
        user_id: Uuid,
        symbol: &str,
        asset_type: AssetType,
    ) -> LedgerResult<Option<Holding>> {
        self.store.get_holding(&HoldingKey::new(user_id, symbol, asset_type)).await
    }

    /// Transaction history, newest first.
    pub async fn list_transactions(&self, user_id: Uuid) -> LedgerResult<Vec<TransactionRecord>> {
        self.store.list_transactions(user_id).await
    }

    /// Totals over all holdings. Without `prices`, or when any holding has no
    /// quote, current value and gain/loss are reported as unknown.
    pub async fn get_summary(
        &self,
        user_id: Uuid,
        prices: Option<&dyn PriceSource>,
    ) -> LedgerResult<PortfolioSummary> {
        let holdings = self.store.list_holdings(user_id).await?;
        let mut quotes = Vec::with_capacity(holdings.len());
        for holding in &holdings {
            let quote = match prices {
                Some(source) => source.current_price(&holding.symbol, holding.asset_type).await?,
                None => None,
            };
            quotes.push(quote);
        }
        build_summary(&holdings, &quotes)
    }

    /// Replay the user's log and report every key whose stored holding
    /// differs from the replayed one. Empty when the ledger is consistent.
    pub async fn audit(&self, user_id: Uuid) -> LedgerResult<Vec<HoldingDrift>> {
        let mut records = self.store.list_transactions(user_id).await?;
        records.reverse();
        let stored: BTreeMap<HoldingKey, Holding> = self
            .store
            .list_holdings(user_id)
            .await?
            .into_iter()
            .map(|h| (h.key(), h))
            .collect();
        let groups = cost_basis::group_chronologically(&records);

        let keys: BTreeSet<&HoldingKey> = stored.keys().chain(groups.keys()).collect();
        let mut drifts = Vec::new();
        for key in keys {
            let (replayed, replay_error) = match groups.get(key) {
                Some(group) => match cost_basis::replay_key(group.iter().copied()) {
                    Ok(h) => (h, None),
                    Err(e) => (None, Some(e.to_string())),
                },
                None => (None, None),
            };
            let stored_holding = stored.get(key).cloned();
            if stored_holding != replayed || replay_error.is_some() {
                drifts.push(HoldingDrift {
                    symbol: key.symbol.clone(),
                    asset_type: key.asset_type,
                    stored: stored_holding,
                    replayed,
                    replay_error,
                });
            }
        }
        Ok(drifts)
    }
}

fn overflow(what: impl Into<String>) -> LedgerError {
    LedgerError::Overflow(what.into())
}

fn checked_sum(values: impl IntoIterator<Item = Decimal>) -> Option<Decimal> {
    values
        .into_iter()
        .try_fold(Decimal::ZERO, |acc, v| acc.checked_add(v))
}

/// `part` as a percentage of `whole`, 2 dp; zero when `whole` is zero.
fn percent(part: Decimal, whole: Decimal, what: &str) -> LedgerResult<Decimal> {
    if whole.is_zero() {
        return Ok(Decimal::ZERO);
    }
    part.checked_div(whole)
        .and_then(|ratio| ratio.checked_mul(Decimal::ONE_HUNDRED))
        .map(|p| p.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero))
        .ok_or_else(|| overflow(what))
}

/// `quotes[i]` is the current price of `holdings[i]`, if known.
///
/// Fails with [`LedgerError::Overflow`] when a value does not fit a `Decimal`.
pub fn build_summary(holdings: &[Holding], quotes: &[Option<Decimal>]) -> LedgerResult<PortfolioSummary> {
    let costs: Vec<Decimal> = holdings
        .iter()
        .map(|h| {
            h.invested()
                .ok_or_else(|| overflow(format!("invested amount of {}", h.symbol)))
        })
        .collect::<LedgerResult<_>>()?;
    let total_invested =
        checked_sum(costs.iter().copied()).ok_or_else(|| overflow("total invested"))?;

    let mut valuations = Vec::with_capacity(holdings.len());
    let priced = quotes.iter().copied().chain(std::iter::repeat(None));
    for ((h, &invested), quote) in holdings.iter().zip(&costs).zip(priced) {
        let current_value = quote
            .map(|price| {
                price
                    .checked_mul(h.quantity)
                    .ok_or_else(|| overflow(format!("current value of {}", h.symbol)))
            })
            .transpose()?;
        let gain_loss = current_value
            .map(|value| {
                value
                    .checked_sub(invested)
                    .ok_or_else(|| overflow(format!("gain/loss of {}", h.symbol)))
            })
            .transpose()?;
        valuations.push(HoldingValuation {
            symbol: h.symbol.clone(),
            asset_type: h.asset_type,
            quantity: h.quantity,
            average_price: h.average_price,
            invested,
            current_price: quote,
            current_value,
            gain_loss,
            weight_percent: percent(invested, total_invested, "position weight")?,
        });
    }

    let unpriced_symbols: Vec<String> = valuations
        .iter()
        .filter(|v| v.current_price.is_none())
        .map(|v| v.symbol.clone())
        .collect();

    let total_current_value = valuations
        .iter()
        .map(|v| v.current_value)
        .collect::<Option<Vec<Decimal>>>()
        .map(|values| checked_sum(values).ok_or_else(|| overflow("total current value")))
        .transpose()?;
    let total_gain_loss = total_current_value
        .map(|v| v.checked_sub(total_invested).ok_or_else(|| overflow("total gain/loss")))
        .transpose()?;
    let total_gain_loss_percent = total_gain_loss
        .map(|g| percent(g, total_invested, "total gain/loss percent"))
        .transpose()?;
    let largest_position_percent = valuations
        .iter()
        .map(|v| v.weight_percent)
        .max()
        .unwrap_or(Decimal::ZERO);

    Ok(PortfolioSummary {
        total_holdings: holdings.len(),
        total_invested,
        total_current_value,
        total_gain_loss,
        total_gain_loss_percent,
        largest_position_percent,
        unpriced_symbols,
        holdings: valuations,
    })
}
