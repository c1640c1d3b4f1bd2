//! Current-price lookup used to value holdings. Prices come from outside the
//! ledger; nothing here fetches market data.

use std::collections::HashMap;

use async_trait::async_trait;
use rust_decimal::Decimal;

use crate::error::LedgerResult;
use crate::types::{AssetType, normalize_symbol};

#[async_trait]
pub trait PriceSource: Send + Sync {
    /// Latest unit price, or `None` when the symbol is not quoted.
    async fn current_price(&self, symbol: &str, asset_type: AssetType) -> LedgerResult<Option<Decimal>>;
}

/// Fixed price table.
#[derive(Debug, Clone, Default)]
pub struct StaticPriceSource {
    prices: HashMap<(String, AssetType), Decimal>,
}

impl StaticPriceSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_price(mut self, symbol: &str, asset_type: AssetType, price: Decimal) -> Self {
        self.set_price(symbol, asset_type, price);
        self
    }

    pub fn set_price(&mut self, symbol: &str, asset_type: AssetType, price: Decimal) {
        self.prices.insert((normalize_symbol(symbol), asset_type), price);
    }
}

#[async_trait]
impl PriceSource for StaticPriceSource {
    async fn current_price(&self, symbol: &str, asset_type: AssetType) -> LedgerResult<Option<Decimal>> {
        Ok(self.prices.get(&(normalize_symbol(symbol), asset_type)).copied())
    }
}
