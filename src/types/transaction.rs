use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::holding::{AssetType, HoldingKey};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionKind {
    Buy,
    Sell,
}

impl TransactionKind {
    pub fn as_str(self) -> &'static str {
        match self {
            TransactionKind::Buy => "buy",
            TransactionKind::Sell => "sell",
        }
    }
}

impl fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "buy" => Ok(TransactionKind::Buy),
            "sell" => Ok(TransactionKind::Sell),
            other => Err(format!("unknown transaction type '{}', expected 'buy' or 'sell'", other)),
        }
    }
}

/// Inbound order as submitted by a caller. Every field is optional so that
/// validation can report all missing fields at once.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TransactionRequest {
    pub symbol: Option<String>,
    #[serde(rename = "type")]
    pub asset_type: Option<String>,
    pub transaction_type: Option<String>,
    pub quantity: Option<Decimal>,
    pub price_per_unit: Option<Decimal>,
    pub transaction_date: Option<DateTime<Utc>>,
}

impl TransactionRequest {
    pub fn new(
        symbol: &str,
        asset_type: AssetType,
        kind: TransactionKind,
        quantity: Decimal,
        price_per_unit: Decimal,
    ) -> Self {
        Self {
            symbol: Some(symbol.to_string()),
            asset_type: Some(asset_type.as_str().to_string()),
            transaction_type: Some(kind.as_str().to_string()),
            quantity: Some(quantity),
            price_per_unit: Some(price_per_unit),
            transaction_date: None,
        }
    }

    pub fn at(mut self, transaction_date: DateTime<Utc>) -> Self {
        self.transaction_date = Some(transaction_date);
        self
    }
}

/// A validated transaction, ready to be applied and written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTransaction {
    pub user_id: Uuid,
    pub symbol: String,
    pub asset_type: AssetType,
    pub kind: TransactionKind,
    pub quantity: Decimal,
    pub price_per_unit: Decimal,
    pub total_amount: Decimal,
    pub transaction_date: Option<DateTime<Utc>>,
}

impl NewTransaction {
    pub fn key(&self) -> HoldingKey {
        HoldingKey {
            user_id: self.user_id,
            symbol: self.symbol.clone(),
            asset_type: self.asset_type,
        }
    }
}

/// Persisted, immutable ledger entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionRecord {
    pub id: Uuid,
    pub user_id: Uuid,
    pub symbol: String,
    pub asset_type: AssetType,
    pub transaction_type: TransactionKind,
    pub quantity: Decimal,
    pub price_per_unit: Decimal,
    pub total_amount: Decimal,
    pub transaction_date: DateTime<Utc>,
}

impl TransactionRecord {
    pub fn key(&self) -> HoldingKey {
        HoldingKey {
            user_id: self.user_id,
            symbol: self.symbol.clone(),
            asset_type: self.asset_type,
        }
    }
}
