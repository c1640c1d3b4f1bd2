use std::fmt;
use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Kind of instrument a holding tracks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetType {
    Stock,
    Crypto,
}

impl AssetType {
    pub fn as_str(self) -> &'static str {
        match self {
            AssetType::Stock => "stock",
            AssetType::Crypto => "crypto",
        }
    }
}

impl fmt::Display for AssetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AssetType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "stock" => Ok(AssetType::Stock),
            "crypto" => Ok(AssetType::Crypto),
            other => Err(format!("unknown asset type '{}', expected 'stock' or 'crypto'", other)),
        }
    }
}

/// Identity of a holding: one row per (user, symbol, asset type).
/// Symbol is always stored upper-case.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct HoldingKey {
    pub user_id: Uuid,
    pub symbol: String,
    pub asset_type: AssetType,
}

impl HoldingKey {
    pub fn new(user_id: Uuid, symbol: &str, asset_type: AssetType) -> Self {
        Self {
            user_id,
            symbol: normalize_symbol(symbol),
            asset_type,
        }
    }

    /// Stable text form used as the Postgres advisory-lock key.
    pub fn lock_key(&self) -> String {
        format!("{}:{}:{}", self.user_id, self.symbol, self.asset_type)
    }
}

/// Current position in one instrument. Exists only while `quantity > 0`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Holding {
    pub user_id: Uuid,
    pub symbol: String,
    pub asset_type: AssetType,
    pub quantity: Decimal,
    pub average_price: Decimal,
}

impl Holding {
    pub fn key(&self) -> HoldingKey {
        HoldingKey {
            user_id: self.user_id,
            symbol: self.symbol.clone(),
            asset_type: self.asset_type,
        }
    }

    /// Cost basis of the whole position; `None` if it overflows.
    pub fn invested(&self) -> Option<Decimal> {
        self.quantity.checked_mul(self.average_price)
    }
}

pub fn normalize_symbol(symbol: &str) -> String {
    symbol.trim().to_uppercase()
}
