use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::types::holding::{AssetType, Holding};

/// One holding as it contributes to the portfolio summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HoldingValuation {
    pub symbol: String,
    pub asset_type: AssetType,
    pub quantity: Decimal,
    pub average_price: Decimal,
    pub invested: Decimal,
    pub current_price: Option<Decimal>,
    pub current_value: Option<Decimal>,
    pub gain_loss: Option<Decimal>,
    /// Share of total invested, in percent.
    pub weight_percent: Decimal,
}

/// Aggregate view of a user's portfolio. Current-value fields are `None`
/// when any holding could not be priced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortfolioSummary {
    pub total_holdings: usize,
    pub total_invested: Decimal,
    pub total_current_value: Option<Decimal>,
    pub total_gain_loss: Option<Decimal>,
    pub total_gain_loss_percent: Option<Decimal>,
    pub largest_position_percent: Decimal,
    pub unpriced_symbols: Vec<String>,
    pub holdings: Vec<HoldingValuation>,
}

/// A triple whose stored holding disagrees with a replay of its transactions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HoldingDrift {
    pub symbol: String,
    pub asset_type: AssetType,
    pub stored: Option<Holding>,
    pub replayed: Option<Holding>,
    /// Set when the log for this key cannot be replayed at all.
    pub replay_error: Option<String>,
}
