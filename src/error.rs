//! Error types surfaced by the ledger core.

use rust_decimal::Decimal;
use serde::Serialize;
use thiserror::Error;

use crate::types::AssetType;

/// A single rejected input field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: &'static str,
    pub reason: String,
}

impl FieldError {
    pub fn missing(field: &'static str) -> Self {
        Self {
            field,
            reason: "is required".to_string(),
        }
    }

    pub fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self {
            field,
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("invalid transaction: {}", describe_fields(.fields))]
    Validation { fields: Vec<FieldError> },

    #[error("quantity must be greater than zero, got {0}")]
    InvalidQuantity(Decimal),

    #[error("price per unit must be greater than zero, got {0}")]
    InvalidPrice(Decimal),

    #[error("insufficient {asset_type} holding in {symbol}: held {held}, requested {requested}")]
    InsufficientHolding {
        symbol: String,
        asset_type: AssetType,
        held: Decimal,
        requested: Decimal,
    },

    #[error("price source failed: {0}")]
    PriceSource(String),

    #[error("arithmetic overflow computing {0}")]
    Overflow(String),

    #[error("ledger store failure: {0}")]
    Persistence(String),
}

impl LedgerError {
    pub fn validation(fields: Vec<FieldError>) -> Self {
        LedgerError::Validation { fields }
    }

    /// Errors caused by the request itself; resubmitting unchanged never helps.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            LedgerError::Validation { .. }
                | LedgerError::InvalidQuantity(_)
                | LedgerError::InvalidPrice(_)
                | LedgerError::InsufficientHolding { .. }
        )
    }
}

impl From<sqlx::Error> for LedgerError {
    fn from(err: sqlx::Error) -> Self {
        LedgerError::Persistence(err.to_string())
    }
}

impl From<sqlx::migrate::MigrateError> for LedgerError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        LedgerError::Persistence(format!("migration failed: {}", err))
    }
}

fn describe_fields(fields: &[FieldError]) -> String {
    fields
        .iter()
        .map(|f| format!("{} {}", f.field, f.reason))
        .collect::<Vec<_>>()
        .join(", ")
}

pub type LedgerResult<T> = Result<T, LedgerError>;
