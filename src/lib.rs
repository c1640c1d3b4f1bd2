//! Portfolio ledger: an append-only transaction log with holdings kept in
//! step under average-cost accounting, plus the read-side projections over it.

pub mod api;
pub mod config;
pub mod cost_basis;
pub mod error;
pub mod persistence;
pub mod pricing;
pub mod processor;
pub mod query;
pub mod types;

pub use error::{FieldError, LedgerError, LedgerResult};
