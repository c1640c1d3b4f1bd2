//! HTTP surface over the ledger core.

pub mod auth;
pub mod error;
pub mod routes;
