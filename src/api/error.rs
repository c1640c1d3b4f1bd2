//! Mapping from ledger errors to HTTP responses.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use tracing::error;

use crate::error::LedgerError;

#[derive(Debug)]
pub enum ApiError {
    Unauthorized(String),
    BadRequest(String),
    Ledger(LedgerError),
}

impl From<LedgerError> for ApiError {
    fn from(err: LedgerError) -> Self {
        ApiError::Ledger(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, json!({ "error": msg })),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, json!({ "error": msg })),
            ApiError::Ledger(err) => match &err {
                LedgerError::Validation { fields } => (
                    StatusCode::BAD_REQUEST,
                    json!({ "error": err.to_string(), "fields": fields }),
                ),
                LedgerError::InvalidQuantity(_) | LedgerError::InvalidPrice(_) => {
                    (StatusCode::BAD_REQUEST, json!({ "error": err.to_string() }))
                }
                LedgerError::InsufficientHolding { .. } => {
                    (StatusCode::CONFLICT, json!({ "error": err.to_string() }))
                }
                LedgerError::PriceSource(_) => {
                    error!(error = %err, "price source failed");
                    (StatusCode::BAD_GATEWAY, json!({ "error": "price source unavailable" }))
                }
                LedgerError::Overflow(_) => {
                    error!(error = %err, "valuation overflowed");
                    (StatusCode::INTERNAL_SERVER_ERROR, json!({ "error": "internal error" }))
                }
                LedgerError::Persistence(_) => {
                    error!(error = %err, "ledger store failed");
                    (StatusCode::INTERNAL_SERVER_ERROR, json!({ "error": "internal error" }))
                }
            },
        };
        (status, Json(body)).into_response()
    }
}
