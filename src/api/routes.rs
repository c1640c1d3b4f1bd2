use std::sync::Arc;

use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use tower_http::trace::TraceLayer;

use crate::api::auth::AuthUser;
use crate::api::error::ApiError;
use crate::persistence::LedgerStore;
use crate::pricing::PriceSource;
use crate::processor::TransactionProcessor;
use crate::query::PortfolioQueryService;
use crate::types::{Holding, HoldingDrift, PortfolioSummary, TransactionRecord, TransactionRequest};

/// Shared state for all handlers. The store is injected once at startup.
#[derive(Clone)]
pub struct AppState {
    pub processor: TransactionProcessor,
    pub queries: PortfolioQueryService,
    pub prices: Option<Arc<dyn PriceSource>>,
    pub jwt_secret: Vec<u8>,
}

impl AppState {
    pub fn new(
        store: Arc<dyn LedgerStore>,
        prices: Option<Arc<dyn PriceSource>>,
        jwt_secret: Vec<u8>,
    ) -> Self {
        Self {
            processor: TransactionProcessor::new(Arc::clone(&store)),
            queries: PortfolioQueryService::new(store),
            prices,
            jwt_secret,
        }
    }
}

async fn health() -> &'static str {
    "healthy"
}

async fn list_holdings(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<Vec<Holding>>, ApiError> {
    Ok(Json(state.queries.list_holdings(user.user_id).await?))
}

async fn summary(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<PortfolioSummary>, ApiError> {
    let summary = state
        .queries
        .get_summary(user.user_id, state.prices.as_deref())
        .await?;
    Ok(Json(summary))
}

async fn list_transactions(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<Vec<TransactionRecord>>, ApiError> {
    Ok(Json(state.queries.list_transactions(user.user_id).await?))
}

async fn add_transaction(
    State(state): State<AppState>,
    user: AuthUser,
    body: Result<Json<TransactionRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<TransactionRecord>), ApiError> {
    let Json(request) = body.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    let record = state
        .processor
        .record_transaction(user.user_id, request)
        .await?;
    Ok((StatusCode::CREATED, Json(record)))
}

async fn audit(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<Vec<HoldingDrift>>, ApiError> {
    Ok(Json(state.queries.audit(user.user_id).await?))
}

pub fn app_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/portfolio", get(list_holdings))
        .route("/api/portfolio/summary", get(summary))
        .route("/api/portfolio/transactions", get(list_transactions))
        .route("/api/portfolio/transaction", post(add_transaction))
        .route("/api/portfolio/audit", get(audit))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
