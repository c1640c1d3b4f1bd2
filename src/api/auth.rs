//! Bearer-token authentication. Every portfolio route is scoped to the user
//! named by the token; there is no other notion of identity.

use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use chrono::{Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::error::ApiError;
use crate::api::routes::AppState;

/// Header older web clients send the token in.
pub const LEGACY_TOKEN_HEADER: &str = "x-auth-token";

const TOKEN_TTL_HOURS: i64 = 24;

/// Token payload. `sub` is the id of the user whose ledger the bearer may read
/// and write.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub iat: i64,
    pub exp: i64,
}

/// Ledger owner resolved from the request token.
#[derive(Debug, Clone, Copy)]
pub struct AuthUser {
    pub user_id: Uuid,
}

/// Mint an HS256 ledger token for `user_id`. The service has no login route;
/// operators and tests call this directly.
pub fn create_token(secret: &[u8], user_id: Uuid) -> Result<String, jsonwebtoken::errors::Error> {
    let issued = Utc::now();
    let claims = Claims {
        sub: user_id,
        iat: issued.timestamp(),
        exp: (issued + Duration::hours(TOKEN_TTL_HOURS)).timestamp(),
    };
    encode(&Header::new(Algorithm::HS256), &claims, &EncodingKey::from_secret(secret))
}

/// Check signature and expiry; returns the ledger owner.
pub fn verify_token(secret: &[u8], token: &str) -> Result<Uuid, jsonwebtoken::errors::Error> {
    let validation = Validation::new(Algorithm::HS256);
    let data = decode::<Claims>(token, &DecodingKey::from_secret(secret), &validation)?;
    Ok(data.claims.sub)
}

/// `Authorization: Bearer <token>` wins over `x-auth-token`.
fn token_from_parts(parts: &Parts) -> Option<&str> {
    let bearer = parts
        .headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));
    bearer
        .or_else(|| {
            parts
                .headers
                .get(LEGACY_TOKEN_HEADER)
                .and_then(|v| v.to_str().ok())
        })
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = token_from_parts(parts)
            .ok_or_else(|| ApiError::Unauthorized("missing token".to_string()))?;
        let user_id = verify_token(&state.jwt_secret, token)
            .map_err(|_| ApiError::Unauthorized("invalid or expired token".to_string()))?;
        Ok(AuthUser { user_id })
    }
}
