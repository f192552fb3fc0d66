use axum::extract::FromRequestParts;
use axum::http::{HeaderMap, request::Parts};
use axum_extra::TypedHeader;
use base64::Engine;
use headers::{Authorization, authorization::Bearer};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use uuid::Uuid;

use crate::error::EverwellError;
use crate::router::AppState;

/// Mint a new opaque bearer token: 32 random bytes, URL-safe base64.
pub fn issue_token() -> String {
    let mut bytes = [0u8; 32];
    bytes[..16].copy_from_slice(Uuid::new_v4().as_bytes());
    bytes[16..].copy_from_slice(Uuid::new_v4().as_bytes());
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes)
}

/// Tokens are stored only as their SHA-256 hex digest.
pub fn hash_token(token: &str) -> String {
    format!("{:x}", Sha256::digest(token.as_bytes()))
}

/// An authenticated caller, resolved from `Authorization: Bearer <token>`.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: String,
    pub token_hash: String,
}

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = EverwellError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let TypedHeader(Authorization(bearer)) =
            TypedHeader::<Authorization<Bearer>>::from_request_parts(parts, state)
                .await
                .map_err(|_| EverwellError::NotAuthenticated)?;

        let token_hash = hash_token(bearer.token().trim());
        let user_id = state
            .storage
            .user_for_token(&token_hash)
            .await?
            .ok_or(EverwellError::NotAuthenticated)?;
        Ok(Self {
            user_id,
            token_hash,
        })
    }
}

/// Ensure a scheduler call carries the configured cron secret.
/// Accepts either:
/// - Header: `Authorization: Bearer <secret>`
/// - Header: `x-cron-secret: <secret>`
pub fn ensure_cron_authorized(
    headers: &HeaderMap,
    expected: Option<&str>,
) -> Result<(), EverwellError> {
    let Some(expected) = expected else {
        return Err(EverwellError::FeatureDisabled("CRON_SECRET"));
    };
    let matches = |candidate: &str| bool::from(candidate.as_bytes().ct_eq(expected.as_bytes()));

    if let Some(hv) = headers.get("x-cron-secret").and_then(|v| v.to_str().ok())
        && matches(hv.trim())
    {
        return Ok(());
    }

    if let Some(auth) = headers.get("authorization").and_then(|v| v.to_str().ok()) {
        let auth = auth.trim();
        if let Some(token) = auth
            .strip_prefix("Bearer ")
            .or_else(|| auth.strip_prefix("bearer "))
            && matches(token.trim())
        {
            return Ok(());
        }
    }

    Err(EverwellError::NotAuthenticated)
}

#[derive(Debug, Clone, Copy)]
pub struct CronAuth;

impl FromRequestParts<AppState> for CronAuth {
    type Rejection = EverwellError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        ensure_cron_authorized(&parts.headers, state.config.cron_secret())?;
        Ok(Self)
    }
}
