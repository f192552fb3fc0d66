use axum::{Json, extract::State, http::StatusCode};
use serde::Deserialize;

use crate::db::Profile;
use crate::error::EverwellError;
use crate::middleware::{ApiJson, ApiQuery, AuthUser};
use crate::router::AppState;
use crate::service::profiles::{CreateProfile, CreatedProfile, HandleAvailability, ProfilePatch};

#[derive(Debug, Deserialize)]
pub struct HandleQuery {
    pub handle: String,
}

/// POST /api/profiles -> creates a profile and returns its first bearer token.
pub async fn create_profile(
    State(state): State<AppState>,
    ApiJson(input): ApiJson<CreateProfile>,
) -> Result<Json<CreatedProfile>, EverwellError> {
    Ok(Json(state.profiles.create(input).await?))
}

/// GET /api/profile
pub async fn get_profile(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<Profile>, EverwellError> {
    Ok(Json(state.profiles.get(&user.user_id).await?))
}

/// PATCH /api/profile -> partial update; `null` clears optional fields.
pub async fn update_profile(
    State(state): State<AppState>,
    user: AuthUser,
    ApiJson(patch): ApiJson<ProfilePatch>,
) -> Result<Json<Profile>, EverwellError> {
    Ok(Json(state.profiles.update(&user.user_id, patch).await?))
}

/// POST /api/auth/logout -> revokes the presented token only.
pub async fn logout(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<StatusCode, EverwellError> {
    state.profiles.logout(&user.token_hash).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/handles/availability?handle= (public)
pub async fn handle_availability(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<HandleQuery>,
) -> Result<Json<HandleAvailability>, EverwellError> {
    Ok(Json(state.profiles.availability(&query.handle).await?))
}
