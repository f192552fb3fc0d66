use axum::{Json, extract::State};

use crate::db::MetricDefinition;
use crate::error::EverwellError;
use crate::middleware::{ApiJson, ApiPath, AuthUser};
use crate::router::AppState;
use crate::service::metrics::{MetricSettingView, SettingInput};

/// GET /api/metrics/definitions
pub async fn list_definitions(
    State(state): State<AppState>,
    _user: AuthUser,
) -> Result<Json<Vec<MetricDefinition>>, EverwellError> {
    Ok(Json(state.metrics.definitions().await?))
}

/// GET /api/metrics/settings -> one entry per definition, defaults filled in.
pub async fn list_settings(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<Vec<MetricSettingView>>, EverwellError> {
    Ok(Json(state.metrics.settings(&user.user_id).await?))
}

/// PUT /api/metrics/settings/{slug}
pub async fn update_setting(
    State(state): State<AppState>,
    user: AuthUser,
    ApiPath(slug): ApiPath<String>,
    ApiJson(input): ApiJson<SettingInput>,
) -> Result<Json<MetricSettingView>, EverwellError> {
    let slug = slug.trim().to_ascii_lowercase();
    Ok(Json(
        state
            .metrics
            .update_setting(&user.user_id, &slug, input)
            .await?,
    ))
}
