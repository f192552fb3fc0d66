use axum::{Json, extract::State};
use chrono::Utc;
use serde::Deserialize;

use crate::db::Insight;
use crate::error::EverwellError;
use crate::handlers::user_today;
use crate::middleware::{ApiJson, ApiPath, ApiQuery, AuthUser};
use crate::router::AppState;
use crate::service::insights::{GenerateInsight, GeneratedInsight};
use crate::service::usage::UsageSnapshot;

#[derive(Debug, Default, Deserialize)]
pub struct InsightsQuery {
    pub limit: Option<u32>,
}

/// POST /api/insights -> cached or freshly generated insight plus today's usage.
/// A request without a body uses the defaults.
pub async fn generate_insight(
    State(state): State<AppState>,
    user: AuthUser,
    body: Option<ApiJson<GenerateInsight>>,
) -> Result<Json<GeneratedInsight>, EverwellError> {
    let req = body.map(|ApiJson(req)| req).unwrap_or_default();
    let today = user_today(&state, &user.user_id).await?;
    let generated = state
        .insights
        .generate(&user.user_id, req, today, Utc::now())
        .await?;
    Ok(Json(generated))
}

/// GET /api/insights?limit= -> newest first.
pub async fn list_insights(
    State(state): State<AppState>,
    user: AuthUser,
    ApiQuery(query): ApiQuery<InsightsQuery>,
) -> Result<Json<Vec<Insight>>, EverwellError> {
    Ok(Json(state.insights.list(&user.user_id, query.limit).await?))
}

/// GET /api/insights/{id}
pub async fn get_insight(
    State(state): State<AppState>,
    user: AuthUser,
    ApiPath(id): ApiPath<i64>,
) -> Result<Json<Insight>, EverwellError> {
    Ok(Json(state.insights.get(&user.user_id, id).await?))
}

/// GET /api/insights/usage
pub async fn insights_usage(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<UsageSnapshot>, EverwellError> {
    let snapshot = state
        .insights
        .usage()
        .snapshot(&user.user_id, Utc::now())
        .await?;
    Ok(Json(snapshot))
}
