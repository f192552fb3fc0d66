use axum::{
    Json,
    extract::State,
    http::header,
    response::{IntoResponse, Response},
};
use chrono::{NaiveDate, Utc};
use serde::Deserialize;

use crate::db::{Measurement, MeasurementFilter};
use crate::error::EverwellError;
use crate::handlers::user_today;
use crate::middleware::{ApiJson, ApiPath, ApiQuery, AuthUser, TextBody};
use crate::router::AppState;
use crate::service::csv_io::ImportReport;
use crate::service::metrics::MeasurementInput;

const EXPORT_FILENAME: &str = "everwell-measurements.csv";

#[derive(Debug, Default, Deserialize)]
pub struct MeasurementQuery {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    pub metric: Option<String>,
}

/// POST /api/measurements -> upsert by (metric, date).
pub async fn record_measurement(
    State(state): State<AppState>,
    user: AuthUser,
    ApiJson(input): ApiJson<MeasurementInput>,
) -> Result<Json<Measurement>, EverwellError> {
    let today_utc = Utc::now().date_naive();
    Ok(Json(
        state
            .metrics
            .record(&user.user_id, input, today_utc)
            .await?,
    ))
}

/// GET /api/measurements?from&to&metric -> defaults to the last 30 days.
pub async fn list_measurements(
    State(state): State<AppState>,
    user: AuthUser,
    ApiQuery(query): ApiQuery<MeasurementQuery>,
) -> Result<Json<Vec<Measurement>>, EverwellError> {
    let today = user_today(&state, &user.user_id).await?;
    let rows = state
        .metrics
        .list(&user.user_id, query.from, query.to, query.metric, today)
        .await?;
    Ok(Json(rows))
}

/// DELETE /api/measurements/{id}
pub async fn delete_measurement(
    State(state): State<AppState>,
    user: AuthUser,
    ApiPath(id): ApiPath<i64>,
) -> Result<Json<Measurement>, EverwellError> {
    Ok(Json(state.metrics.delete(&user.user_id, id).await?))
}

/// GET /api/measurements/export -> CSV attachment; no filters exports everything.
pub async fn export_measurements(
    State(state): State<AppState>,
    user: AuthUser,
    ApiQuery(query): ApiQuery<MeasurementQuery>,
) -> Result<Response, EverwellError> {
    if let (Some(from), Some(to)) = (query.from, query.to)
        && from > to
    {
        return Err(EverwellError::invalid("`from` must not be after `to`"));
    }
    let filter = MeasurementFilter {
        from: query.from,
        to: query.to,
        metric: query.metric.map(|m| m.trim().to_ascii_lowercase()),
    };
    let body = state.metrics.export_csv(&user.user_id, filter).await?;
    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{EXPORT_FILENAME}\""),
            ),
        ],
        body,
    )
        .into_response())
}

/// POST /api/measurements/import -> raw CSV body, bounded by the route body limit.
pub async fn import_measurements(
    State(state): State<AppState>,
    user: AuthUser,
    TextBody(body): TextBody,
) -> Result<Json<ImportReport>, EverwellError> {
    let today_utc = Utc::now().date_naive();
    Ok(Json(
        state
            .metrics
            .import_csv(&user.user_id, &body, today_utc)
            .await?,
    ))
}
