use crate::db::{Measurement, MeasurementFilter, MetricDefinition, NewMeasurement, Storage};
use crate::error::EverwellError;
use crate::service::derived::DerivedService;
use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

/// Metrics shown to users who never touched their settings.
pub const DEFAULT_ENABLED_METRICS: &[&str] = &["weight", "sleep_hours", "steps"];
pub const DEFAULT_LIST_DAYS: u64 = 30;
pub const MAX_LIST_DAYS: i64 = 366;
const NOTE_MAX_CHARS: usize = 500;

pub fn round_to(value: f64, decimals: i64) -> f64 {
    let factor = 10f64.powi(decimals.clamp(0, 6) as i32);
    (value * factor).round() / factor
}

/// Check `value` against the definition's bounds and round it to its precision.
pub fn validate_value(def: &MetricDefinition, value: f64) -> Result<f64, EverwellError> {
    if !value.is_finite() || value < def.min_value || value > def.max_value {
        return Err(EverwellError::invalid(format!(
            "{} must be between {} and {} {}",
            def.slug, def.min_value, def.max_value, def.unit
        )));
    }
    Ok(round_to(value, def.decimals))
}

/// Measurement dates may run one day ahead of UTC to cover users east of Greenwich.
pub fn validate_date(date: NaiveDate, today_utc: NaiveDate) -> Result<(), EverwellError> {
    let earliest = NaiveDate::from_ymd_opt(1900, 1, 1).unwrap_or(NaiveDate::MIN);
    let latest = today_utc.checked_add_days(Days::new(1)).unwrap_or(today_utc);
    if date < earliest || date > latest {
        return Err(EverwellError::invalid(format!(
            "date {date} is outside the accepted range"
        )));
    }
    Ok(())
}

fn validate_note(note: Option<String>) -> Result<Option<String>, EverwellError> {
    let note = note.map(|n| n.trim().to_string()).filter(|n| !n.is_empty());
    if note.as_ref().is_some_and(|n| n.chars().count() > NOTE_MAX_CHARS) {
        return Err(EverwellError::invalid(format!(
            "note must be at most {NOTE_MAX_CHARS} characters"
        )));
    }
    Ok(note)
}

/// Resolve an optional `[from, to]` query into a bounded range ending at `today` by default.
pub fn resolve_range(
    from: Option<NaiveDate>,
    to: Option<NaiveDate>,
    today: NaiveDate,
) -> Result<(NaiveDate, NaiveDate), EverwellError> {
    let to = to.unwrap_or(today);
    let from = from.unwrap_or_else(|| {
        to.checked_sub_days(Days::new(DEFAULT_LIST_DAYS - 1))
            .unwrap_or(to)
    });
    if from > to {
        return Err(EverwellError::invalid("`from` must not be after `to`"));
    }
    if (to - from).num_days() >= MAX_LIST_DAYS {
        return Err(EverwellError::invalid(format!(
            "date range must span at most {MAX_LIST_DAYS} days"
        )));
    }
    Ok((from, to))
}

#[derive(Debug, Clone, Deserialize)]
pub struct MeasurementInput {
    pub date: NaiveDate,
    pub metric_slug: String,
    pub value: f64,
    #[serde(default)]
    pub note: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SettingInput {
    pub enabled: bool,
    #[serde(default)]
    pub target: Option<f64>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct MetricSettingView {
    pub metric: MetricDefinition,
    pub enabled: bool,
    pub target: Option<f64>,
}

/// Centralizes the metric and measurement queries shared by several routes.
#[derive(Clone)]
pub struct MetricsService {
    storage: Storage,
    derived: DerivedService,
}

impl MetricsService {
    pub fn new(storage: Storage, derived: DerivedService) -> Self {
        Self { storage, derived }
    }

    pub(crate) fn storage(&self) -> &Storage {
        &self.storage
    }

    pub(crate) fn derived(&self) -> &DerivedService {
        &self.derived
    }

    pub async fn definitions(&self) -> Result<Vec<MetricDefinition>, EverwellError> {
        self.storage.list_definitions().await
    }

    pub async fn definitions_by_slug(
        &self,
    ) -> Result<HashMap<String, MetricDefinition>, EverwellError> {
        Ok(self
            .storage
            .list_definitions()
            .await?
            .into_iter()
            .map(|d| (d.slug.clone(), d))
            .collect())
    }

    async fn definition(&self, slug: &str) -> Result<MetricDefinition, EverwellError> {
        self.storage
            .get_definition(slug)
            .await?
            .ok_or(EverwellError::NotFound("metric"))
    }

    /// Every definition merged with the user's saved setting or the defaults.
    pub async fn settings(&self, user_id: &str) -> Result<Vec<MetricSettingView>, EverwellError> {
        let (definitions, saved) = tokio::try_join!(
            self.storage.list_definitions(),
            self.storage.list_settings(user_id)
        )?;
        let saved: HashMap<String, _> = saved
            .into_iter()
            .map(|s| (s.metric_slug.clone(), s))
            .collect();

        Ok(definitions
            .into_iter()
            .map(|metric| match saved.get(&metric.slug) {
                Some(s) => MetricSettingView {
                    enabled: s.enabled,
                    target: s.target,
                    metric,
                },
                None => MetricSettingView {
                    enabled: DEFAULT_ENABLED_METRICS.contains(&metric.slug.as_str()),
                    target: None,
                    metric,
                },
            })
            .collect())
    }

    /// Enabled metrics with their targets, in catalogue order.
    pub async fn enabled_metrics(
        &self,
        user_id: &str,
    ) -> Result<Vec<(MetricDefinition, Option<f64>)>, EverwellError> {
        Ok(self
            .settings(user_id)
            .await?
            .into_iter()
            .filter(|s| s.enabled)
            .map(|s| (s.metric, s.target))
            .collect())
    }

    pub async fn update_setting(
        &self,
        user_id: &str,
        slug: &str,
        input: SettingInput,
    ) -> Result<MetricSettingView, EverwellError> {
        let metric = self.definition(slug).await?;
        let target = input
            .target
            .map(|t| validate_value(&metric, t))
            .transpose()?;
        let saved = self
            .storage
            .upsert_setting(user_id, &metric.slug, input.enabled, target)
            .await?;
        Ok(MetricSettingView {
            metric,
            enabled: saved.enabled,
            target: saved.target,
        })
    }

    /// Validate and upsert one measurement, then refresh derived features.
    pub async fn record(
        &self,
        user_id: &str,
        input: MeasurementInput,
        today_utc: NaiveDate,
    ) -> Result<Measurement, EverwellError> {
        let slug = input.metric_slug.trim().to_ascii_lowercase();
        let metric = self
            .storage
            .get_definition(&slug)
            .await?
            .ok_or_else(|| EverwellError::invalid(format!("unknown metric `{slug}`")))?;
        validate_date(input.date, today_utc)?;
        let value = validate_value(&metric, input.value)?;
        let note = validate_note(input.note)?;

        let saved = self
            .storage
            .upsert_measurement(
                user_id,
                &NewMeasurement {
                    metric_slug: metric.slug,
                    date: input.date,
                    value,
                    note,
                },
            )
            .await?;
        debug!(user_id = %user_id, metric = %saved.metric_slug, date = %saved.date, "measurement recorded");
        self.derived.recompute(user_id, &[saved.date]).await?;
        Ok(saved)
    }

    pub async fn list(
        &self,
        user_id: &str,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
        metric: Option<String>,
        today: NaiveDate,
    ) -> Result<Vec<Measurement>, EverwellError> {
        let (from, to) = resolve_range(from, to, today)?;
        let filter = MeasurementFilter {
            from: Some(from),
            to: Some(to),
            metric: metric.map(|m| m.trim().to_ascii_lowercase()),
        };
        self.storage.list_measurements(user_id, &filter).await
    }

    pub async fn delete(&self, user_id: &str, id: i64) -> Result<Measurement, EverwellError> {
        let removed = self
            .storage
            .delete_measurement(user_id, id)
            .await?
            .ok_or(EverwellError::NotFound("measurement"))?;
        self.derived.recompute(user_id, &[removed.date]).await?;
        Ok(removed)
    }
}
