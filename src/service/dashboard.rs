//! Dashboard aggregation: per-metric averages, short-term trend and the
//! logging streak, computed over one window of measurements.

use crate::db::{Measurement, MeasurementFilter, MetricDefinition};
use crate::error::EverwellError;
use crate::service::metrics::{MetricsService, round_to};
use chrono::{Days, NaiveDate};
use serde::Serialize;
use std::collections::BTreeSet;

pub const DEFAULT_DASHBOARD_DAYS: u32 = 30;
pub const MIN_DASHBOARD_DAYS: u32 = 7;
pub const MAX_DASHBOARD_DAYS: u32 = 365;

#[derive(Debug, Clone, Copy, Serialize, PartialEq)]
pub struct Window {
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub days: u32,
}

impl Window {
    /// The `days`-long window ending on `end` (inclusive).
    pub fn ending(end: NaiveDate, days: u32) -> Self {
        let start = end
            .checked_sub_days(Days::new(u64::from(days.max(1)) - 1))
            .unwrap_or(end);
        Self { start, end, days }
    }
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq)]
pub struct DatedValue {
    pub date: NaiveDate,
    pub value: f64,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct MetricSummary {
    pub slug: String,
    pub name: String,
    pub unit: String,
    pub count: usize,
    pub latest: Option<DatedValue>,
    pub average: Option<f64>,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub avg_7d: Option<f64>,
    pub avg_prev_7d: Option<f64>,
    pub trend: Option<f64>,
    pub target: Option<f64>,
}

#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq, Eq)]
pub struct Streak {
    pub current: u32,
    pub longest: u32,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct DashboardSummary {
    pub window: Window,
    pub metrics: Vec<MetricSummary>,
    pub streak: Streak,
    pub days_logged: usize,
    pub total_measurements: usize,
}

fn mean(values: &[f64]) -> Option<f64> {
    (!values.is_empty()).then(|| values.iter().sum::<f64>() / values.len() as f64)
}

fn values_between(series: &[&Measurement], from: NaiveDate, to: NaiveDate) -> Vec<f64> {
    series
        .iter()
        .filter(|m| m.date >= from && m.date <= to)
        .map(|m| m.value)
        .collect()
}

fn summarize_metric(
    def: &MetricDefinition,
    target: Option<f64>,
    measurements: &[Measurement],
    window: Window,
) -> MetricSummary {
    let mut series: Vec<&Measurement> = measurements
        .iter()
        .filter(|m| m.metric_slug == def.slug && m.date >= window.start && m.date <= window.end)
        .collect();
    series.sort_by_key(|m| m.date);

    let precision = def.decimals + 1;
    let values: Vec<f64> = series.iter().map(|m| m.value).collect();

    let week_start = window.end.checked_sub_days(Days::new(6)).unwrap_or(window.end);
    let prev_end = window.end.checked_sub_days(Days::new(7)).unwrap_or(window.end);
    let prev_start = window.end.checked_sub_days(Days::new(13)).unwrap_or(window.end);
    let avg_7d = mean(&values_between(&series, week_start, window.end));
    let avg_prev_7d = mean(&values_between(&series, prev_start, prev_end));
    let trend = match (avg_7d, avg_prev_7d) {
        (Some(now), Some(before)) => Some(round_to(now - before, precision)),
        _ => None,
    };

    MetricSummary {
        slug: def.slug.clone(),
        name: def.name.clone(),
        unit: def.unit.clone(),
        count: values.len(),
        latest: series.last().map(|m| DatedValue {
            date: m.date,
            value: m.value,
        }),
        average: mean(&values).map(|v| round_to(v, precision)),
        min: values.iter().copied().reduce(f64::min),
        max: values.iter().copied().reduce(f64::max),
        avg_7d: avg_7d.map(|v| round_to(v, precision)),
        avg_prev_7d: avg_prev_7d.map(|v| round_to(v, precision)),
        trend,
        target,
    }
}

/// Consecutive logged days ending today, or yesterday while today is still empty,
/// plus the longest run among `logged`.
pub fn streaks(logged: &BTreeSet<NaiveDate>, today: NaiveDate) -> Streak {
    let mut current = 0;
    let mut cursor = if logged.contains(&today) {
        Some(today)
    } else {
        today.pred_opt()
    };
    while let Some(day) = cursor.filter(|d| logged.contains(d)) {
        current += 1;
        cursor = day.pred_opt();
    }

    let mut longest = 0;
    let mut run = 0;
    let mut previous: Option<NaiveDate> = None;
    for day in logged {
        run = match previous {
            Some(p) if p.succ_opt() == Some(*day) => run + 1,
            _ => 1,
        };
        longest = longest.max(run);
        previous = Some(*day);
    }

    Streak { current, longest }
}

/// Aggregate `measurements` for the enabled metrics over `window`.
pub fn summarize(
    enabled: &[(MetricDefinition, Option<f64>)],
    measurements: &[Measurement],
    window: Window,
) -> DashboardSummary {
    let in_window: Vec<&Measurement> = measurements
        .iter()
        .filter(|m| m.date >= window.start && m.date <= window.end)
        .collect();
    let logged: BTreeSet<NaiveDate> = in_window.iter().map(|m| m.date).collect();

    DashboardSummary {
        window,
        metrics: enabled
            .iter()
            .map(|(def, target)| summarize_metric(def, *target, measurements, window))
            .collect(),
        streak: streaks(&logged, window.end),
        days_logged: logged.len(),
        total_measurements: in_window.len(),
    }
}

#[derive(Clone)]
pub struct DashboardService {
    metrics: MetricsService,
}

impl DashboardService {
    pub fn new(metrics: MetricsService) -> Self {
        Self { metrics }
    }

    pub fn clamp_days(days: Option<u32>) -> Result<u32, EverwellError> {
        let days = days.unwrap_or(DEFAULT_DASHBOARD_DAYS);
        if !(MIN_DASHBOARD_DAYS..=MAX_DASHBOARD_DAYS).contains(&days) {
            return Err(EverwellError::invalid(format!(
                "days must be between {MIN_DASHBOARD_DAYS} and {MAX_DASHBOARD_DAYS}"
            )));
        }
        Ok(days)
    }

    /// Fetch the enabled metrics and the window's measurements, then aggregate.
    pub async fn summary(
        &self,
        user_id: &str,
        window: Window,
    ) -> Result<(DashboardSummary, Vec<Measurement>), EverwellError> {
        let filter = MeasurementFilter {
            from: Some(window.start),
            to: Some(window.end),
            metric: None,
        };
        let (enabled, measurements) = tokio::try_join!(
            self.metrics.enabled_metrics(user_id),
            self.metrics.storage().list_measurements(user_id, &filter)
        )?;
        Ok((summarize(&enabled, &measurements, window), measurements))
    }
}
