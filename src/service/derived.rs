use crate::db::{DerivedFeature, Measurement, MeasurementFilter, Storage};
use crate::error::EverwellError;
use crate::service::metrics::round_to;
use chrono::{Days, NaiveDate};
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

/// Rolling window length for `<slug>_avg_7d` features, in days.
pub const ROLLING_WINDOW_DAYS: u64 = 7;

/// Compute every derived feature dated within `[from, to]`.
///
/// `measurements` must cover `[from - 6, to]` for the rolling averages to be complete.
pub fn compute_features(
    measurements: &[Measurement],
    height_cm: Option<f64>,
    from: NaiveDate,
    to: NaiveDate,
) -> Vec<(NaiveDate, String, f64)> {
    let mut by_metric: HashMap<&str, BTreeMap<NaiveDate, f64>> = HashMap::new();
    for m in measurements {
        by_metric
            .entry(m.metric_slug.as_str())
            .or_default()
            .insert(m.date, m.value);
    }
    let mut slugs: Vec<&str> = by_metric.keys().copied().collect();
    slugs.sort_unstable();

    let mut out = Vec::new();
    for date in from.iter_days().take_while(|d| *d <= to) {
        if let (Some(h), Some(w)) = (
            height_cm.filter(|h| *h > 0.0),
            by_metric.get("weight").and_then(|s| s.get(&date)),
        ) {
            let meters = h / 100.0;
            out.push((date, "bmi".to_string(), round_to(w / (meters * meters), 1)));
        }

        let window_start = date
            .checked_sub_days(Days::new(ROLLING_WINDOW_DAYS - 1))
            .unwrap_or(date);
        for slug in &slugs {
            let series = &by_metric[slug];
            let (sum, n) = series
                .range(window_start..=date)
                .fold((0.0, 0usize), |(s, n), (_, v)| (s + v, n + 1));
            if n > 0 {
                out.push((date, format!("{slug}_avg_7d"), round_to(sum / n as f64, 2)));
            }
        }
    }
    out
}

/// Keeps `derived_features` in step with raw measurements.
#[derive(Clone)]
pub struct DerivedService {
    storage: Storage,
}

impl DerivedService {
    pub fn new(storage: Storage) -> Self {
        Self { storage }
    }

    /// Recompute features for the dates a write touched, plus the
    /// following days whose rolling windows include them.
    pub async fn recompute(&self, user_id: &str, dates: &[NaiveDate]) -> Result<(), EverwellError> {
        let (Some(first), Some(last)) = (dates.iter().min(), dates.iter().max()) else {
            return Ok(());
        };
        let from = *first;
        let to = last
            .checked_add_days(Days::new(ROLLING_WINDOW_DAYS - 1))
            .unwrap_or(*last);
        let fetch_from = from
            .checked_sub_days(Days::new(ROLLING_WINDOW_DAYS - 1))
            .unwrap_or(from);

        let filter = MeasurementFilter {
            from: Some(fetch_from),
            to: Some(to),
            metric: None,
        };
        let (profile, measurements) = tokio::try_join!(
            self.storage.get_profile(user_id),
            self.storage.list_measurements(user_id, &filter)
        )?;

        let rows = compute_features(&measurements, profile.height_cm, from, to);
        self.storage
            .replace_derived_features(user_id, from, to, &rows)
            .await?;
        debug!(user_id = %user_id, %from, %to, features = rows.len(), "derived features recomputed");
        Ok(())
    }

    pub async fn list(
        &self,
        user_id: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<DerivedFeature>, EverwellError> {
        self.storage.list_derived_features(user_id, from, to).await
    }
}
