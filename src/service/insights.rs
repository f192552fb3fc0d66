use crate::api::InsightsProvider;
use crate::db::{Insight, NewInsight, Profile, Storage};
use crate::error::EverwellError;
use crate::service::dashboard::{DashboardService, DashboardSummary, Window};
use crate::service::usage::{InsightsUsageService, UsageSnapshot, cache_key};
use crate::types::{InsightKind, InsightRequest};
use chrono::{DateTime, NaiveDate, Utc};
use governor::{DefaultKeyedRateLimiter, Quota, RateLimiter};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::num::NonZeroU32;
use std::sync::Arc;
use tracing::{info, warn};

pub const DEFAULT_INSIGHT_DAYS: u32 = 14;
pub const MIN_INSIGHT_DAYS: u32 = 7;
pub const MAX_INSIGHT_DAYS: u32 = 90;
pub const DEFAULT_LIST_LIMIT: u32 = 10;
pub const MAX_LIST_LIMIT: u32 = 50;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct GenerateInsight {
    #[serde(default)]
    pub kind: InsightKind,
    #[serde(default)]
    pub days: Option<u32>,
    #[serde(default)]
    pub force: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct GeneratedInsight {
    pub insight: Insight,
    pub cached: bool,
    pub usage: UsageSnapshot,
}

#[derive(Debug, Clone, Serialize)]
struct ProfileContext {
    age_years: Option<u32>,
    height_cm: Option<f64>,
}

/// What the model sees: the window's aggregates plus light profile context.
#[derive(Debug, Clone, Serialize)]
struct InsightPayload<'a> {
    kind: InsightKind,
    profile: ProfileContext,
    #[serde(flatten)]
    summary: &'a DashboardSummary,
}

fn age_on(birth_date: Option<NaiveDate>, on: NaiveDate) -> Option<u32> {
    birth_date.and_then(|b| on.years_since(b))
}

fn build_payload(
    kind: InsightKind,
    profile: &Profile,
    summary: &DashboardSummary,
) -> Result<Value, EverwellError> {
    let payload = InsightPayload {
        kind,
        profile: ProfileContext {
            age_years: age_on(profile.birth_date, summary.window.end),
            height_cm: profile.height_cm,
        },
        summary,
    };
    Ok(serde_json::to_value(payload)?)
}

/// Drop limiter keys whose bucket has fully refilled.
fn forget_idle_callers(limiter: &DefaultKeyedRateLimiter<String>) {
    limiter.retain_recent();
    limiter.shrink_to_fit();
}

/// Orchestrates insight generation: aggregation, cache, quota, provider call, persistence.
#[derive(Clone)]
pub struct InsightsService {
    storage: Storage,
    dashboard: DashboardService,
    usage: InsightsUsageService,
    provider: Option<Arc<dyn InsightsProvider>>,
    burst: Option<Arc<DefaultKeyedRateLimiter<String>>>,
}

impl InsightsService {
    pub fn new(
        storage: Storage,
        dashboard: DashboardService,
        usage: InsightsUsageService,
        provider: Option<Arc<dyn InsightsProvider>>,
        burst_per_minute: u32,
    ) -> Self {
        let burst = NonZeroU32::new(burst_per_minute)
            .map(|n| Arc::new(RateLimiter::keyed(Quota::per_minute(n))));
        Self {
            storage,
            dashboard,
            usage,
            provider,
            burst,
        }
    }

    pub fn usage(&self) -> &InsightsUsageService {
        &self.usage
    }

    pub async fn generate(
        &self,
        user_id: &str,
        req: GenerateInsight,
        today: NaiveDate,
        now: DateTime<Utc>,
    ) -> Result<GeneratedInsight, EverwellError> {
        let provider = self.provider.clone().ok_or(EverwellError::NoOpenAiKey)?;

        let days = req.days.unwrap_or(DEFAULT_INSIGHT_DAYS);
        if !(MIN_INSIGHT_DAYS..=MAX_INSIGHT_DAYS).contains(&days) {
            return Err(EverwellError::invalid(format!(
                "days must be between {MIN_INSIGHT_DAYS} and {MAX_INSIGHT_DAYS}"
            )));
        }
        let window = Window::ending(today, days);

        let (profile, (summary, _)) = tokio::try_join!(
            self.storage.get_profile(user_id),
            self.dashboard.summary(user_id, window)
        )?;
        if summary.total_measurements == 0 {
            return Err(EverwellError::invalid(
                "no measurements in the selected window; log some data first",
            ));
        }

        let payload = build_payload(req.kind, &profile, &summary)?;
        let key = cache_key(user_id, req.kind, &payload);

        if !req.force
            && let Some(insight) = self.usage.cached(user_id, &key, now).await?
        {
            return Ok(GeneratedInsight {
                insight,
                cached: true,
                usage: self.usage.snapshot(user_id, now).await?,
            });
        }

        if let Some(limiter) = &self.burst
            && limiter.check_key(&user_id.to_string()).is_err()
        {
            return Err(EverwellError::RateLimit(
                "Too many insight requests; wait a minute and try again.".into(),
            ));
        }
        let usage = self.usage.reserve(user_id, now).await?;

        let request = InsightRequest {
            kind: req.kind,
            payload,
        };
        let draft = match provider.generate(&request).await {
            Ok(draft) => draft,
            Err(e) => {
                warn!(user_id = %user_id, error = %e, "insight generation failed");
                self.usage.release(user_id, usage.day).await;
                return Err(e);
            }
        };

        let insight = match self
            .storage
            .insert_insight(&NewInsight {
                user_id: user_id.to_string(),
                kind: req.kind.as_str().to_string(),
                period_start: window.start,
                period_end: window.end,
                summary: draft.summary,
                recommendations: draft.recommendations,
                model: provider.model().to_string(),
            })
            .await
        {
            Ok(insight) => insight,
            Err(e) => {
                warn!(user_id = %user_id, error = %e, "failed to store insight");
                self.usage.release(user_id, usage.day).await;
                return Err(e);
            }
        };
        if let Err(e) = self.usage.remember(user_id, &key, insight.id, now).await {
            warn!(user_id = %user_id, error = %e, "failed to cache insight");
        }
        self.usage.spawn_cleanup();
        if let Some(limiter) = &self.burst {
            forget_idle_callers(limiter);
        }

        info!(user_id = %user_id, insight_id = insight.id, kind = req.kind.as_str(), "insight generated");
        Ok(GeneratedInsight {
            insight,
            cached: false,
            usage,
        })
    }

    pub async fn list(&self, user_id: &str, limit: Option<u32>) -> Result<Vec<Insight>, EverwellError> {
        let limit = limit.unwrap_or(DEFAULT_LIST_LIMIT);
        if !(1..=MAX_LIST_LIMIT).contains(&limit) {
            return Err(EverwellError::invalid(format!(
                "limit must be between 1 and {MAX_LIST_LIMIT}"
            )));
        }
        self.storage.list_insights(user_id, limit).await
    }

    pub async fn get(&self, user_id: &str, id: i64) -> Result<Insight, EverwellError> {
        self.storage.get_insight(user_id, id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::dashboard::Streak;

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn idle_limiter_keys_are_forgotten() {
        let limiter: DefaultKeyedRateLimiter<String> =
            RateLimiter::keyed(Quota::per_second(NonZeroU32::new(1000).unwrap()));
        assert!(limiter.check_key(&"u1".to_string()).is_ok());
        assert_eq!(limiter.len(), 1);
        std::thread::sleep(std::time::Duration::from_millis(50));
        forget_idle_callers(&limiter);
        assert!(limiter.is_empty());
    }

    #[test]
    fn age_counts_full_years() {
        assert_eq!(age_on(Some(d("1990-10-17")), d("2026-10-16")), Some(35));
        assert_eq!(age_on(Some(d("1990-10-16")), d("2026-10-16")), Some(36));
        assert_eq!(age_on(None, d("2026-10-16")), None);
    }

    #[test]
    fn payload_flattens_summary() {
        let now = Utc::now();
        let profile = Profile {
            id: "u1".into(),
            handle: "ada".into(),
            display_name: Some("Ada".into()),
            email: Some("ada@example.com".into()),
            height_cm: Some(170.0),
            birth_date: None,
            created_at: now,
            updated_at: now,
        };
        let summary = DashboardSummary {
            window: Window::ending(d("2026-10-16"), 14),
            metrics: vec![],
            streak: Streak {
                current: 2,
                longest: 5,
            },
            days_logged: 6,
            total_measurements: 9,
        };
        let payload = build_payload(InsightKind::Plan, &profile, &summary).unwrap();
        assert_eq!(payload["kind"], "plan");
        assert_eq!(payload["profile"]["height_cm"], 170.0);
        assert_eq!(payload["streak"]["longest"], 5);
        assert_eq!(payload["window"]["start"], "2026-10-03");
        // identifying details stay out of the prompt
        assert!(payload.get("handle").is_none());
        assert!(!payload.to_string().contains("ada@example.com"));
    }
}
