use crate::db::{Insight, Storage};
use crate::error::EverwellError;
use crate::types::InsightKind;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct UsageSnapshot {
    pub day: NaiveDate,
    pub used: u32,
    pub limit: u32,
    pub remaining: u32,
}

impl UsageSnapshot {
    fn new(day: NaiveDate, used: u32, limit: u32) -> Self {
        Self {
            day,
            used,
            limit,
            remaining: limit.saturating_sub(used),
        }
    }
}

/// Cache key for an insight request: SHA-256 over user, kind and the serialized payload.
pub fn cache_key(user_id: &str, kind: InsightKind, payload: &Value) -> String {
    let mut hasher = Sha256::new();
    hasher.update(user_id.as_bytes());
    hasher.update(b"\n");
    hasher.update(kind.as_str().as_bytes());
    hasher.update(b"\n");
    hasher.update(payload.to_string().as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Daily quota accounting and the payload-keyed response cache for AI insights.
#[derive(Clone)]
pub struct InsightsUsageService {
    storage: Storage,
    daily_limit: u32,
    cache_ttl: Duration,
}

impl InsightsUsageService {
    pub fn new(storage: Storage, daily_limit: u32, cache_ttl_hours: i64) -> Self {
        Self {
            storage,
            daily_limit,
            cache_ttl: Duration::hours(cache_ttl_hours.max(0)),
        }
    }

    pub async fn snapshot(
        &self,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> Result<UsageSnapshot, EverwellError> {
        let day = now.date_naive();
        let used = self.storage.usage_for_day(user_id, day).await?;
        Ok(UsageSnapshot::new(day, used, self.daily_limit))
    }

    /// Take one unit of today's quota or fail with `rate_limit`.
    pub async fn reserve(
        &self,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> Result<UsageSnapshot, EverwellError> {
        let day = now.date_naive();
        match self
            .storage
            .try_reserve_usage(user_id, day, self.daily_limit)
            .await?
        {
            Some(used) => Ok(UsageSnapshot::new(day, used, self.daily_limit)),
            None => {
                info!(user_id = %user_id, limit = self.daily_limit, "daily insight limit reached");
                Err(EverwellError::RateLimit(format!(
                    "Daily limit of {} insights reached; try again tomorrow.",
                    self.daily_limit
                )))
            }
        }
    }

    /// Return a reserved unit after a failed generation. Failures are logged, not raised.
    pub async fn release(&self, user_id: &str, day: NaiveDate) {
        if let Err(e) = self.storage.release_usage(user_id, day).await {
            warn!(user_id = %user_id, error = %e, "failed to release insight quota");
        }
    }

    pub async fn cached(
        &self,
        user_id: &str,
        key: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<Insight>, EverwellError> {
        let hit = self.storage.get_cached_insight(user_id, key, now).await?;
        debug!(user_id = %user_id, hit = hit.is_some(), "insight cache lookup");
        Ok(hit)
    }

    pub async fn remember(
        &self,
        user_id: &str,
        key: &str,
        insight_id: i64,
        now: DateTime<Utc>,
    ) -> Result<(), EverwellError> {
        self.storage
            .put_cache(key, user_id, insight_id, now + self.cache_ttl)
            .await
    }

    pub async fn cleanup_expired(&self, now: DateTime<Utc>) -> Result<u64, EverwellError> {
        let deleted = self.storage.delete_expired_cache(now).await?;
        if deleted > 0 {
            info!(deleted, "expired insight cache entries removed");
        }
        Ok(deleted)
    }

    /// Fire-and-forget cleanup; errors are logged and swallowed.
    pub fn spawn_cleanup(&self) {
        let this = self.clone();
        tokio::spawn(async move {
            if let Err(e) = this.cleanup_expired(Utc::now()).await {
                warn!(error = %e, "insight cache cleanup failed");
            }
        });
    }
}
