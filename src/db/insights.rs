use crate::db::models::{DbInsight, Insight, NewInsight};
use crate::db::sqlite::Storage;
use crate::error::EverwellError;
use chrono::{DateTime, NaiveDate, Utc};

const INSIGHT_COLUMNS: &str =
    "id, user_id, kind, period_start, period_end, summary, recommendations, model, created_at";

impl Storage {
    pub async fn insert_insight(&self, new: &NewInsight) -> Result<Insight, EverwellError> {
        let recommendations = serde_json::to_string(&new.recommendations)?;
        let sql = format!(
            r#"INSERT INTO ai_insights (
                user_id, kind, period_start, period_end, summary, recommendations, model, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            RETURNING {INSIGHT_COLUMNS}"#
        );
        let row = sqlx::query_as::<_, DbInsight>(&sql)
            .bind(&new.user_id)
            .bind(&new.kind)
            .bind(new.period_start)
            .bind(new.period_end)
            .bind(&new.summary)
            .bind(recommendations)
            .bind(&new.model)
            .bind(Utc::now())
            .fetch_one(&self.pool)
            .await?;
        row.try_into()
    }

    /// Most recent insights first.
    pub async fn list_insights(
        &self,
        user_id: &str,
        limit: u32,
    ) -> Result<Vec<Insight>, EverwellError> {
        let sql = format!(
            "SELECT {INSIGHT_COLUMNS} FROM ai_insights WHERE user_id = ? ORDER BY id DESC LIMIT ?"
        );
        let rows = sqlx::query_as::<_, DbInsight>(&sql)
            .bind(user_id)
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(Insight::try_from).collect()
    }

    pub async fn get_insight(&self, user_id: &str, id: i64) -> Result<Insight, EverwellError> {
        let sql = format!("SELECT {INSIGHT_COLUMNS} FROM ai_insights WHERE id = ? AND user_id = ?");
        sqlx::query_as::<_, DbInsight>(&sql)
            .bind(id)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(EverwellError::NotFound("insight"))?
            .try_into()
    }

    pub async fn usage_for_day(&self, user_id: &str, day: NaiveDate) -> Result<u32, EverwellError> {
        let row: Option<(i64,)> =
            sqlx::query_as("SELECT count FROM insights_usage WHERE user_id = ? AND day = ?")
                .bind(user_id)
                .bind(day)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(|r| r.0.max(0) as u32).unwrap_or(0))
    }

    /// Atomically take one unit of the day's quota.
    ///
    /// Returns the new count, or `None` when the user already reached `limit`.
    pub async fn try_reserve_usage(
        &self,
        user_id: &str,
        day: NaiveDate,
        limit: u32,
    ) -> Result<Option<u32>, EverwellError> {
        if limit == 0 {
            return Ok(None);
        }
        let row: Option<(i64,)> = sqlx::query_as(
            r#"
            INSERT INTO insights_usage (user_id, day, count) VALUES (?, ?, 1)
            ON CONFLICT(user_id, day) DO UPDATE SET count = insights_usage.count + 1
            WHERE insights_usage.count < ?
            RETURNING count
            "#,
        )
        .bind(user_id)
        .bind(day)
        .bind(limit as i64)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|r| r.0 as u32))
    }

    /// Give back a unit reserved by `try_reserve_usage` after a failed call.
    pub async fn release_usage(&self, user_id: &str, day: NaiveDate) -> Result<(), EverwellError> {
        sqlx::query(
            "UPDATE insights_usage SET count = count - 1 WHERE user_id = ? AND day = ? AND count > 0",
        )
        .bind(user_id)
        .bind(day)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Cached insight for `cache_key`, ignoring entries expired at `now`.
    pub async fn get_cached_insight(
        &self,
        user_id: &str,
        cache_key: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<Insight>, EverwellError> {
        let row = sqlx::query_as::<_, DbInsight>(
            r#"SELECT i.id, i.user_id, i.kind, i.period_start, i.period_end, i.summary,
                      i.recommendations, i.model, i.created_at
               FROM insights_cache c
               JOIN ai_insights i ON i.id = c.insight_id
               WHERE c.cache_key = ? AND c.user_id = ? AND c.expires_at > ?"#,
        )
        .bind(cache_key)
        .bind(user_id)
        .bind(now.timestamp())
        .fetch_optional(&self.pool)
        .await?;
        row.map(Insight::try_from).transpose()
    }

    pub async fn put_cache(
        &self,
        cache_key: &str,
        user_id: &str,
        insight_id: i64,
        expires_at: DateTime<Utc>,
    ) -> Result<(), EverwellError> {
        sqlx::query(
            r#"
            INSERT INTO insights_cache (cache_key, user_id, insight_id, created_at, expires_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(cache_key) DO UPDATE SET
                user_id=excluded.user_id,
                insight_id=excluded.insight_id,
                created_at=excluded.created_at,
                expires_at=excluded.expires_at
            "#,
        )
        .bind(cache_key)
        .bind(user_id)
        .bind(insight_id)
        .bind(Utc::now())
        .bind(expires_at.timestamp())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Remove cache rows expired at `now`. Returns the number deleted.
    pub async fn delete_expired_cache(&self, now: DateTime<Utc>) -> Result<u64, EverwellError> {
        let res = sqlx::query("DELETE FROM insights_cache WHERE expires_at <= ?")
            .bind(now.timestamp())
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected())
    }
}
