use crate::db::models::DerivedFeature;
use crate::db::sqlite::Storage;
use crate::error::EverwellError;
use chrono::{NaiveDate, Utc};

impl Storage {
    /// Atomically replace every feature for `user_id` dated within `[from, to]`.
    pub async fn replace_derived_features(
        &self,
        user_id: &str,
        from: NaiveDate,
        to: NaiveDate,
        rows: &[(NaiveDate, String, f64)],
    ) -> Result<(), EverwellError> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM derived_features WHERE user_id = ? AND date >= ? AND date <= ?")
            .bind(user_id)
            .bind(from)
            .bind(to)
            .execute(&mut *tx)
            .await?;
        for (date, feature, value) in rows {
            sqlx::query(
                r#"INSERT INTO derived_features (user_id, date, feature, value, computed_at)
                   VALUES (?, ?, ?, ?, ?)"#,
            )
            .bind(user_id)
            .bind(*date)
            .bind(feature)
            .bind(*value)
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    pub async fn list_derived_features(
        &self,
        user_id: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<DerivedFeature>, EverwellError> {
        let rows = sqlx::query_as::<_, DerivedFeature>(
            r#"SELECT date, feature, value, computed_at FROM derived_features
               WHERE user_id = ? AND date >= ? AND date <= ?
               ORDER BY date, feature"#,
        )
        .bind(user_id)
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}
