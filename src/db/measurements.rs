use crate::db::models::{Measurement, NewMeasurement};
use crate::db::sqlite::Storage;
use crate::error::EverwellError;
use chrono::{NaiveDate, Utc};

const MEASUREMENT_COLUMNS: &str = "id, metric_slug, date, value, note, created_at, updated_at";

const UPSERT_MEASUREMENT: &str = r#"
    INSERT INTO measurements (
        user_id, metric_slug, date, value, note, created_at, updated_at
    ) VALUES (?, ?, ?, ?, ?, ?, ?)
    ON CONFLICT(user_id, metric_slug, date) DO UPDATE SET
        value=excluded.value,
        note=excluded.note,
        updated_at=excluded.updated_at
"#;

/// Optional filters for listing measurements. `None` means unbounded.
#[derive(Debug, Clone, Default)]
pub struct MeasurementFilter {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    pub metric: Option<String>,
}

impl Storage {
    /// Insert or overwrite the value for (user, metric, date).
    pub async fn upsert_measurement(
        &self,
        user_id: &str,
        m: &NewMeasurement,
    ) -> Result<Measurement, EverwellError> {
        let now = Utc::now();
        let sql = format!("{UPSERT_MEASUREMENT} RETURNING {MEASUREMENT_COLUMNS}");
        let row = sqlx::query_as::<_, Measurement>(&sql)
            .bind(user_id)
            .bind(&m.metric_slug)
            .bind(m.date)
            .bind(m.value)
            .bind(&m.note)
            .bind(now)
            .bind(now)
            .fetch_one(&self.pool)
            .await?;
        Ok(row)
    }

    /// Batch upsert using a single transaction. Returns the number of rows written.
    pub async fn upsert_measurements(
        &self,
        user_id: &str,
        items: &[NewMeasurement],
    ) -> Result<u64, EverwellError> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;
        let mut written = 0;
        for m in items {
            let res = sqlx::query(UPSERT_MEASUREMENT)
                .bind(user_id)
                .bind(&m.metric_slug)
                .bind(m.date)
                .bind(m.value)
                .bind(&m.note)
                .bind(now)
                .bind(now)
                .execute(&mut *tx)
                .await?;
            written += res.rows_affected();
        }
        tx.commit().await?;
        Ok(written)
    }

    /// Measurements ordered by date, then metric slug.
    pub async fn list_measurements(
        &self,
        user_id: &str,
        filter: &MeasurementFilter,
    ) -> Result<Vec<Measurement>, EverwellError> {
        let sql = format!(
            r#"SELECT {MEASUREMENT_COLUMNS} FROM measurements
               WHERE user_id = ?
                 AND (? IS NULL OR date >= ?)
                 AND (? IS NULL OR date <= ?)
                 AND (? IS NULL OR metric_slug = ?)
               ORDER BY date, metric_slug"#
        );
        let rows = sqlx::query_as::<_, Measurement>(&sql)
            .bind(user_id)
            .bind(filter.from)
            .bind(filter.from)
            .bind(filter.to)
            .bind(filter.to)
            .bind(&filter.metric)
            .bind(&filter.metric)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    /// Delete one of the user's measurements, returning it when it existed.
    pub async fn delete_measurement(
        &self,
        user_id: &str,
        id: i64,
    ) -> Result<Option<Measurement>, EverwellError> {
        let sql = format!(
            "DELETE FROM measurements WHERE id = ? AND user_id = ? RETURNING {MEASUREMENT_COLUMNS}"
        );
        let row = sqlx::query_as::<_, Measurement>(&sql)
            .bind(id)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    pub async fn has_measurement_on(
        &self,
        user_id: &str,
        date: NaiveDate,
    ) -> Result<bool, EverwellError> {
        let row: Option<(i64,)> =
            sqlx::query_as("SELECT 1 FROM measurements WHERE user_id = ? AND date = ? LIMIT 1")
                .bind(user_id)
                .bind(date)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.is_some())
    }

    /// Dates on which the user logged a weight; used when height changes.
    pub async fn weight_dates(&self, user_id: &str) -> Result<Vec<NaiveDate>, EverwellError> {
        let rows: Vec<(NaiveDate,)> = sqlx::query_as(
            "SELECT date FROM measurements WHERE user_id = ? AND metric_slug = 'weight' ORDER BY date",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(|r| r.0).collect())
    }
}
