use crate::db::models::{MetricDefinition, MetricSetting};
use crate::db::sqlite::Storage;
use crate::error::EverwellError;

impl Storage {
    pub async fn list_definitions(&self) -> Result<Vec<MetricDefinition>, EverwellError> {
        let rows = sqlx::query_as::<_, MetricDefinition>(
            r#"SELECT slug, name, unit, min_value, max_value, decimals, description
               FROM metric_definitions ORDER BY position, slug"#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn get_definition(
        &self,
        slug: &str,
    ) -> Result<Option<MetricDefinition>, EverwellError> {
        let row = sqlx::query_as::<_, MetricDefinition>(
            r#"SELECT slug, name, unit, min_value, max_value, decimals, description
               FROM metric_definitions WHERE slug = ?"#,
        )
        .bind(slug)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    /// Settings rows the user has saved; metrics without a row use defaults.
    pub async fn list_settings(&self, user_id: &str) -> Result<Vec<MetricSetting>, EverwellError> {
        let rows = sqlx::query_as::<_, MetricSetting>(
            "SELECT metric_slug, enabled, target FROM user_metric_settings WHERE user_id = ?",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn upsert_setting(
        &self,
        user_id: &str,
        metric_slug: &str,
        enabled: bool,
        target: Option<f64>,
    ) -> Result<MetricSetting, EverwellError> {
        let row = sqlx::query_as::<_, MetricSetting>(
            r#"
            INSERT INTO user_metric_settings (user_id, metric_slug, enabled, target)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(user_id, metric_slug) DO UPDATE SET
                enabled=excluded.enabled,
                target=excluded.target
            RETURNING metric_slug, enabled, target
            "#,
        )
        .bind(user_id)
        .bind(metric_slug)
        .bind(enabled)
        .bind(target)
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }
}
