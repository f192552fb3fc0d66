use crate::db::models::{Preferences, ReminderCandidate};
use crate::db::sqlite::Storage;
use crate::error::EverwellError;
use chrono::{NaiveDate, Utc};

impl Storage {
    /// The user's preferences, or defaults when none were saved yet.
    pub async fn get_preferences(&self, user_id: &str) -> Result<Preferences, EverwellError> {
        let row = sqlx::query_as::<_, Preferences>(
            r#"SELECT utc_offset_minutes, reminders_enabled, reminder_hour, last_reminder_date
               FROM user_preferences WHERE user_id = ?"#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.unwrap_or_default())
    }

    pub async fn upsert_preferences(
        &self,
        user_id: &str,
        utc_offset_minutes: i64,
        reminders_enabled: bool,
        reminder_hour: i64,
    ) -> Result<Preferences, EverwellError> {
        let row = sqlx::query_as::<_, Preferences>(
            r#"
            INSERT INTO user_preferences (
                user_id, utc_offset_minutes, reminders_enabled, reminder_hour, updated_at
            ) VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(user_id) DO UPDATE SET
                utc_offset_minutes=excluded.utc_offset_minutes,
                reminders_enabled=excluded.reminders_enabled,
                reminder_hour=excluded.reminder_hour,
                updated_at=excluded.updated_at
            RETURNING utc_offset_minutes, reminders_enabled, reminder_hour, last_reminder_date
            "#,
        )
        .bind(user_id)
        .bind(utc_offset_minutes)
        .bind(reminders_enabled)
        .bind(reminder_hour)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }

    /// Users who opted into reminders and have an email address on file.
    pub async fn list_reminder_candidates(&self) -> Result<Vec<ReminderCandidate>, EverwellError> {
        let rows = sqlx::query_as::<_, ReminderCandidate>(
            r#"SELECT p.id AS user_id, p.handle, p.display_name, p.email,
                      u.utc_offset_minutes, u.reminder_hour, u.last_reminder_date
               FROM user_preferences u
               JOIN profiles p ON p.id = u.user_id
               WHERE u.reminders_enabled = 1 AND p.email IS NOT NULL AND p.email <> ''
               ORDER BY p.id"#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn mark_reminded(&self, user_id: &str, date: NaiveDate) -> Result<(), EverwellError> {
        sqlx::query("UPDATE user_preferences SET last_reminder_date = ? WHERE user_id = ?")
            .bind(date)
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
