use crate::db::models::Profile;
use crate::db::sqlite::{Storage, is_unique_violation};
use crate::error::EverwellError;
use chrono::{NaiveDate, Utc};

const PROFILE_COLUMNS: &str =
    "id, handle, display_name, email, height_cm, birth_date, created_at, updated_at";

impl Storage {
    /// Insert a new profile together with its first token digest, in one transaction.
    /// A clashing handle maps to `HandleTaken`.
    #[allow(clippy::too_many_arguments)]
    pub async fn create_profile(
        &self,
        id: &str,
        handle: &str,
        display_name: Option<String>,
        email: Option<String>,
        height_cm: Option<f64>,
        birth_date: Option<NaiveDate>,
        token_hash: &str,
    ) -> Result<Profile, EverwellError> {
        let now = Utc::now();
        let sql = format!(
            r#"INSERT INTO profiles (
                id, handle, display_name, email, height_cm, birth_date, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            RETURNING {PROFILE_COLUMNS}"#
        );
        let mut tx = self.pool.begin().await?;
        let profile = sqlx::query_as::<_, Profile>(&sql)
            .bind(id)
            .bind(handle)
            .bind(display_name)
            .bind(email)
            .bind(height_cm)
            .bind(birth_date)
            .bind(now)
            .bind(now)
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| {
                if is_unique_violation(&e) {
                    EverwellError::HandleTaken(handle.to_string())
                } else {
                    EverwellError::from(e)
                }
            })?;
        sqlx::query("INSERT INTO access_tokens (token_hash, user_id, created_at) VALUES (?, ?, ?)")
            .bind(token_hash)
            .bind(&profile.id)
            .bind(now)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(profile)
    }

    pub async fn get_profile(&self, user_id: &str) -> Result<Profile, EverwellError> {
        let sql = format!("SELECT {PROFILE_COLUMNS} FROM profiles WHERE id = ?");
        sqlx::query_as::<_, Profile>(&sql)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(EverwellError::NotFound("profile"))
    }

    /// Persist every mutable column of `profile`; `updated_at` is refreshed.
    pub async fn update_profile(&self, profile: &Profile) -> Result<Profile, EverwellError> {
        let sql = format!(
            r#"UPDATE profiles SET
                handle = ?,
                display_name = ?,
                email = ?,
                height_cm = ?,
                birth_date = ?,
                updated_at = ?
              WHERE id = ?
              RETURNING {PROFILE_COLUMNS}"#
        );
        sqlx::query_as::<_, Profile>(&sql)
            .bind(&profile.handle)
            .bind(&profile.display_name)
            .bind(&profile.email)
            .bind(profile.height_cm)
            .bind(profile.birth_date)
            .bind(Utc::now())
            .bind(&profile.id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                if is_unique_violation(&e) {
                    EverwellError::HandleTaken(profile.handle.clone())
                } else {
                    e.into()
                }
            })?
            .ok_or(EverwellError::NotFound("profile"))
    }

    pub async fn handle_exists(&self, handle: &str) -> Result<bool, EverwellError> {
        let row: Option<(i64,)> = sqlx::query_as("SELECT 1 FROM profiles WHERE handle = ?")
            .bind(handle)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.is_some())
    }

    /// Resolve a token digest to its user and record the use.
    pub async fn user_for_token(&self, token_hash: &str) -> Result<Option<String>, EverwellError> {
        let row: Option<(String,)> = sqlx::query_as(
            "UPDATE access_tokens SET last_used_at = ? WHERE token_hash = ? RETURNING user_id",
        )
        .bind(Utc::now())
        .bind(token_hash)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|r| r.0))
    }

    pub async fn delete_token(&self, token_hash: &str) -> Result<bool, EverwellError> {
        let res = sqlx::query("DELETE FROM access_tokens WHERE token_hash = ?")
            .bind(token_hash)
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected() > 0)
    }
}
