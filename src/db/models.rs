use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::error::EverwellError;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, FromRow)]
pub struct Profile {
    pub id: String,
    pub handle: String,
    pub display_name: Option<String>,
    pub email: Option<String>,
    pub height_cm: Option<f64>,
    pub birth_date: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, FromRow)]
pub struct MetricDefinition {
    pub slug: String,
    pub name: String,
    pub unit: String,
    pub min_value: f64,
    pub max_value: f64,
    pub decimals: i64,
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, FromRow)]
pub struct MetricSetting {
    pub metric_slug: String,
    pub enabled: bool,
    pub target: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, FromRow)]
pub struct Measurement {
    pub id: i64,
    pub metric_slug: String,
    pub date: NaiveDate,
    pub value: f64,
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A validated measurement ready to be written.
#[derive(Debug, Clone, PartialEq)]
pub struct NewMeasurement {
    pub metric_slug: String,
    pub date: NaiveDate,
    pub value: f64,
    pub note: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, FromRow)]
pub struct Preferences {
    pub utc_offset_minutes: i64,
    pub reminders_enabled: bool,
    pub reminder_hour: i64,
    pub last_reminder_date: Option<NaiveDate>,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            utc_offset_minutes: 0,
            reminders_enabled: false,
            reminder_hour: 20,
            last_reminder_date: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct ReminderCandidate {
    pub user_id: String,
    pub handle: String,
    pub display_name: Option<String>,
    pub email: String,
    pub utc_offset_minutes: i64,
    pub reminder_hour: i64,
    pub last_reminder_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, FromRow)]
pub struct DerivedFeature {
    pub date: NaiveDate,
    pub feature: String,
    pub value: f64,
    pub computed_at: DateTime<Utc>,
}

/// Raw `ai_insights` row; `recommendations` is a JSON array stored as text.
#[derive(Debug, Clone, FromRow)]
pub struct DbInsight {
    pub id: i64,
    pub user_id: String,
    pub kind: String,
    pub period_start: NaiveDate,
    pub period_end: NaiveDate,
    pub summary: String,
    pub recommendations: String,
    pub model: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Insight {
    pub id: i64,
    pub kind: String,
    pub period_start: NaiveDate,
    pub period_end: NaiveDate,
    pub summary: String,
    pub recommendations: Vec<String>,
    pub model: String,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<DbInsight> for Insight {
    type Error = EverwellError;

    fn try_from(d: DbInsight) -> Result<Self, Self::Error> {
        Ok(Insight {
            id: d.id,
            kind: d.kind,
            period_start: d.period_start,
            period_end: d.period_end,
            summary: d.summary,
            recommendations: serde_json::from_str(&d.recommendations)?,
            model: d.model,
            created_at: d.created_at,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewInsight {
    pub user_id: String,
    pub kind: String,
    pub period_start: NaiveDate,
    pub period_end: NaiveDate,
    pub summary: String,
    pub recommendations: Vec<String>,
    pub model: String,
}
