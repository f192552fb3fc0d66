pub mod csv_io;
pub mod dashboard;
pub mod derived;
pub mod insights;
pub mod metrics;
pub mod profiles;
pub mod reminders;
pub mod usage;

pub use dashboard::DashboardService;
pub use derived::DerivedService;
pub use insights::InsightsService;
pub use metrics::MetricsService;
pub use profiles::ProfileService;
pub use reminders::ReminderService;
pub use usage::InsightsUsageService;

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, Utc};

/// Wall-clock time for a user whose zone sits `offset_minutes` from UTC.
pub fn local_time(now: DateTime<Utc>, offset_minutes: i64) -> NaiveDateTime {
    now.naive_utc() + Duration::minutes(offset_minutes)
}

pub fn local_today(now: DateTime<Utc>, offset_minutes: i64) -> NaiveDate {
    local_time(now, offset_minutes).date()
}
