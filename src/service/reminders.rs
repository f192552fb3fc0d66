use crate::api::{Mailer, OutgoingEmail};
use crate::db::{ReminderCandidate, Storage};
use crate::error::EverwellError;
use crate::service::local_time;
use chrono::{DateTime, NaiveDate, Timelike, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};
use url::Url;

#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq, Eq)]
pub struct ReminderReport {
    pub candidates: usize,
    pub sent: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// The local date a reminder is due for, if the user's reminder hour has
/// passed and they were not reminded on that date yet.
pub fn reminder_due(candidate: &ReminderCandidate, now: DateTime<Utc>) -> Option<NaiveDate> {
    let local = local_time(now, candidate.utc_offset_minutes);
    let date = local.date();
    if i64::from(local.hour()) < candidate.reminder_hour {
        return None;
    }
    if candidate.last_reminder_date == Some(date) {
        return None;
    }
    Some(date)
}

fn compose(candidate: &ReminderCandidate, app_url: &Url) -> OutgoingEmail {
    let name = candidate
        .display_name
        .as_deref()
        .filter(|n| !n.trim().is_empty())
        .unwrap_or(&candidate.handle);
    OutgoingEmail {
        to: candidate.email.clone(),
        subject: "Don't forget to log today".to_string(),
        text: format!(
            "Hi {name},\n\nYou haven't logged any measurements today. \
             A quick entry keeps your streak going: {app_url}\n\n\
             You can turn these reminders off in your preferences.\n\n- EverWell"
        ),
    }
}

/// Daily "nothing logged yet" email nudges, driven by the cron endpoint.
#[derive(Clone)]
pub struct ReminderService {
    storage: Storage,
    mailer: Option<Arc<dyn Mailer>>,
    app_url: Url,
}

impl ReminderService {
    pub fn new(storage: Storage, mailer: Option<Arc<dyn Mailer>>, app_url: Url) -> Self {
        Self {
            storage,
            mailer,
            app_url,
        }
    }

    pub async fn run(&self, now: DateTime<Utc>) -> Result<ReminderReport, EverwellError> {
        let mailer = self
            .mailer
            .clone()
            .ok_or(EverwellError::FeatureDisabled("RESEND_API_KEY"))?;

        let candidates = self.storage.list_reminder_candidates().await?;
        let mut report = ReminderReport {
            candidates: candidates.len(),
            ..Default::default()
        };

        for candidate in &candidates {
            let Some(date) = reminder_due(candidate, now) else {
                report.skipped += 1;
                continue;
            };
            if self
                .storage
                .has_measurement_on(&candidate.user_id, date)
                .await?
            {
                report.skipped += 1;
                continue;
            }

            match mailer.send(&compose(candidate, &self.app_url)).await {
                Ok(()) => {
                    self.storage.mark_reminded(&candidate.user_id, date).await?;
                    report.sent += 1;
                }
                Err(e) => {
                    warn!(user_id = %candidate.user_id, error = %e, "reminder email failed");
                    report.failed += 1;
                }
            }
        }

        info!(
            candidates = report.candidates,
            sent = report.sent,
            skipped = report.skipped,
            failed = report.failed,
            "reminder run finished"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn candidate(offset: i64, hour: i64, last: Option<NaiveDate>) -> ReminderCandidate {
        ReminderCandidate {
            user_id: "u1".into(),
            handle: "ada".into(),
            display_name: None,
            email: "ada@example.com".into(),
            utc_offset_minutes: offset,
            reminder_hour: hour,
            last_reminder_date: last,
        }
    }

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 16, h, m, 0).unwrap()
    }

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn due_once_local_hour_passes() {
        assert_eq!(reminder_due(&candidate(0, 20, None), at(19, 59)), None);
        assert_eq!(
            reminder_due(&candidate(0, 20, None), at(20, 0)),
            Some(d(2026, 10, 16))
        );
    }

    #[test]
    fn offset_shifts_local_date() {
        // 23:30 UTC is already the 17th at UTC+2
        assert_eq!(
            reminder_due(&candidate(120, 1, None), at(23, 30)),
            Some(d(2026, 10, 17))
        );
        // 02:00 UTC is still the 15th at UTC-5
        assert_eq!(
            reminder_due(&candidate(-300, 20, None), at(2, 0)),
            Some(d(2026, 10, 15))
        );
    }

    #[test]
    fn not_due_twice_on_same_local_date() {
        let c = candidate(0, 8, Some(d(2026, 10, 16)));
        assert_eq!(reminder_due(&c, at(21, 0)), None);
        let c = candidate(0, 8, Some(d(2026, 10, 15)));
        assert_eq!(reminder_due(&c, at(21, 0)), Some(d(2026, 10, 16)));
    }

    #[test]
    fn email_greets_by_display_name_or_handle() {
        let app = Url::parse("https://everwell.app/").unwrap();
        let mut c = candidate(0, 20, None);
        assert!(compose(&c, &app).text.starts_with("Hi ada,"));
        c.display_name = Some("Ada L".into());
        let email = compose(&c, &app);
        assert!(email.text.starts_with("Hi Ada L,"));
        assert!(email.text.contains("https://everwell.app/"));
        assert_eq!(email.to, "ada@example.com");
    }
}
