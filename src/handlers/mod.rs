pub mod cron;
pub mod dashboard;
pub mod insights;
pub mod measurements;
pub mod metrics;
pub mod profiles;

use chrono::{NaiveDate, Utc};

use crate::error::EverwellError;
use crate::router::AppState;
use crate::service::local_today;

/// Today's date in the user's saved UTC offset.
pub(crate) async fn user_today(state: &AppState, user_id: &str) -> Result<NaiveDate, EverwellError> {
    let prefs = state.storage.get_preferences(user_id).await?;
    Ok(local_today(Utc::now(), prefs.utc_offset_minutes))
}
