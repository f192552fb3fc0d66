use crate::db::{Profile, Storage};
use crate::error::EverwellError;
use crate::middleware::auth::{hash_token, issue_token};
use crate::service::derived::DerivedService;
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use tracing::info;
use uuid::Uuid;

pub const HANDLE_MIN_LEN: usize = 3;
pub const HANDLE_MAX_LEN: usize = 24;
pub const RESERVED_HANDLES: &[&str] = &[
    "admin", "api", "everwell", "support", "help", "settings", "login", "logout", "signup",
    "root", "me",
];
const DISPLAY_NAME_MAX_CHARS: usize = 80;
const HEIGHT_RANGE_CM: (f64, f64) = (50.0, 272.0);

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum HandleRejection {
    InvalidFormat,
    Reserved,
    Taken,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct HandleAvailability {
    pub handle: String,
    pub available: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<HandleRejection>,
}

pub fn normalize_handle(raw: &str) -> String {
    raw.trim().to_ascii_lowercase()
}

/// Check an already-normalized handle against format and reserved-name rules.
pub fn check_handle_format(handle: &str) -> Result<(), HandleRejection> {
    let len = handle.chars().count();
    let starts_with_letter = handle.chars().next().is_some_and(|c| c.is_ascii_lowercase());
    let charset_ok = handle
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_');
    if !(HANDLE_MIN_LEN..=HANDLE_MAX_LEN).contains(&len) || !starts_with_letter || !charset_ok {
        return Err(HandleRejection::InvalidFormat);
    }
    if RESERVED_HANDLES.contains(&handle) {
        return Err(HandleRejection::Reserved);
    }
    Ok(())
}

fn validate_handle(raw: &str) -> Result<String, EverwellError> {
    let handle = normalize_handle(raw);
    match check_handle_format(&handle) {
        Ok(()) => Ok(handle),
        Err(HandleRejection::Reserved) => Err(EverwellError::invalid(format!(
            "handle `{handle}` is reserved"
        ))),
        Err(_) => Err(EverwellError::invalid(format!(
            "handle must be {HANDLE_MIN_LEN}-{HANDLE_MAX_LEN} characters of a-z, 0-9 or _, starting with a letter"
        ))),
    }
}

fn validate_display_name(name: Option<String>) -> Result<Option<String>, EverwellError> {
    let name = name.map(|n| n.trim().to_string()).filter(|n| !n.is_empty());
    if name
        .as_ref()
        .is_some_and(|n| n.chars().count() > DISPLAY_NAME_MAX_CHARS)
    {
        return Err(EverwellError::invalid(format!(
            "display_name must be at most {DISPLAY_NAME_MAX_CHARS} characters"
        )));
    }
    Ok(name)
}

fn validate_email(email: Option<String>) -> Result<Option<String>, EverwellError> {
    let email = email.map(|e| e.trim().to_string()).filter(|e| !e.is_empty());
    if let Some(e) = email.as_deref() {
        let valid = match e.split_once('@') {
            Some((local, domain)) => {
                !local.is_empty() && !domain.is_empty() && !domain.contains('@')
            }
            None => false,
        };
        if !valid {
            return Err(EverwellError::invalid("email is not a valid address"));
        }
    }
    Ok(email)
}

fn validate_height(height_cm: Option<f64>) -> Result<Option<f64>, EverwellError> {
    if let Some(h) = height_cm {
        let (min, max) = HEIGHT_RANGE_CM;
        if !h.is_finite() || h < min || h > max {
            return Err(EverwellError::invalid(format!(
                "height_cm must be between {min} and {max}"
            )));
        }
    }
    Ok(height_cm)
}

fn validate_birth_date(
    birth_date: Option<NaiveDate>,
    today: NaiveDate,
) -> Result<Option<NaiveDate>, EverwellError> {
    if let Some(d) = birth_date {
        let earliest = NaiveDate::from_ymd_opt(1900, 1, 1).unwrap_or(NaiveDate::MIN);
        if d < earliest || d > today {
            return Err(EverwellError::invalid(
                "birth_date must be between 1900-01-01 and today",
            ));
        }
    }
    Ok(birth_date)
}

/// Distinguishes "field absent" (`None`) from "field set to null" (`Some(None)`).
fn double_option<'de, D, T>(d: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(d).map(Some)
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateProfile {
    pub handle: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub height_cm: Option<f64>,
    #[serde(default)]
    pub birth_date: Option<NaiveDate>,
}

/// Partial update; absent fields are left unchanged, `null` clears.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProfilePatch {
    #[serde(default)]
    pub handle: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    pub display_name: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub email: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub height_cm: Option<Option<f64>>,
    #[serde(default, deserialize_with = "double_option")]
    pub birth_date: Option<Option<NaiveDate>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CreatedProfile {
    pub profile: Profile,
    pub token: String,
}

#[derive(Clone)]
pub struct ProfileService {
    storage: Storage,
    derived: DerivedService,
}

impl ProfileService {
    pub fn new(storage: Storage, derived: DerivedService) -> Self {
        Self { storage, derived }
    }

    pub async fn availability(&self, raw: &str) -> Result<HandleAvailability, EverwellError> {
        let handle = normalize_handle(raw);
        let reason = match check_handle_format(&handle) {
            Err(rejection) => Some(rejection),
            Ok(()) if self.storage.handle_exists(&handle).await? => Some(HandleRejection::Taken),
            Ok(()) => None,
        };
        Ok(HandleAvailability {
            handle,
            available: reason.is_none(),
            reason,
        })
    }

    /// Create a profile and issue its first access token.
    pub async fn create(&self, input: CreateProfile) -> Result<CreatedProfile, EverwellError> {
        let today = Utc::now().date_naive();
        let handle = validate_handle(&input.handle)?;
        let display_name = validate_display_name(input.display_name)?;
        let email = validate_email(input.email)?;
        let height_cm = validate_height(input.height_cm)?;
        let birth_date = validate_birth_date(input.birth_date, today)?;

        let id = Uuid::new_v4().to_string();
        let token = issue_token();
        let profile = self
            .storage
            .create_profile(
                &id,
                &handle,
                display_name,
                email,
                height_cm,
                birth_date,
                &hash_token(&token),
            )
            .await?;
        info!(user_id = %profile.id, handle = %profile.handle, "profile created");
        Ok(CreatedProfile { profile, token })
    }

    pub async fn get(&self, user_id: &str) -> Result<Profile, EverwellError> {
        self.storage.get_profile(user_id).await
    }

    pub async fn update(&self, user_id: &str, patch: ProfilePatch) -> Result<Profile, EverwellError> {
        let today = Utc::now().date_naive();
        let mut profile = self.storage.get_profile(user_id).await?;
        let previous_height = profile.height_cm;

        if let Some(handle) = patch.handle {
            profile.handle = validate_handle(&handle)?;
        }
        if let Some(display_name) = patch.display_name {
            profile.display_name = validate_display_name(display_name)?;
        }
        if let Some(email) = patch.email {
            profile.email = validate_email(email)?;
        }
        if let Some(height_cm) = patch.height_cm {
            profile.height_cm = validate_height(height_cm)?;
        }
        if let Some(birth_date) = patch.birth_date {
            profile.birth_date = validate_birth_date(birth_date, today)?;
        }

        let updated = self.storage.update_profile(&profile).await?;
        if updated.height_cm != previous_height {
            let dates = self.storage.weight_dates(user_id).await?;
            self.derived.recompute(user_id, &dates).await?;
        }
        Ok(updated)
    }

    pub async fn logout(&self, token_hash: &str) -> Result<(), EverwellError> {
        self.storage.delete_token(token_hash).await?;
        Ok(())
    }
}
