use figment::{
    Figment,
    providers::{Env, Serialized},
};
use serde::{Deserialize, Serialize};
use std::fmt;
use url::Url;

/// Runtime configuration.
///
/// Sources, lowest precedence first:
/// - built-in defaults
/// - the conventional unprefixed secrets (`OPENAI_API_KEY`, `CRON_SECRET`, `RESEND_API_KEY`)
/// - `EVERWELL_*` environment variables (e.g. `EVERWELL_DATABASE_URL`)
#[derive(Clone, Serialize, Deserialize)]
pub struct Config {
    pub listen_addr: String,
    pub database_url: String,
    pub loglevel: String,
    pub proxy: Option<Url>,

    pub openai_api_key: Option<String>,
    pub openai_base_url: Url,
    pub openai_model: String,
    pub ai_timeout_secs: u64,
    pub insights_daily_limit: u32,
    pub insights_burst_per_minute: u32,
    pub insights_cache_ttl_hours: i64,

    pub cron_secret: Option<String>,

    pub email_api_key: Option<String>,
    pub email_base_url: Url,
    pub email_from: String,
    pub app_url: Url,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:8000".to_string(),
            database_url: "sqlite:data/everwell.db".to_string(),
            loglevel: "info".to_string(),
            proxy: None,
            openai_api_key: None,
            openai_base_url: Url::parse("https://api.openai.com/v1/")
                .expect("static OpenAI base url is valid"),
            openai_model: "gpt-4o-mini".to_string(),
            ai_timeout_secs: 20,
            insights_daily_limit: 5,
            insights_burst_per_minute: 3,
            insights_cache_ttl_hours: 24,
            cron_secret: None,
            email_api_key: None,
            email_base_url: Url::parse("https://api.resend.com/")
                .expect("static email base url is valid"),
            email_from: "EverWell <reminders@everwell.app>".to_string(),
            app_url: Url::parse("http://localhost:8000/").expect("static app url is valid"),
        }
    }
}

impl Config {
    /// Load configuration from defaults and the process environment.
    pub fn from_env() -> Result<Self, figment::Error> {
        Figment::from(Serialized::defaults(Config::default()))
            .merge(Env::raw().only(&["OPENAI_API_KEY", "CRON_SECRET"]))
            .merge(
                Env::raw()
                    .only(&["RESEND_API_KEY"])
                    .map(|_| "email_api_key".into()),
            )
            .merge(Env::prefixed("EVERWELL_"))
            .extract()
    }

    pub fn openai_api_key(&self) -> Option<&str> {
        non_empty(self.openai_api_key.as_deref())
    }

    pub fn email_api_key(&self) -> Option<&str> {
        non_empty(self.email_api_key.as_deref())
    }

    pub fn cron_secret(&self) -> Option<&str> {
        non_empty(self.cron_secret.as_deref())
    }

    pub fn insights_enabled(&self) -> bool {
        self.openai_api_key().is_some()
    }

    pub fn email_enabled(&self) -> bool {
        self.email_api_key().is_some()
    }

    pub fn cron_enabled(&self) -> bool {
        self.cron_secret().is_some()
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

fn redact(value: Option<&str>) -> &'static str {
    if non_empty(value).is_some() {
        "<redacted>"
    } else {
        "<unset>"
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("listen_addr", &self.listen_addr)
            .field("database_url", &self.database_url)
            .field("loglevel", &self.loglevel)
            .field("proxy", &self.proxy.as_ref().map(Url::as_str))
            .field("openai_api_key", &redact(self.openai_api_key.as_deref()))
            .field("openai_base_url", &self.openai_base_url.as_str())
            .field("openai_model", &self.openai_model)
            .field("ai_timeout_secs", &self.ai_timeout_secs)
            .field("insights_daily_limit", &self.insights_daily_limit)
            .field("insights_burst_per_minute", &self.insights_burst_per_minute)
            .field("insights_cache_ttl_hours", &self.insights_cache_ttl_hours)
            .field("cron_secret", &redact(self.cron_secret.as_deref()))
            .field("email_api_key", &redact(self.email_api_key.as_deref()))
            .field("email_base_url", &self.email_base_url.as_str())
            .field("email_from", &self.email_from)
            .field("app_url", &self.app_url.as_str())
            .finish()
    }
}
