use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{delete, get, post, put},
};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::api::{InsightsProvider, Mailer, OpenAiInsightsProvider, ResendMailer};
use crate::config::Config;
use crate::db::Storage;
use crate::error::EverwellError;
use crate::handlers::{cron, dashboard, insights, measurements, metrics, profiles};
use crate::service::csv_io::MAX_IMPORT_BYTES;
use crate::service::{
    DashboardService, DerivedService, InsightsService, InsightsUsageService, MetricsService,
    ProfileService, ReminderService,
};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub storage: Storage,
    pub profiles: ProfileService,
    pub metrics: MetricsService,
    pub dashboard: DashboardService,
    pub derived: DerivedService,
    pub insights: InsightsService,
    pub reminders: ReminderService,
}

impl AppState {
    /// Wire services around explicit collaborators; `None` disables the feature.
    pub fn build(
        config: Arc<Config>,
        storage: Storage,
        provider: Option<Arc<dyn InsightsProvider>>,
        mailer: Option<Arc<dyn Mailer>>,
    ) -> Self {
        let derived = DerivedService::new(storage.clone());
        let metrics = MetricsService::new(storage.clone(), derived.clone());
        let dashboard = DashboardService::new(metrics.clone());
        let usage = InsightsUsageService::new(
            storage.clone(),
            config.insights_daily_limit,
            config.insights_cache_ttl_hours,
        );
        let insights = InsightsService::new(
            storage.clone(),
            dashboard.clone(),
            usage,
            provider,
            config.insights_burst_per_minute,
        );
        let reminders = ReminderService::new(storage.clone(), mailer, config.app_url.clone());
        Self {
            profiles: ProfileService::new(storage.clone(), derived.clone()),
            metrics,
            dashboard,
            derived,
            insights,
            reminders,
            storage,
            config,
        }
    }

    /// Build the real OpenAI and email clients for whichever keys are configured.
    pub fn from_config(config: Arc<Config>, storage: Storage) -> Result<Self, EverwellError> {
        let provider: Option<Arc<dyn InsightsProvider>> = match config.openai_api_key() {
            Some(key) => Some(Arc::new(OpenAiInsightsProvider::new(
                key,
                config.openai_base_url.clone(),
                config.openai_model.clone(),
                Duration::from_secs(config.ai_timeout_secs),
                config.proxy.as_ref(),
            )?)),
            None => None,
        };
        let mailer: Option<Arc<dyn Mailer>> = match config.email_api_key() {
            Some(key) => Some(Arc::new(ResendMailer::new(
                key,
                config.email_base_url.clone(),
                config.email_from.clone(),
                config.proxy.as_ref(),
            )?)),
            None => None,
        };
        info!(
            insights = provider.is_some(),
            reminders = mailer.is_some(),
            cron = config.cron_enabled(),
            "optional features"
        );
        Ok(Self::build(config, storage, provider, mailer))
    }
}

pub fn everwell_router(state: AppState) -> Router {
    let import = Router::new()
        .route(
            "/api/measurements/import",
            post(measurements::import_measurements),
        )
        .layer(DefaultBodyLimit::max(MAX_IMPORT_BYTES));

    Router::new()
        // Profiles and session
        .route("/api/profiles", post(profiles::create_profile))
        .route(
            "/api/profile",
            get(profiles::get_profile).patch(profiles::update_profile),
        )
        .route("/api/auth/logout", post(profiles::logout))
        .route(
            "/api/handles/availability",
            get(profiles::handle_availability),
        )
        // Metric catalogue
        .route("/api/metrics/definitions", get(metrics::list_definitions))
        .route("/api/metrics/settings", get(metrics::list_settings))
        .route("/api/metrics/settings/{slug}", put(metrics::update_setting))
        // Measurements
        .route(
            "/api/measurements",
            get(measurements::list_measurements).post(measurements::record_measurement),
        )
        .route(
            "/api/measurements/export",
            get(measurements::export_measurements),
        )
        .route("/api/measurements/{id}", delete(measurements::delete_measurement))
        .merge(import)
        // Aggregates
        .route("/api/dashboard", get(dashboard::dashboard))
        .route("/api/derived", get(dashboard::derived_features))
        .route(
            "/api/preferences",
            get(dashboard::get_preferences).put(dashboard::put_preferences),
        )
        // Insights
        .route(
            "/api/insights",
            get(insights::list_insights).post(insights::generate_insight),
        )
        .route("/api/insights/usage", get(insights::insights_usage))
        .route("/api/insights/{id}", get(insights::get_insight))
        // Scheduler hooks
        .route("/api/cron/reminders", post(cron::send_reminders))
        .route("/api/cron/cleanup", post(cron::cleanup_cache))
        .route("/healthz", get(cron::healthz))
        .with_state(state)
}
