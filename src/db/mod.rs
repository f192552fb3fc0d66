//! Database module: models and schema for persistent storage.
//!
//! Layout:
//! - `models.rs`: Rust structs mirroring DB rows
//! - `schema.rs`: SQL DDL and the built-in metric catalogue
//! - `sqlite.rs`: the `Storage` handle, connection and schema setup
//! - remaining files: per-table queries as `impl Storage` blocks

pub mod models;
pub mod schema;
pub mod sqlite;

mod derived;
mod insights;
mod measurements;
mod metrics;
mod preferences;
mod profiles;

pub use measurements::MeasurementFilter;
pub use models::{
    DerivedFeature, Insight, Measurement, MetricDefinition, MetricSetting, NewInsight,
    NewMeasurement, Preferences, Profile, ReminderCandidate,
};
pub use schema::SQLITE_INIT;
pub use sqlite::{SqlitePool, Storage};
