pub mod insights;

pub use insights::{InsightDraft, InsightKind, InsightRequest};
