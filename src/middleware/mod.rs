pub mod auth;
pub mod extract;

pub use auth::{AuthUser, CronAuth};
pub use extract::{ApiJson, ApiPath, ApiQuery, TextBody};
