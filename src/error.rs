use axum::{Json, http::StatusCode, response::IntoResponse};
use serde::Serialize;
use sqlx::Error as SqlxError;
use thiserror::Error as ThisError;
use tracing::error;

#[derive(Debug, ThisError)]
pub enum EverwellError {
    #[error("not authenticated")]
    NotAuthenticated,

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("request body too large")]
    PayloadTooLarge,

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("handle `{0}` is already taken")]
    HandleTaken(String),

    #[error("{0} is not configured")]
    FeatureDisabled(&'static str),

    #[error("OpenAI API key is missing or rejected")]
    NoOpenAiKey,

    #[error("rate limit exceeded: {0}")]
    RateLimit(String),

    #[error("upstream request timed out")]
    Timeout,

    #[error("upstream error with status: {0}")]
    UpstreamStatus(StatusCode),

    #[error("invalid AI response: {0}")]
    InvalidAiResponse(String),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Database error: {0}")]
    DatabaseError(#[from] SqlxError),

    #[error("HTTP request error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl EverwellError {
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }

    /// Stable machine-readable reason code returned to clients.
    pub fn reason(&self) -> &'static str {
        match self {
            Self::NotAuthenticated => "not_authenticated",
            Self::InvalidInput(_) | Self::Csv(_) => "invalid_input",
            Self::PayloadTooLarge => "payload_too_large",
            Self::NotFound(_) => "not_found",
            Self::HandleTaken(_) => "handle_taken",
            Self::FeatureDisabled(_) => "feature_disabled",
            Self::NoOpenAiKey => "no_openai_key",
            Self::RateLimit(_) => "rate_limit",
            Self::Timeout => "timeout",
            Self::UpstreamStatus(_)
            | Self::InvalidAiResponse(_)
            | Self::DatabaseError(_)
            | Self::Reqwest(_)
            | Self::Json(_)
            | Self::Io(_) => "server_error",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::NotAuthenticated => StatusCode::UNAUTHORIZED,
            Self::InvalidInput(_) | Self::Csv(_) => StatusCode::BAD_REQUEST,
            Self::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::HandleTaken(_) => StatusCode::CONFLICT,
            Self::FeatureDisabled(_) | Self::NoOpenAiKey => StatusCode::SERVICE_UNAVAILABLE,
            Self::RateLimit(_) => StatusCode::TOO_MANY_REQUESTS,
            Self::Timeout => StatusCode::GATEWAY_TIMEOUT,
            Self::UpstreamStatus(_) | Self::InvalidAiResponse(_) | Self::Reqwest(_) => {
                StatusCode::BAD_GATEWAY
            }
            Self::DatabaseError(_) | Self::Json(_) | Self::Io(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn public_message(&self) -> String {
        match self {
            Self::NotAuthenticated => "Authentication required.".to_string(),
            Self::InvalidInput(msg) => msg.clone(),
            Self::Csv(e) => format!("Malformed CSV: {e}"),
            Self::PayloadTooLarge => "Request body too large.".to_string(),
            Self::NotFound(what) => format!("{what} not found."),
            Self::HandleTaken(handle) => format!("Handle `{handle}` is already taken."),
            Self::FeatureDisabled(what) => format!("{what} is not configured on this server."),
            Self::NoOpenAiKey => "AI insights are unavailable: no OpenAI API key.".to_string(),
            Self::RateLimit(msg) => msg.clone(),
            Self::Timeout => "The AI provider did not respond in time.".to_string(),
            Self::UpstreamStatus(_) | Self::InvalidAiResponse(_) | Self::Reqwest(_) => {
                "Upstream service error.".to_string()
            }
            Self::DatabaseError(_) | Self::Json(_) | Self::Io(_) => {
                "An internal server error occurred.".to_string()
            }
        }
    }
}

impl IntoResponse for EverwellError {
    fn into_response(self) -> axum::response::Response {
        let status = self.status();
        if status.is_server_error() {
            error!(status = %status, error = %self, "request failed");
        }
        let body = ApiErrorBody {
            code: self.reason().to_string(),
            message: self.public_message(),
        };
        (status, Json(ApiErrorResponse { error: body })).into_response()
    }
}

/// Standardized API error response body
#[derive(Serialize)]
pub struct ApiErrorBody {
    pub code: String,
    pub message: String,
}

#[derive(Serialize)]
pub struct ApiErrorResponse {
    pub error: ApiErrorBody,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reason_codes_match_statuses() {
        let cases = [
            (EverwellError::NotAuthenticated, "not_authenticated", 401),
            (EverwellError::invalid("bad"), "invalid_input", 400),
            (EverwellError::NoOpenAiKey, "no_openai_key", 503),
            (EverwellError::RateLimit("slow down".into()), "rate_limit", 429),
            (EverwellError::Timeout, "timeout", 504),
            (
                EverwellError::UpstreamStatus(StatusCode::INTERNAL_SERVER_ERROR),
                "server_error",
                502,
            ),
        ];
        for (err, reason, status) in cases {
            assert_eq!(err.reason(), reason);
            assert_eq!(err.status().as_u16(), status);
        }
    }

    #[test]
    fn internal_details_are_not_exposed() {
        let err = EverwellError::DatabaseError(SqlxError::RowNotFound);
        assert_eq!(err.public_message(), "An internal server error occurred.");
    }
}
