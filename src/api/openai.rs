use crate::api::{build_http_client, endpoint};
use crate::error::EverwellError;
use crate::types::{InsightDraft, InsightRequest};
use async_trait::async_trait;
use axum::http::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

/// Generates insight drafts from an aggregated metrics payload.
#[async_trait]
pub trait InsightsProvider: Send + Sync {
    /// Model identifier recorded alongside stored insights.
    fn model(&self) -> &str;

    async fn generate(&self, request: &InsightRequest) -> Result<InsightDraft, EverwellError>;
}

/// OpenAI chat-completions client using structured (JSON schema) output.
pub struct OpenAiInsightsProvider {
    client: reqwest::Client,
    api_key: String,
    base_url: Url,
    model: String,
}

impl OpenAiInsightsProvider {
    pub fn new(
        api_key: impl Into<String>,
        base_url: Url,
        model: impl Into<String>,
        timeout: Duration,
        proxy: Option<&Url>,
    ) -> Result<Self, EverwellError> {
        Ok(Self {
            client: build_http_client(proxy, timeout)?,
            api_key: api_key.into(),
            base_url,
            model: model.into(),
        })
    }

    fn build_body(&self, request: &InsightRequest) -> Result<Value, EverwellError> {
        let user_content = serde_json::to_string(&request.payload)?;
        Ok(json!({
            "model": self.model,
            "temperature": 0.4,
            "messages": [
                { "role": "system", "content": request.kind.system_prompt() },
                { "role": "user", "content": user_content }
            ],
            "response_format": {
                "type": "json_schema",
                "json_schema": {
                    "name": "everwell_insight",
                    "strict": true,
                    "schema": InsightDraft::json_schema()
                }
            }
        }))
    }
}

#[async_trait]
impl InsightsProvider for OpenAiInsightsProvider {
    fn model(&self) -> &str {
        &self.model
    }

    async fn generate(&self, request: &InsightRequest) -> Result<InsightDraft, EverwellError> {
        let url = endpoint(&self.base_url, "chat/completions");
        let body = self.build_body(request)?;

        let resp = self
            .client
            .post(url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(map_send_error)?;

        let status = resp.status();
        if !status.is_success() {
            warn!(status = %status, kind = request.kind.as_str(), "OpenAI request rejected");
            return Err(match status {
                StatusCode::TOO_MANY_REQUESTS => {
                    EverwellError::RateLimit("The AI provider is rate limiting requests.".into())
                }
                StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => EverwellError::NoOpenAiKey,
                other => EverwellError::UpstreamStatus(other),
            });
        }

        let completion: ChatCompletionResponse = resp.json().await.map_err(map_send_error)?;
        debug!(model = ?completion.model, "OpenAI completion received");
        parse_completion(completion)?.validate()
    }
}

fn map_send_error(e: reqwest::Error) -> EverwellError {
    if e.is_timeout() {
        EverwellError::Timeout
    } else {
        EverwellError::Reqwest(e)
    }
}

fn parse_completion(completion: ChatCompletionResponse) -> Result<InsightDraft, EverwellError> {
    let message = completion
        .choices
        .into_iter()
        .next()
        .map(|c| c.message)
        .ok_or_else(|| EverwellError::InvalidAiResponse("no choices returned".into()))?;

    if let Some(refusal) = message.refusal {
        return Err(EverwellError::InvalidAiResponse(format!(
            "model refused: {refusal}"
        )));
    }
    let content = message
        .content
        .ok_or_else(|| EverwellError::InvalidAiResponse("empty message content".into()))?;
    serde_json::from_str::<InsightDraft>(&content)
        .map_err(|e| EverwellError::InvalidAiResponse(format!("content does not match schema: {e}")))
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    model: Option<String>,
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    refusal: Option<String>,
}
