use crate::api::{build_http_client, endpoint};
use crate::error::EverwellError;
use async_trait::async_trait;
use serde::Serialize;
use serde_json::json;
use std::time::Duration;
use url::Url;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutgoingEmail {
    pub to: String,
    pub subject: String,
    pub text: String,
}

/// Sends transactional email.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, email: &OutgoingEmail) -> Result<(), EverwellError>;
}

/// Client for a Resend-style `POST /emails` API.
pub struct ResendMailer {
    client: reqwest::Client,
    api_key: String,
    base_url: Url,
    from: String,
}

impl ResendMailer {
    pub fn new(
        api_key: impl Into<String>,
        base_url: Url,
        from: impl Into<String>,
        proxy: Option<&Url>,
    ) -> Result<Self, EverwellError> {
        Ok(Self {
            client: build_http_client(proxy, Duration::from_secs(10))?,
            api_key: api_key.into(),
            base_url,
            from: from.into(),
        })
    }
}

#[async_trait]
impl Mailer for ResendMailer {
    async fn send(&self, email: &OutgoingEmail) -> Result<(), EverwellError> {
        let resp = self
            .client
            .post(endpoint(&self.base_url, "emails"))
            .bearer_auth(&self.api_key)
            .json(&json!({
                "from": self.from,
                "to": [email.to],
                "subject": email.subject,
                "text": email.text,
            }))
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(EverwellError::UpstreamStatus(status));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn email() -> OutgoingEmail {
        OutgoingEmail {
            to: "ada@example.com".into(),
            subject: "Time to log".into(),
            text: "Hello".into(),
        }
    }

    #[tokio::test]
    async fn send_posts_to_emails_endpoint() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/emails"))
            .and(header("authorization", "Bearer re_test"))
            .and(body_partial_json(json!({
                "from": "EverWell <hi@everwell.test>",
                "to": ["ada@example.com"],
                "subject": "Time to log"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "em_1" })))
            .expect(1)
            .mount(&server)
            .await;

        let mailer = ResendMailer::new(
            "re_test",
            Url::parse(&server.uri()).unwrap(),
            "EverWell <hi@everwell.test>",
            None,
        )
        .unwrap();
        mailer.send(&email()).await.unwrap();
    }

    #[tokio::test]
    async fn send_surfaces_provider_errors() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(422))
            .mount(&server)
            .await;

        let mailer =
            ResendMailer::new("re_test", Url::parse(&server.uri()).unwrap(), "x@y.z", None)
                .unwrap();
        let err = mailer.send(&email()).await.unwrap_err();
        assert!(matches!(err, EverwellError::UpstreamStatus(s) if s.as_u16() == 422));
    }
}
