//! Clients for the external collaborators: the LLM chat-completion API and
//! the transactional email provider.

pub mod email;
pub mod openai;

pub use email::{Mailer, OutgoingEmail, ResendMailer};
pub use openai::{InsightsProvider, OpenAiInsightsProvider};

use crate::error::EverwellError;
use std::time::Duration;
use url::Url;

/// Build an outbound HTTP client with the configured proxy and timeout.
pub(crate) fn build_http_client(
    proxy: Option<&Url>,
    timeout: Duration,
) -> Result<reqwest::Client, EverwellError> {
    let mut builder = reqwest::Client::builder()
        .user_agent(concat!("everwell/", env!("CARGO_PKG_VERSION")))
        .connect_timeout(Duration::from_secs(5))
        .timeout(timeout);
    if let Some(proxy_url) = proxy {
        builder = builder.proxy(reqwest::Proxy::all(proxy_url.as_str())?);
    }
    Ok(builder.build()?)
}

/// Join `path` onto `base`, treating `base` as a directory even without a trailing slash.
pub(crate) fn endpoint(base: &Url, path: &str) -> Url {
    let mut base = base.clone();
    if !base.path().ends_with('/') {
        let dir = format!("{}/", base.path());
        base.set_path(&dir);
    }
    base.join(path).unwrap_or(base)
}
