#![allow(dead_code)]

use async_trait::async_trait;
use axum::{
    Router,
    body::{Body, Bytes, to_bytes},
    http::{HeaderMap, Method, Request, StatusCode},
};
use everwell::EverwellError;
use everwell::api::{InsightsProvider, Mailer, OutgoingEmail};
use everwell::config::Config;
use everwell::db::Storage;
use everwell::router::{AppState, everwell_router};
use everwell::types::{InsightDraft, InsightRequest};
use serde_json::{Value, json};
use std::{
    fs,
    path::PathBuf,
    sync::{
        Arc, Mutex,
        atomic::{AtomicU64, AtomicUsize, Ordering},
    },
    time::{SystemTime, UNIX_EPOCH},
};
use tower::ServiceExt;

static DB_SEQ: AtomicU64 = AtomicU64::new(0);

pub struct TestApp {
    pub app: Router,
    pub storage: Storage,
    db_path: PathBuf,
}

impl Drop for TestApp {
    fn drop(&mut self) {
        for suffix in ["", "-wal", "-shm"] {
            let _ = fs::remove_file(format!("{}{suffix}", self.db_path.display()));
        }
    }
}

pub fn test_config() -> Config {
    Config {
        cron_secret: Some("cron-secret".to_string()),
        ..Config::default()
    }
}

pub async fn spawn_app(
    cfg: Config,
    provider: Option<Arc<dyn InsightsProvider>>,
    mailer: Option<Arc<dyn Mailer>>,
) -> TestApp {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system time before UNIX_EPOCH")
        .as_nanos();
    let mut db_path = std::env::temp_dir();
    db_path.push(format!(
        "everwell-test-{}-{}-{}.sqlite",
        std::process::id(),
        nanos,
        DB_SEQ.fetch_add(1, Ordering::Relaxed)
    ));

    let storage = Storage::connect(&format!("sqlite:{}", db_path.display()))
        .await
        .expect("failed to open test database");
    let state = AppState::build(Arc::new(cfg), storage.clone(), provider, mailer);
    TestApp {
        app: everwell_router(state),
        storage,
        db_path,
    }
}

impl TestApp {
    pub async fn send_raw(
        &self,
        method: Method,
        uri: &str,
        headers: &[(&str, &str)],
        body: Body,
    ) -> (StatusCode, HeaderMap, Bytes) {
        let mut req = Request::builder().method(method).uri(uri);
        for (k, v) in headers {
            req = req.header(*k, *v);
        }
        let resp = self
            .app
            .clone()
            .oneshot(req.body(body).expect("failed to build request"))
            .await
            .expect("request failed");
        let status = resp.status();
        let headers = resp.headers().clone();
        let bytes = to_bytes(resp.into_body(), usize::MAX)
            .await
            .expect("failed to read response body");
        (status, headers, bytes)
    }

    /// Send an optional JSON body with an optional bearer token; parse a JSON reply.
    pub async fn send(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let auth = token.map(|t| format!("Bearer {t}"));
        let mut headers = vec![];
        if let Some(auth) = auth.as_deref() {
            headers.push(("authorization", auth));
        }
        let body = match body {
            Some(v) => {
                headers.push(("content-type", "application/json"));
                Body::from(v.to_string())
            }
            None => Body::empty(),
        };
        let (status, _, bytes) = self.send_raw(method, uri, &headers, body).await;
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).expect("response body was not JSON")
        };
        (status, value)
    }

    /// Create a profile and return its bearer token.
    pub async fn signup(&self, handle: &str) -> String {
        let (status, body) = self
            .send(
                Method::POST,
                "/api/profiles",
                None,
                Some(json!({ "handle": handle, "height_cm": 180 })),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "signup failed: {body}");
        body["token"].as_str().expect("token in body").to_string()
    }

    pub async fn record(&self, token: &str, date: &str, metric: &str, value: f64) -> Value {
        let (status, body) = self
            .send(
                Method::POST,
                "/api/measurements",
                Some(token),
                Some(json!({ "date": date, "metric_slug": metric, "value": value })),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "record failed: {body}");
        body
    }
}

pub fn error_code(body: &Value) -> &str {
    body["error"]["code"].as_str().unwrap_or_default()
}

pub fn today() -> chrono::NaiveDate {
    chrono::Utc::now().date_naive()
}

pub fn days_ago(n: u64) -> String {
    today()
        .checked_sub_days(chrono::Days::new(n))
        .expect("date in range")
        .to_string()
}

/// Scripted insights provider that counts calls.
pub struct FakeProvider {
    pub calls: AtomicUsize,
    pub fail_with: Mutex<Option<fn() -> EverwellError>>,
}

impl FakeProvider {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            fail_with: Mutex::new(None),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn fail_next(&self, make: fn() -> EverwellError) {
        *self.fail_with.lock().unwrap() = Some(make);
    }
}

#[async_trait]
impl InsightsProvider for FakeProvider {
    fn model(&self) -> &str {
        "fake-model"
    }

    async fn generate(&self, request: &InsightRequest) -> Result<InsightDraft, EverwellError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let failure = self.fail_with.lock().unwrap().take();
        if let Some(make) = failure {
            return Err(make());
        }
        Ok(InsightDraft {
            summary: format!("A {} of your recent data.", request.kind.as_str()),
            recommendations: vec!["Keep logging daily.".to_string()],
        })
    }
}

/// Mailer that records every message and can be told to fail.
#[derive(Default)]
pub struct FakeMailer {
    pub sent: Mutex<Vec<OutgoingEmail>>,
    pub fail: bool,
}

#[async_trait]
impl Mailer for FakeMailer {
    async fn send(&self, email: &OutgoingEmail) -> Result<(), EverwellError> {
        if self.fail {
            return Err(EverwellError::UpstreamStatus(StatusCode::BAD_GATEWAY));
        }
        self.sent.lock().unwrap().push(email.clone());
        Ok(())
    }
}
