mod common;

use axum::body::Body;
use axum::http::{Method, StatusCode};
use chrono::{Duration, Utc};
use common::{FakeProvider, days_ago, error_code, spawn_app, test_config};
use everwell::EverwellError;
use everwell::api::InsightsProvider;
use everwell::config::Config;
use serde_json::{Value, json};
use std::sync::Arc;

fn config(daily_limit: u32) -> Config {
    Config {
        insights_daily_limit: daily_limit,
        insights_burst_per_minute: 20,
        ..test_config()
    }
}

#[tokio::test]
async fn missing_provider_is_reported_before_anything_else() {
    let app = spawn_app(config(5), None, None).await;
    let token = app.signup("ada").await;

    let (status, body) = app
        .send(Method::POST, "/api/insights", Some(&token), Some(json!({})))
        .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(error_code(&body), "no_openai_key");

    let (status, body) = app
        .send(Method::POST, "/api/insights", None, Some(json!({})))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(error_code(&body), "not_authenticated");
}

#[tokio::test]
async fn no_measurements_is_invalid_input() {
    let provider = FakeProvider::new();
    let app = spawn_app(config(5), Some(provider.clone() as Arc<dyn InsightsProvider>), None).await;
    let token = app.signup("ada").await;

    let (status, body) = app
        .send(Method::POST, "/api/insights", Some(&token), Some(json!({})))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(error_code(&body), "invalid_input");
    assert_eq!(provider.calls(), 0);
}

#[tokio::test]
async fn days_out_of_range_is_invalid_input() {
    let provider = FakeProvider::new();
    let app = spawn_app(config(5), Some(provider as Arc<dyn InsightsProvider>), None).await;
    let token = app.signup("ada").await;

    for days in [6, 91] {
        let (status, _) = app
            .send(
                Method::POST,
                "/api/insights",
                Some(&token),
                Some(json!({ "days": days })),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "days={days}");
    }
}

#[tokio::test]
async fn repeated_request_is_served_from_cache() {
    let provider = FakeProvider::new();
    let app = spawn_app(config(5), Some(provider.clone() as Arc<dyn InsightsProvider>), None).await;
    let token = app.signup("ada").await;
    app.record(&token, &days_ago(1), "steps", 6000.0).await;
    app.record(&token, &days_ago(0), "steps", 7000.0).await;

    let (status, first) = app
        .send(Method::POST, "/api/insights", Some(&token), Some(json!({ "kind": "plan" })))
        .await;
    assert_eq!(status, StatusCode::OK, "{first}");
    assert_eq!(first["cached"], false);
    assert_eq!(first["insight"]["kind"], "plan");
    assert_eq!(first["insight"]["model"], "fake-model");
    assert_eq!(first["insight"]["recommendations"][0], "Keep logging daily.");
    assert_eq!(first["usage"]["used"], 1);
    assert_eq!(first["usage"]["remaining"], 4);

    let (status, second) = app
        .send(Method::POST, "/api/insights", Some(&token), Some(json!({ "kind": "plan" })))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(second["cached"], true);
    assert_eq!(second["insight"]["id"], first["insight"]["id"]);
    assert_eq!(second["usage"]["used"], 1);
    assert_eq!(provider.calls(), 1);

    // a different kind is a different cache entry
    let (_, summary) = app
        .send(Method::POST, "/api/insights", Some(&token), Some(json!({})))
        .await;
    assert_eq!(summary["cached"], false);
    assert_eq!(summary["insight"]["kind"], "summary");

    // force bypasses the cache and spends quota
    let (_, forced) = app
        .send(
            Method::POST,
            "/api/insights",
            Some(&token),
            Some(json!({ "kind": "plan", "force": true })),
        )
        .await;
    assert_eq!(forced["cached"], false);
    assert_eq!(forced["usage"]["used"], 3);
    assert_eq!(provider.calls(), 3);

    // new data changes the payload, so the cache misses
    app.record(&token, &days_ago(0), "steps", 9000.0).await;
    let (_, fresh) = app
        .send(Method::POST, "/api/insights", Some(&token), Some(json!({ "kind": "plan" })))
        .await;
    assert_eq!(fresh["cached"], false);
    assert_eq!(provider.calls(), 4);
}

#[tokio::test]
async fn daily_limit_returns_rate_limit() {
    let provider = FakeProvider::new();
    let app = spawn_app(config(1), Some(provider.clone() as Arc<dyn InsightsProvider>), None).await;
    let token = app.signup("ada").await;
    app.record(&token, &days_ago(0), "weight", 70.0).await;

    let (status, _) = app
        .send(Method::POST, "/api/insights", Some(&token), Some(json!({})))
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = app
        .send(
            Method::POST,
            "/api/insights",
            Some(&token),
            Some(json!({ "force": true })),
        )
        .await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(error_code(&body), "rate_limit");
    assert_eq!(provider.calls(), 1);

    let (status, usage) = app
        .send(Method::GET, "/api/insights/usage", Some(&token), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(usage["used"], 1);
    assert_eq!(usage["limit"], 1);
    assert_eq!(usage["remaining"], 0);
}

#[tokio::test]
async fn burst_limiter_applies_per_user() {
    let provider = FakeProvider::new();
    let cfg = Config {
        insights_daily_limit: 50,
        insights_burst_per_minute: 1,
        ..test_config()
    };
    let app = spawn_app(cfg, Some(provider as Arc<dyn InsightsProvider>), None).await;
    let ada = app.signup("ada").await;
    let bob = app.signup("bob").await;
    for token in [&ada, &bob] {
        app.record(token, &days_ago(0), "steps", 100.0).await;
    }

    let force = json!({ "force": true });
    let (status, _) = app
        .send(Method::POST, "/api/insights", Some(&ada), Some(force.clone()))
        .await;
    assert_eq!(status, StatusCode::OK);
    let (status, body) = app
        .send(Method::POST, "/api/insights", Some(&ada), Some(force.clone()))
        .await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(error_code(&body), "rate_limit");

    let (status, _) = app
        .send(Method::POST, "/api/insights", Some(&bob), Some(force))
        .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn provider_failure_releases_quota() {
    let provider = FakeProvider::new();
    let app = spawn_app(config(5), Some(provider.clone() as Arc<dyn InsightsProvider>), None).await;
    let token = app.signup("ada").await;
    app.record(&token, &days_ago(0), "sleep_hours", 7.0).await;

    provider.fail_next(|| EverwellError::Timeout);
    let (status, body) = app
        .send(Method::POST, "/api/insights", Some(&token), Some(json!({})))
        .await;
    assert_eq!(status, StatusCode::GATEWAY_TIMEOUT);
    assert_eq!(error_code(&body), "timeout");

    provider.fail_next(|| EverwellError::InvalidAiResponse("empty".into()));
    let (status, body) = app
        .send(Method::POST, "/api/insights", Some(&token), Some(json!({})))
        .await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(error_code(&body), "server_error");

    let (_, usage) = app
        .send(Method::GET, "/api/insights/usage", Some(&token), None)
        .await;
    assert_eq!(usage["used"], 0);

    let (_, list) = app
        .send(Method::GET, "/api/insights", Some(&token), None)
        .await;
    assert!(list.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn history_lists_newest_first_and_is_owner_scoped() {
    let provider = FakeProvider::new();
    let app = spawn_app(config(5), Some(provider as Arc<dyn InsightsProvider>), None).await;
    let token = app.signup("ada").await;
    let other = app.signup("bob").await;
    app.record(&token, &days_ago(0), "steps", 100.0).await;

    for kind in ["summary", "plan"] {
        let (status, _) = app
            .send(Method::POST, "/api/insights", Some(&token), Some(json!({ "kind": kind })))
            .await;
        assert_eq!(status, StatusCode::OK);
    }

    let (status, list) = app
        .send(Method::GET, "/api/insights?limit=1", Some(&token), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    let list = list.as_array().unwrap();
    assert_eq!(list.len(), 1);
    assert_eq!(list[0]["kind"], "plan");

    let uri = format!("/api/insights/{}", list[0]["id"]);
    let (status, _) = app.send(Method::GET, &uri, Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    let (status, body) = app.send(Method::GET, &uri, Some(&other), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(error_code(&body), "not_found");

    let (status, _) = app
        .send(Method::GET, "/api/insights?limit=51", Some(&token), None)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn failed_persist_releases_quota() {
    let provider = FakeProvider::new();
    let app = spawn_app(config(5), Some(provider.clone() as Arc<dyn InsightsProvider>), None).await;
    let token = app.signup("ada").await;
    app.record(&token, &days_ago(0), "steps", 4200.0).await;

    sqlx::query(
        "CREATE TRIGGER reject_insights BEFORE INSERT ON ai_insights \
         BEGIN SELECT RAISE(ABORT, 'insights are read-only'); END",
    )
    .execute(app.storage.pool())
    .await
    .unwrap();

    let (status, body) = app
        .send(Method::POST, "/api/insights", Some(&token), Some(json!({})))
        .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(error_code(&body), "server_error");
    assert_eq!(provider.calls(), 1);

    let (_, usage) = app
        .send(Method::GET, "/api/insights/usage", Some(&token), None)
        .await;
    assert_eq!(usage["used"], 0);
    assert_eq!(usage["remaining"], 5);

    sqlx::query("DROP TRIGGER reject_insights")
        .execute(app.storage.pool())
        .await
        .unwrap();
    let (status, body) = app
        .send(Method::POST, "/api/insights", Some(&token), Some(json!({})))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["usage"]["used"], 1);
}

#[tokio::test]
async fn expired_cache_entry_is_not_served() {
    let provider = FakeProvider::new();
    let app = spawn_app(config(5), Some(provider.clone() as Arc<dyn InsightsProvider>), None).await;
    let token = app.signup("ada").await;
    app.record(&token, &days_ago(0), "water_ml", 1800.0).await;

    let (status, first) = app
        .send(Method::POST, "/api/insights", Some(&token), Some(json!({})))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(first["cached"], false);

    let (key, user_id, insight_id): (String, String, i64) =
        sqlx::query_as("SELECT cache_key, user_id, insight_id FROM insights_cache")
            .fetch_one(app.storage.pool())
            .await
            .unwrap();
    let an_hour_ago = Utc::now() - Duration::hours(1);
    app.storage
        .put_cache(&key, &user_id, insight_id, an_hour_ago)
        .await
        .unwrap();
    assert!(
        app.storage
            .get_cached_insight(&user_id, &key, Utc::now())
            .await
            .unwrap()
            .is_none()
    );

    let (status, second) = app
        .send(Method::POST, "/api/insights", Some(&token), Some(json!({})))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(second["cached"], false);
    assert_eq!(provider.calls(), 2);
    assert_ne!(second["insight"]["id"], first["insight"]["id"]);
}

#[tokio::test]
async fn request_without_body_uses_defaults() {
    let provider = FakeProvider::new();
    let app = spawn_app(config(5), Some(provider.clone() as Arc<dyn InsightsProvider>), None).await;
    let token = app.signup("ada").await;
    app.record(&token, &days_ago(2), "steps", 5100.0).await;

    let (status, body) = app
        .send(Method::POST, "/api/insights", Some(&token), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["cached"], false);
    assert_eq!(body["insight"]["kind"], "summary");
    assert_eq!(provider.calls(), 1);

    let auth = format!("Bearer {token}");
    let (status, _, bytes) = app
        .send_raw(
            Method::POST,
            "/api/insights",
            &[("authorization", auth.as_str()), ("content-type", "text/plain")],
            Body::from("{}"),
        )
        .await;
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(error_code(&body), "invalid_input");
}
