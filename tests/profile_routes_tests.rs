mod common;

use axum::http::{Method, StatusCode};
use common::{error_code, spawn_app, test_config};
use serde_json::json;

#[tokio::test]
async fn signup_issues_token_that_authenticates() {
    let app = spawn_app(test_config(), None, None).await;
    let token = app.signup("Ada_L").await;
    assert_eq!(token.len(), 43);

    let (status, body) = app.send(Method::GET, "/api/profile", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["handle"], "ada_l");
    assert_eq!(body["height_cm"], 180.0);
}

#[tokio::test]
async fn protected_routes_reject_missing_or_unknown_tokens() {
    let app = spawn_app(test_config(), None, None).await;

    let (status, body) = app.send(Method::GET, "/api/profile", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(error_code(&body), "not_authenticated");

    let (status, body) = app
        .send(Method::GET, "/api/measurements", Some("not-a-token"), None)
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(error_code(&body), "not_authenticated");
}

#[tokio::test]
async fn handle_availability_reports_reason() {
    let app = spawn_app(test_config(), None, None).await;
    app.signup("grace").await;

    let cases = [
        ("GRACE", false, Some("taken")),
        ("admin", false, Some("reserved")),
        ("9lives", false, Some("invalid_format")),
        ("ab", false, Some("invalid_format")),
        ("%20hopper%20", true, None),
    ];
    for (handle, available, reason) in cases {
        let uri = format!("/api/handles/availability?handle={handle}");
        let (status, body) = app.send(Method::GET, &uri, None, None).await;
        assert_eq!(status, StatusCode::OK, "{handle}");
        assert_eq!(body["available"], available, "{handle}");
        assert_eq!(body["reason"].as_str(), reason, "{handle}");
    }

    let (status, body) = app
        .send(Method::GET, "/api/handles/availability", None, None)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(error_code(&body), "invalid_input");
}

#[tokio::test]
async fn duplicate_handle_is_a_conflict() {
    let app = spawn_app(test_config(), None, None).await;
    app.signup("linus").await;

    let (status, body) = app
        .send(
            Method::POST,
            "/api/profiles",
            None,
            Some(json!({ "handle": " LINUS " })),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(error_code(&body), "handle_taken");
}

#[tokio::test]
async fn signup_validates_fields() {
    let app = spawn_app(test_config(), None, None).await;
    for payload in [
        json!({ "handle": "root" }),
        json!({ "handle": "valid_one", "height_cm": 20 }),
        json!({ "handle": "valid_two", "email": "no-at-sign" }),
        json!({ "handle": "valid_three", "birth_date": "1899-12-31" }),
        json!({ "handle": 42 }),
    ] {
        let (status, body) = app
            .send(Method::POST, "/api/profiles", None, Some(payload.clone()))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{payload}");
        assert_eq!(error_code(&body), "invalid_input", "{payload}");
    }
}

#[tokio::test]
async fn patch_updates_and_clears_fields() {
    let app = spawn_app(test_config(), None, None).await;
    let token = app.signup("marie").await;

    let (status, body) = app
        .send(
            Method::PATCH,
            "/api/profile",
            Some(&token),
            Some(json!({ "display_name": "Marie C", "email": "marie@example.com", "height_cm": null })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["display_name"], "Marie C");
    assert_eq!(body["email"], "marie@example.com");
    assert!(body["height_cm"].is_null());
    assert_eq!(body["handle"], "marie");
}

#[tokio::test]
async fn logout_revokes_only_the_presented_token() {
    let app = spawn_app(test_config(), None, None).await;
    let token = app.signup("alan").await;

    let (status, _) = app
        .send(Method::POST, "/api/auth/logout", Some(&token), None)
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = app.send(Method::GET, "/api/profile", Some(&token), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn failed_token_insert_rolls_back_signup() {
    let app = spawn_app(test_config(), None, None).await;
    sqlx::query(
        "CREATE TRIGGER reject_tokens BEFORE INSERT ON access_tokens \
         BEGIN SELECT RAISE(ABORT, 'tokens are read-only'); END",
    )
    .execute(app.storage.pool())
    .await
    .unwrap();

    let (status, body) = app
        .send(Method::POST, "/api/profiles", None, Some(json!({ "handle": "ada" })))
        .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(error_code(&body), "server_error");

    let (_, body) = app
        .send(Method::GET, "/api/handles/availability?handle=ada", None, None)
        .await;
    assert_eq!(body["available"], true);

    sqlx::query("DROP TRIGGER reject_tokens")
        .execute(app.storage.pool())
        .await
        .unwrap();
    let token = app.signup("ada").await;
    let (status, _) = app.send(Method::GET, "/api/profile", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
}
