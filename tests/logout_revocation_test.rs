mod common;

use axum::http::StatusCode;
use common::TestApp;
use serde_json::json;

async fn introspect_active(app: &TestApp, token: &str) -> bool {
    let (status, body) = app
        .post_json("/auth/introspect", json!({ "token": token }))
        .await;
    assert_eq!(status, StatusCode::OK);
    body["active"].as_bool().unwrap()
}

#[tokio::test]
async fn logout_invalidates_all_outstanding_tokens() {
    let app = TestApp::spawn();
    app.create_account("pat@example.com", None, "hunter2password", None);

    let (first_access, _) = app.login_tokens("pat@example.com", "hunter2password").await;
    let (second_access, _) = app.login_tokens("pat@example.com", "hunter2password").await;

    assert!(introspect_active(&app, &first_access).await);
    assert!(introspect_active(&app, &second_access).await);

    let (status, _) = app.post_authed("/auth/logout", &first_access, None).await;
    assert_eq!(status, StatusCode::OK);

    // Both sessions embed the old version and die together.
    assert!(!introspect_active(&app, &first_access).await);
    assert!(!introspect_active(&app, &second_access).await);

    // A fresh login issues usable tokens under the new version.
    let (fresh_access, _) = app.login_tokens("pat@example.com", "hunter2password").await;
    assert!(introspect_active(&app, &fresh_access).await);
}

#[tokio::test]
async fn logged_out_token_is_rejected_by_authenticated_routes() {
    let app = TestApp::spawn();
    app.create_account("pat@example.com", None, "hunter2password", None);
    let (access_token, _) = app.login_tokens("pat@example.com", "hunter2password").await;

    let (status, _) = app.post_authed("/auth/logout", &access_token, None).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = app.post_authed("/auth/logout", &access_token, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn revoking_one_token_leaves_other_sessions_valid() {
    let app = TestApp::spawn();
    app.create_account("pat@example.com", None, "hunter2password", None);

    let (revoked_access, _) = app.login_tokens("pat@example.com", "hunter2password").await;
    let (kept_access, _) = app.login_tokens("pat@example.com", "hunter2password").await;

    let (status, _) = app
        .post_authed("/auth/token/revoke", &revoked_access, None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(app.revocations.len(), 1);

    // Exactly the targeted jti is dead; the sibling session survives.
    assert!(!introspect_active(&app, &revoked_access).await);
    assert!(introspect_active(&app, &kept_access).await);

    // And authenticated routes agree.
    let (status, _) = app
        .post_authed("/auth/token/revoke", &revoked_access, None)
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn revoked_token_stays_dead_even_though_version_matches() {
    let app = TestApp::spawn();
    let account_id = app.create_account("pat@example.com", None, "hunter2password", None);
    let (access_token, _) = app.login_tokens("pat@example.com", "hunter2password").await;

    let (status, _) = app
        .post_authed("/auth/token/revoke", &access_token, None)
        .await;
    assert_eq!(status, StatusCode::OK);

    // Token version untouched: revocation is per-token, not account-wide.
    assert_eq!(app.store.account(account_id).unwrap().token_version, 0);
    assert!(!introspect_active(&app, &access_token).await);
}

#[tokio::test]
async fn missing_bearer_header_is_rejected() {
    let app = TestApp::spawn();

    let (status, _) = app.post_json("/auth/logout", json!({})).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn tampered_token_is_rejected() {
    let app = TestApp::spawn();
    app.create_account("pat@example.com", None, "hunter2password", None);
    let (access_token, _) = app.login_tokens("pat@example.com", "hunter2password").await;

    // Corrupt the payload section; the signature can no longer match.
    let tampered = access_token.replacen('.', ".x", 1);

    let (status, _) = app.post_authed("/auth/logout", &tampered, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}
