mod common;

use axum::http::StatusCode;
use common::TestApp;
use serde_json::json;
use staffhub_auth::services::{SentEmail, SentSms};

#[tokio::test]
async fn unknown_email_still_reports_success() {
    let app = TestApp::spawn();

    let (status, body) = app
        .post_json(
            "/auth/password-reset/request",
            json!({ "email": "nobody@example.com" }),
        )
        .await;

    // Security: prevent account enumeration.
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ok"], json!(true));
    assert!(app.email.sent().is_empty());
    assert_eq!(app.store.challenge_count(), 0);
}

#[tokio::test]
async fn inactive_account_still_reports_success() {
    let app = TestApp::spawn();
    let account_id = app.create_account("gone@example.com", None, "hunter2password", None);
    let mut account = app.store.account(account_id).unwrap();
    account.active_flag = false;
    app.store.insert_account(account);

    let (status, body) = app
        .post_json(
            "/auth/password-reset/request",
            json!({ "email": "gone@example.com" }),
        )
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ok"], json!(true));
    assert!(app.email.sent().is_empty());
}

#[tokio::test]
async fn reset_email_carries_a_link_with_handle_and_code() {
    let app = TestApp::spawn();
    app.create_account("pat@example.com", None, "hunter2password", None);

    let (status, _) = app
        .post_json(
            "/auth/password-reset/request",
            json!({ "email": "pat@example.com" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let link = app.last_reset_link().expect("reset link was emailed");
    assert!(link.starts_with(common::TEST_BASE_URL));

    let (challenge_id, code) = TestApp::parse_reset_link(&link);
    assert!(app.store.challenge(challenge_id).is_some());
    assert_eq!(code.len(), 6);
}

#[tokio::test]
async fn validate_endpoint_checks_without_consuming() {
    let app = TestApp::spawn();
    app.create_account("pat@example.com", None, "hunter2password", None);

    app.post_json(
        "/auth/password-reset/request",
        json!({ "email": "pat@example.com" }),
    )
    .await;
    let (challenge_id, code) = TestApp::parse_reset_link(&app.last_reset_link().unwrap());

    let (status, body) = app
        .post_json(
            "/auth/password-reset/validate",
            json!({ "challenge_id": challenge_id, "code": code }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ok"], json!(true));

    // Non-consuming, but it does spend an attempt.
    let row = app.store.challenge(challenge_id).unwrap();
    assert!(row.consumed_utc.is_none());
    assert_eq!(row.attempt_count, 1);

    // The confirm step still works afterwards.
    let (status, _) = app
        .post_json(
            "/auth/password-reset/confirm",
            json!({ "challenge_id": challenge_id, "code": code, "new_password": "brand-new-pass-1" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn confirm_changes_the_password() {
    let app = TestApp::spawn();
    app.create_account(
        "pat@example.com",
        Some("+15551112222"),
        "old-password-123",
        None,
    );

    app.post_json(
        "/auth/password-reset/request",
        json!({ "email": "pat@example.com" }),
    )
    .await;
    let (challenge_id, code) = TestApp::parse_reset_link(&app.last_reset_link().unwrap());

    let (status, _) = app
        .post_json(
            "/auth/password-reset/confirm",
            json!({ "challenge_id": challenge_id, "code": code, "new_password": "new-password-456" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    // Old password is dead, new one works.
    let (status, _) = app
        .post_json(
            "/auth/login",
            json!({ "identifier": "pat@example.com", "password": "old-password-123" }),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = app
        .post_json(
            "/auth/login",
            json!({ "identifier": "pat@example.com", "password": "new-password-456" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    // Change notifications went out over both channels.
    assert!(app
        .email
        .sent()
        .iter()
        .any(|m| matches!(m, SentEmail::PasswordResetSuccess { .. })));
    assert!(app
        .sms
        .sent()
        .iter()
        .any(|m| matches!(m, SentSms::PasswordResetSuccess { .. })));
}

#[tokio::test]
async fn notification_failure_does_not_fail_the_reset() {
    let app = TestApp::spawn();
    app.create_account("pat@example.com", None, "old-password-123", None);

    app.post_json(
        "/auth/password-reset/request",
        json!({ "email": "pat@example.com" }),
    )
    .await;
    let (challenge_id, code) = TestApp::parse_reset_link(&app.last_reset_link().unwrap());

    // The success notification will fail; the reset must not.
    app.email.set_failing(true);

    let (status, _) = app
        .post_json(
            "/auth/password-reset/confirm",
            json!({ "challenge_id": challenge_id, "code": code, "new_password": "new-password-456" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    // The attempt was made even though it failed.
    assert!(app
        .email
        .sent()
        .iter()
        .any(|m| matches!(m, SentEmail::PasswordResetSuccess { .. })));

    app.email.set_failing(false);
    let (status, _) = app
        .post_json(
            "/auth/login",
            json!({ "identifier": "pat@example.com", "password": "new-password-456" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn reset_challenge_is_single_use() {
    let app = TestApp::spawn();
    app.create_account("pat@example.com", None, "old-password-123", None);

    app.post_json(
        "/auth/password-reset/request",
        json!({ "email": "pat@example.com" }),
    )
    .await;
    let (challenge_id, code) = TestApp::parse_reset_link(&app.last_reset_link().unwrap());

    let (first, _) = app
        .post_json(
            "/auth/password-reset/confirm",
            json!({ "challenge_id": challenge_id, "code": code, "new_password": "new-password-456" }),
        )
        .await;
    assert_eq!(first, StatusCode::OK);

    let (second, _) = app
        .post_json(
            "/auth/password-reset/confirm",
            json!({ "challenge_id": challenge_id, "code": code, "new_password": "even-newer-789" }),
        )
        .await;
    assert_eq!(second, StatusCode::BAD_REQUEST);

    // The second attempt changed nothing.
    let (status, _) = app
        .post_json(
            "/auth/login",
            json!({ "identifier": "pat@example.com", "password": "new-password-456" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn login_challenge_cannot_reset_a_password() {
    let app = TestApp::spawn();
    app.create_account(
        "pat@example.com",
        None,
        "hunter2password",
        Some(staffhub_auth::models::OtpChannel::Email),
    );

    let (_, body) = app
        .post_json(
            "/auth/login",
            json!({ "identifier": "pat@example.com", "password": "hunter2password" }),
        )
        .await;
    let challenge_id = body["challenge_id"].as_str().unwrap().to_string();
    let code = app.last_email_otp_code().unwrap();

    let (status, _) = app
        .post_json(
            "/auth/password-reset/confirm",
            json!({ "challenge_id": challenge_id, "code": code, "new_password": "sneaky-pass-123" }),
        )
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);

    // Original password still works (the consume burned the challenge, not
    // the credential).
    let (status, _) = app
        .post_json(
            "/auth/login",
            json!({ "identifier": "pat@example.com", "password": "hunter2password" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn short_new_password_fails_validation() {
    let app = TestApp::spawn();

    let (status, _) = app
        .post_json(
            "/auth/password-reset/confirm",
            json!({ "challenge_id": uuid::Uuid::new_v4(), "code": "123456", "new_password": "short" }),
        )
        .await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}
