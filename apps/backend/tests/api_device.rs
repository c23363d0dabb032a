//! Device registration and status API tests.
//!
//! These tests require a running PostgreSQL database.
//! Set DATABASE_URL environment variable before running.

mod common;

use axum::http::StatusCode;
use axum_test::TestServer;
use uuid::Uuid;

use common::fixtures;
use common::TestContext;

/// Test device registration creates an account.
#[tokio::test]
#[ignore = "requires database"]
async fn test_register_device_creates_account() {
    let ctx = TestContext::new().await;
    let server = TestServer::new(ctx.router()).unwrap();

    let response = server
        .post("/api/device/register")
        .json(&fixtures::register_request(Some("Laptop"), None))
        .await;

    response.assert_status_ok();
    let body: serde_json::Value = response.json();

    assert!(body.get("device_id").is_some());
    assert!(body["token"].as_str().unwrap().len() > 10);

    let account_id = Uuid::parse_str(body["account_id"].as_str().unwrap()).unwrap();
    ctx.cleanup_account(account_id).await;
}

/// Test a second device joins an existing account.
#[tokio::test]
#[ignore = "requires database"]
async fn test_register_device_joins_account() {
    let ctx = TestContext::new().await;
    let server = TestServer::new(ctx.router()).unwrap();
    let first = ctx.create_test_device(Some("Phone")).await;

    let response = server
        .post("/api/device/register")
        .json(&fixtures::register_request(
            Some("Tablet"),
            Some(&first.account_id.to_string()),
        ))
        .await;

    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(
        body["account_id"].as_str().unwrap(),
        first.account_id.to_string()
    );
    assert_ne!(body["device_id"].as_str().unwrap(), first.id.to_string());

    ctx.cleanup_account(first.account_id).await;
}

/// Test joining an unknown account fails.
#[tokio::test]
#[ignore = "requires database"]
async fn test_register_device_unknown_account() {
    let ctx = TestContext::new().await;
    let server = TestServer::new(ctx.router()).unwrap();

    let response = server
        .post("/api/device/register")
        .json(&fixtures::register_request(None, Some(&Uuid::new_v4().to_string())))
        .await;
    response.assert_status(StatusCode::NOT_FOUND);

    let response = server
        .post("/api/device/register")
        .json(&fixtures::register_request(None, Some("not-a-uuid")))
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);
}

/// Test device status endpoint requires authentication.
#[tokio::test]
#[ignore = "requires database"]
async fn test_device_status_requires_auth() {
    let ctx = TestContext::new().await;
    let server = TestServer::new(ctx.router()).unwrap();

    let response = server.get("/api/device/status").await;

    response.assert_status(StatusCode::UNAUTHORIZED);
}

/// Test device status with valid token.
#[tokio::test]
#[ignore = "requires database"]
async fn test_device_status_with_valid_token() {
    let ctx = TestContext::new().await;
    let server = TestServer::new(ctx.router()).unwrap();
    let device = ctx.create_test_device(Some("Test Device")).await;

    let response = server
        .get("/api/device/status")
        .add_header(
            axum::http::header::AUTHORIZATION,
            TestContext::auth_header_value(&device.token),
        )
        .await;

    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["device_id"].as_str().unwrap(), device.id.to_string());
    assert_eq!(body["name"].as_str().unwrap(), "Test Device");

    ctx.cleanup_account(device.account_id).await;
}

/// Test device status with malformed authorization header.
#[tokio::test]
#[ignore = "requires database"]
async fn test_device_status_malformed_auth() {
    let ctx = TestContext::new().await;
    let server = TestServer::new(ctx.router()).unwrap();

    let response = server
        .get("/api/device/status")
        .add_header(axum::http::header::AUTHORIZATION, "some-token")
        .await;
    response.assert_status(StatusCode::UNAUTHORIZED);

    let response = server
        .get("/api/device/status")
        .add_header(axum::http::header::AUTHORIZATION, "Bearer invalid-token-here")
        .await;
    response.assert_status(StatusCode::UNAUTHORIZED);
}

/// Test that authenticated requests update last_seen.
#[tokio::test]
#[ignore = "requires database"]
async fn test_device_status_updates_last_seen() {
    let ctx = TestContext::new().await;
    let server = TestServer::new(ctx.router()).unwrap();
    let device = ctx.create_test_device(None).await;

    tokio::time::sleep(tokio::time::Duration::from_millis(50)).await;

    let _ = server
        .get("/api/device/status")
        .add_header(
            axum::http::header::AUTHORIZATION,
            TestContext::auth_header_value(&device.token),
        )
        .await;

    let seen = ctx.get_device_by_token(&device.token).await.unwrap();
    assert!(seen.last_seen_at >= device.last_seen_at);

    ctx.cleanup_account(device.account_id).await;
}
