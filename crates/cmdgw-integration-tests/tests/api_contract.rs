//! HTTP contract tests: routing, auth enforcement, role scoping, and the
//! structured error envelope, exercised through the assembled router.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

use cmdgw_api::state::{AppConfig, AppState};

const SECRET: &str = "test-secret";

fn test_state() -> AppState {
    AppState::new(AppConfig {
        auth_token: Some(SECRET.to_string()),
        ..AppConfig::default()
    })
}

fn admin_token() -> String {
    SECRET.to_string()
}

fn member_token(user_id: &str) -> String {
    format!("member:{user_id}:{SECRET}")
}

fn admin_user_token(user_id: &str) -> String {
    format!("admin:{user_id}:{SECRET}")
}

async fn send(
    app: &Router,
    method: &str,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header("Authorization", format!("Bearer {token}"));
    }
    let request = match body {
        Some(body) => builder
            .header("Content-Type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    // Health probes answer in plain text; everything else is JSON.
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes)
            .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
    };
    (status, json)
}

/// Register a user through the API and hand back its id string.
async fn register_user(app: &Router, name: &str, role: &str) -> String {
    let (status, body) = send(
        app,
        "POST",
        "/v1/users",
        Some(&admin_token()),
        Some(json!({
            "name": name,
            "email": format!("{name}@example.com"),
            "role": role,
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    body["id"].as_str().unwrap().to_string()
}

async fn grant_credits(app: &Router, user_id: &str, amount: i64) {
    let (status, _) = send(
        app,
        "POST",
        &format!("/v1/users/{user_id}/credits"),
        Some(&admin_token()),
        Some(json!({ "amount": amount })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn health_probes_need_no_auth() {
    let app = cmdgw_api::app(test_state());
    let (status, body) = send(&app, "GET", "/health/liveness", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, Value::String("ok".to_string()));
    let (status, body) = send(&app, "GET", "/health/readiness", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, Value::String("ready".to_string()));
}

#[tokio::test]
async fn api_routes_require_auth() {
    let app = cmdgw_api::app(test_state());
    let (status, body) = send(&app, "GET", "/v1/commands", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["code"], "UNAUTHORIZED");
}

#[tokio::test]
async fn member_cannot_manage_rules() {
    let app = cmdgw_api::app(test_state());
    let member = register_user(&app, "mel", "member").await;

    let (status, body) = send(
        &app,
        "POST",
        "/v1/rules",
        Some(&member_token(&member)),
        Some(json!({ "pattern": "^deploy", "action": "AUTO_ACCEPT" })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"]["code"], "FORBIDDEN");
}

#[tokio::test]
async fn submit_command_end_to_end() {
    let app = cmdgw_api::app(test_state());
    let admin = register_user(&app, "ada", "admin").await;
    let member = register_user(&app, "mel", "member").await;
    grant_credits(&app, &member, 5).await;

    let (status, _) = send(
        &app,
        "POST",
        "/v1/rules",
        Some(&admin_user_token(&admin)),
        Some(json!({ "pattern": "^deploy", "action": "AUTO_ACCEPT" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = send(
        &app,
        "POST",
        "/v1/commands",
        Some(&member_token(&member)),
        Some(json!({ "command_text": "deploy api" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["status"], "executed");
    assert_eq!(body["output"], "Execution mocked: would run 'deploy api'");

    // The debit is visible on the user record.
    let (status, body) = send(
        &app,
        "GET",
        &format!("/v1/users/{member}"),
        Some(&member_token(&member)),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["balance"], 4);
}

#[tokio::test]
async fn unmatched_submission_reports_rejection() {
    let app = cmdgw_api::app(test_state());
    let member = register_user(&app, "mel", "member").await;
    grant_credits(&app, &member, 5).await;

    let (status, body) = send(
        &app,
        "POST",
        "/v1/commands",
        Some(&member_token(&member)),
        Some(json!({ "command_text": "format disk" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["status"], "rejected");
    assert_eq!(
        body["rejection_reason"],
        "No matching rule found - default AUTO_REJECT"
    );
}

#[tokio::test]
async fn member_is_scoped_to_own_commands() {
    let app = cmdgw_api::app(test_state());
    let member_a = register_user(&app, "mel", "member").await;
    let member_b = register_user(&app, "max", "member").await;
    grant_credits(&app, &member_a, 5).await;

    let (_, body) = send(
        &app,
        "POST",
        "/v1/commands",
        Some(&member_token(&member_a)),
        Some(json!({ "command_text": "anything" })),
    )
    .await;
    let command_id = body["command_id"].as_str().unwrap().to_string();

    let (status, body) = send(
        &app,
        "GET",
        &format!("/v1/commands/{command_id}"),
        Some(&member_token(&member_b)),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"]["code"], "FORBIDDEN");

    // The other member's listing is empty.
    let (_, body) = send(
        &app,
        "GET",
        "/v1/commands",
        Some(&member_token(&member_b)),
        None,
    )
    .await;
    assert_eq!(body["commands"].as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn approval_queue_flow_over_http() {
    let app = cmdgw_api::app(test_state());
    let admin = register_user(&app, "ada", "admin").await;
    let member = register_user(&app, "mel", "member").await;
    grant_credits(&app, &member, 5).await;

    send(
        &app,
        "POST",
        "/v1/rules",
        Some(&admin_user_token(&admin)),
        Some(json!({ "pattern": "^restart", "action": "REQUIRE_APPROVAL", "voting_threshold": 2 })),
    )
    .await;

    let (_, body) = send(
        &app,
        "POST",
        "/v1/commands",
        Some(&member_token(&member)),
        Some(json!({ "command_text": "restart db" })),
    )
    .await;
    assert_eq!(body["status"], "needs_approval");
    let command_id = body["command_id"].as_str().unwrap().to_string();

    let (status, body) = send(
        &app,
        "GET",
        "/v1/approvals",
        Some(&admin_user_token(&admin)),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["pending"].as_array().unwrap().len(), 1);

    let (status, body) = send(
        &app,
        "POST",
        &format!("/v1/commands/{command_id}/votes"),
        Some(&admin_user_token(&admin)),
        Some(json!({ "vote": "approve" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["counts"]["approve"], 1);
    assert_eq!(body["auto_approved"], false);

    let (status, body) = send(
        &app,
        "POST",
        &format!("/v1/commands/{command_id}/approve"),
        Some(&admin_user_token(&admin)),
        Some(json!({ "reason": "verified manually" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "executed");
    assert_eq!(body["approval_reason"], "verified manually");
}

#[tokio::test]
async fn approval_queue_and_voting_are_admin_only() {
    let app = cmdgw_api::app(test_state());
    let admin = register_user(&app, "ada", "admin").await;
    let member = register_user(&app, "mel", "member").await;
    grant_credits(&app, &member, 5).await;

    send(
        &app,
        "POST",
        "/v1/rules",
        Some(&admin_user_token(&admin)),
        Some(json!({ "pattern": "^restart", "action": "REQUIRE_APPROVAL", "voting_threshold": 2 })),
    )
    .await;
    let (_, body) = send(
        &app,
        "POST",
        "/v1/commands",
        Some(&member_token(&member)),
        Some(json!({ "command_text": "restart db" })),
    )
    .await;
    let command_id = body["command_id"].as_str().unwrap().to_string();

    let (status, body) = send(
        &app,
        "GET",
        "/v1/approvals",
        Some(&member_token(&member)),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"]["code"], "FORBIDDEN");

    let (status, body) = send(
        &app,
        "POST",
        &format!("/v1/commands/{command_id}/votes"),
        Some(&member_token(&member)),
        Some(json!({ "vote": "approve" })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"]["code"], "FORBIDDEN");
}

#[tokio::test]
async fn reject_without_reason_is_unprocessable() {
    let app = cmdgw_api::app(test_state());
    let admin = register_user(&app, "ada", "admin").await;
    let member = register_user(&app, "mel", "member").await;
    grant_credits(&app, &member, 5).await;

    send(
        &app,
        "POST",
        "/v1/rules",
        Some(&admin_user_token(&admin)),
        Some(json!({ "pattern": "^restart", "action": "REQUIRE_APPROVAL" })),
    )
    .await;
    let (_, body) = send(
        &app,
        "POST",
        "/v1/commands",
        Some(&member_token(&member)),
        Some(json!({ "command_text": "restart db" })),
    )
    .await;
    let command_id = body["command_id"].as_str().unwrap().to_string();

    let (status, body) = send(
        &app,
        "POST",
        &format!("/v1/commands/{command_id}/reject"),
        Some(&admin_user_token(&admin)),
        Some(json!({ "reason": "  " })),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn invalid_rule_pattern_is_unprocessable() {
    let app = cmdgw_api::app(test_state());
    let admin = register_user(&app, "ada", "admin").await;

    let (status, body) = send(
        &app,
        "POST",
        "/v1/rules",
        Some(&admin_user_token(&admin)),
        Some(json!({ "pattern": "[unclosed", "action": "AUTO_ACCEPT" })),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"]["code"], "INVALID_PATTERN");
}

#[tokio::test]
async fn missing_command_is_not_found() {
    let app = cmdgw_api::app(test_state());
    let (status, body) = send(
        &app,
        "GET",
        &format!("/v1/commands/{}", uuid::Uuid::new_v4()),
        Some(&admin_token()),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "NOT_FOUND");
}

#[tokio::test]
async fn conflict_check_reports_overlap() {
    let app = cmdgw_api::app(test_state());
    let admin = register_user(&app, "ada", "admin").await;

    send(
        &app,
        "POST",
        "/v1/rules",
        Some(&admin_user_token(&admin)),
        Some(json!({ "pattern": "^deploy", "action": "AUTO_ACCEPT" })),
    )
    .await;

    let (status, body) = send(
        &app,
        "POST",
        "/v1/rules/conflicts",
        Some(&admin_user_token(&admin)),
        Some(json!({ "pattern": "^deploy", "action": "AUTO_REJECT" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let conflicts = body["conflicts"].as_array().unwrap();
    assert!(!conflicts.is_empty());
    assert_eq!(conflicts[0]["kind"], "exact_duplicate");
}

#[tokio::test]
async fn audit_log_is_admin_only_and_filterable() {
    let app = cmdgw_api::app(test_state());
    let member = register_user(&app, "mel", "member").await;

    let (status, _) = send(
        &app,
        "GET",
        "/v1/audit",
        Some(&member_token(&member)),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = send(
        &app,
        "GET",
        "/v1/audit?event_type=USER_CREATED",
        Some(&admin_token()),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let entries = body["entries"].as_array().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0]["event_type"], "USER_CREATED");
}
