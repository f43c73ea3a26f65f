use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode},
};
use http_body_util::BodyExt;
use keyvend::config::Config;
use tower::ServiceExt;

/// Default API key seeded by migration (must match m20260715_initial.rs)
const ADMIN_API_KEY: &str = "keyvend_default_admin_api_key_please_regenerate";

fn test_config() -> Config {
    let mut config = Config::default();
    config.general.database_path = "sqlite::memory:".to_string();
    // Keep password hashing cheap in tests
    config.security.argon2_memory_cost_kib = 1024;
    config.security.argon2_time_cost = 1;
    config
}

async fn spawn_app() -> Router {
    let state = keyvend::api::create_app_state_from_config(test_config(), None)
        .await
        .expect("Failed to create app state");
    keyvend::api::router(state).await
}

async fn request(
    app: &Router,
    method: &str,
    uri: &str,
    api_key: Option<&str>,
    body: Option<serde_json::Value>,
) -> (StatusCode, serde_json::Value) {
    let mut builder = Request::builder().method(method).uri(uri);

    if let Some(key) = api_key {
        builder = builder.header("X-Api-Key", key);
    }

    let request = match body {
        Some(json) => builder
            .header("Content-Type", "application/json")
            .body(Body::from(serde_json::to_string(&json).unwrap()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json = if bytes.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null)
    };

    (status, json)
}

/// Register a user and return its API key.
async fn register_and_login(app: &Router, username: &str) -> String {
    let (status, _) = request(
        app,
        "POST",
        "/api/register",
        None,
        Some(serde_json::json!({
            "username": username,
            "password": "secret1",
            "email": format!("{username}@example.com"),
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = request(
        app,
        "POST",
        "/api/login",
        None,
        Some(serde_json::json!({
            "username": username,
            "password": "secret1",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    body["data"]["api_key"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn test_auth_gates() {
    let app = spawn_app().await;

    let (status, _) = request(&app, "GET", "/api/me", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = request(&app, "GET", "/api/me", Some("wrong-key"), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = request(&app, "GET", "/api/me", Some(ADMIN_API_KEY), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["username"], "admin");
    assert_eq!(body["data"]["is_admin"], true);
}

#[tokio::test]
async fn test_register_validation() {
    let app = spawn_app().await;

    let (status, _) = request(
        &app,
        "POST",
        "/api/register",
        None,
        Some(serde_json::json!({
            "username": "alice",
            "password": "12345",
            "email": "alice@example.com",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = request(
        &app,
        "POST",
        "/api/register",
        None,
        Some(serde_json::json!({
            "username": "alice",
            "password": "secret1",
            "email": "not-an-email",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = request(
        &app,
        "POST",
        "/api/register",
        None,
        Some(serde_json::json!({
            "username": "alice",
            "password": "secret1",
            "email": "alice@example.com",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["balance"], 0);
    assert_eq!(body["data"]["is_admin"], false);

    // Duplicate username
    let (status, _) = request(
        &app,
        "POST",
        "/api/register",
        None,
        Some(serde_json::json!({
            "username": "alice",
            "password": "secret1",
            "email": "alice2@example.com",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_login_rejects_bad_credentials() {
    let app = spawn_app().await;
    register_and_login(&app, "carol").await;

    let (status, _) = request(
        &app,
        "POST",
        "/api/login",
        None,
        Some(serde_json::json!({
            "username": "carol",
            "password": "wrong-password",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = request(
        &app,
        "POST",
        "/api/login",
        None,
        Some(serde_json::json!({
            "username": "nobody",
            "password": "whatever",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_deposit_and_purchase_flow() {
    let app = spawn_app().await;
    let alice_key = register_and_login(&app, "alice").await;

    // Create a deposit
    let (status, body) = request(
        &app,
        "POST",
        "/api/deposits",
        Some(&alice_key),
        Some(serde_json::json!({"amount": 50000, "note": "bank transfer"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "pending");
    let deposit_id = body["data"]["id"].as_i64().unwrap();

    // A non-admin must not approve
    let (status, _) = request(
        &app,
        "POST",
        &format!("/api/admin/deposits/{deposit_id}/approve"),
        Some(&alice_key),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    // Admin sees it with the username attached
    let (status, body) = request(&app, "GET", "/api/admin/deposits", Some(ADMIN_API_KEY), None).await;
    assert_eq!(status, StatusCode::OK);
    let items = body["data"].as_array().unwrap();
    assert!(items
        .iter()
        .any(|d| d["id"].as_i64() == Some(deposit_id) && d["username"] == "alice"));

    // Approve credits the balance
    let (status, body) = request(
        &app,
        "POST",
        &format!("/api/admin/deposits/{deposit_id}/approve"),
        Some(ADMIN_API_KEY),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["balance"], 50000);

    // Approving again is a conflict, not a second credit
    let (status, _) = request(
        &app,
        "POST",
        &format!("/api/admin/deposits/{deposit_id}/approve"),
        Some(ADMIN_API_KEY),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (_, body) = request(&app, "GET", "/api/me", Some(&alice_key), None).await;
    assert_eq!(body["data"]["balance"], 50000);

    // Buy the 1d pack
    let (status, body) = request(
        &app,
        "POST",
        "/api/keys/purchase",
        Some(&alice_key),
        Some(serde_json::json!({"pack": "1d"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["price"], 15000);
    assert_eq!(body["data"]["balance"], 35000);
    assert_eq!(body["data"]["key"]["duration_minutes"], 1440);
    assert_eq!(body["data"]["key"]["is_expired"], false);
    assert!(body["data"]["key"]["expires_at"].is_string());
    let code = body["data"]["key"]["code"].as_str().unwrap();
    assert!(code.starts_with("keyvend-1d-"));

    // The life pack is out of reach now
    let (status, _) = request(
        &app,
        "POST",
        "/api/keys/purchase",
        Some(&alice_key),
        Some(serde_json::json!({"pack": "life"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (_, body) = request(&app, "GET", "/api/me", Some(&alice_key), None).await;
    assert_eq!(body["data"]["balance"], 35000);

    // An unknown pack is rejected before any money moves
    let (status, _) = request(
        &app,
        "POST",
        "/api/keys/purchase",
        Some(&alice_key),
        Some(serde_json::json!({"pack": "7d"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (_, body) = request(&app, "GET", "/api/keys", Some(&alice_key), None).await;
    assert_eq!(body["data"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_reject_is_terminal() {
    let app = spawn_app().await;
    let bob_key = register_and_login(&app, "bob").await;

    let (_, body) = request(
        &app,
        "POST",
        "/api/deposits",
        Some(&bob_key),
        Some(serde_json::json!({"amount": 10000})),
    )
    .await;
    let deposit_id = body["data"]["id"].as_i64().unwrap();

    let (status, _) = request(
        &app,
        "POST",
        &format!("/api/admin/deposits/{deposit_id}/reject"),
        Some(ADMIN_API_KEY),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    // No credit happened
    let (_, body) = request(&app, "GET", "/api/me", Some(&bob_key), None).await;
    assert_eq!(body["data"]["balance"], 0);

    // A later approve must fail
    let (status, _) = request(
        &app,
        "POST",
        &format!("/api/admin/deposits/{deposit_id}/approve"),
        Some(ADMIN_API_KEY),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (_, body) = request(&app, "GET", "/api/deposits", Some(&bob_key), None).await;
    assert_eq!(body["data"][0]["status"], "rejected");
}

#[tokio::test]
async fn test_admin_guards() {
    let app = spawn_app().await;
    let key = register_and_login(&app, "dave").await;

    for (method, uri) in [
        ("GET", "/api/admin/deposits"),
        ("GET", "/api/admin/users"),
        ("POST", "/api/admin/keys/manual-create"),
    ] {
        let body = (method == "POST").then(|| serde_json::json!({}));
        let (status, _) = request(&app, method, uri, Some(&key), body).await;
        assert_eq!(status, StatusCode::FORBIDDEN, "{method} {uri}");
    }

    let (status, _) = request(&app, "GET", "/api/admin/users", Some(ADMIN_API_KEY), None).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_delete_user_cascades() {
    let app = spawn_app().await;
    let eve_key = register_and_login(&app, "eve").await;

    let (_, body) = request(&app, "GET", "/api/me", Some(&eve_key), None).await;
    let eve_id = body["data"]["id"].as_i64().unwrap();

    for _ in 0..2 {
        let (status, _) = request(
            &app,
            "POST",
            "/api/deposits",
            Some(&eve_key),
            Some(serde_json::json!({"amount": 5000})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
    }

    for _ in 0..3 {
        let (status, _) = request(
            &app,
            "POST",
            "/api/admin/keys/manual-create",
            Some(ADMIN_API_KEY),
            Some(serde_json::json!({"time_label": "promo", "minutes": 60, "user_id": eve_id})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
    }

    // Admin accounts are protected
    let (_, body) = request(&app, "GET", "/api/admin/users", Some(ADMIN_API_KEY), None).await;
    let admin_id = body["data"]
        .as_array()
        .unwrap()
        .iter()
        .find(|u| u["username"] == "admin")
        .unwrap()["id"]
        .as_i64()
        .unwrap();

    let (status, _) = request(
        &app,
        "POST",
        &format!("/api/admin/users/{admin_id}/delete"),
        Some(ADMIN_API_KEY),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    // The detail view shows what will be removed
    let (_, body) = request(
        &app,
        "GET",
        &format!("/api/admin/users/{eve_id}"),
        Some(ADMIN_API_KEY),
        None,
    )
    .await;
    assert_eq!(body["data"]["deposits"].as_array().unwrap().len(), 2);
    assert_eq!(body["data"]["keys"].as_array().unwrap().len(), 3);

    let (status, _) = request(
        &app,
        "POST",
        &format!("/api/admin/users/{eve_id}/delete"),
        Some(ADMIN_API_KEY),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = request(
        &app,
        "GET",
        &format!("/api/admin/users/{eve_id}"),
        Some(ADMIN_API_KEY),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    // Eve's API key no longer authenticates
    let (status, _) = request(&app, "GET", "/api/me", Some(&eve_key), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_manual_key_issue() {
    let app = spawn_app().await;

    // Unassigned key
    let (status, body) = request(
        &app,
        "POST",
        "/api/admin/keys/manual-create",
        Some(ADMIN_API_KEY),
        Some(serde_json::json!({"time_label": "gift", "minutes": 0})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["data"]["user_id"].is_null());
    assert!(body["data"]["expires_at"].is_null());
    assert_eq!(body["data"]["is_expired"], false);
    let key_id = body["data"]["id"].as_i64().unwrap();

    // Assigning to a missing user fails
    let (status, _) = request(
        &app,
        "POST",
        "/api/admin/keys/manual-create",
        Some(ADMIN_API_KEY),
        Some(serde_json::json!({"time_label": "gift", "minutes": 0, "user_id": 9999})),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    // Device reset is idempotent
    for _ in 0..2 {
        let (status, _) = request(
            &app,
            "POST",
            &format!("/api/admin/keys/{key_id}/reset-device"),
            Some(ADMIN_API_KEY),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
    }

    // Delete, then delete again
    let (status, _) = request(
        &app,
        "POST",
        &format!("/api/admin/keys/{key_id}/delete"),
        Some(ADMIN_API_KEY),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = request(
        &app,
        "POST",
        &format!("/api/admin/keys/{key_id}/delete"),
        Some(ADMIN_API_KEY),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_adjust_balance_and_ledger() {
    let app = spawn_app().await;
    let key = register_and_login(&app, "frank").await;

    let (_, body) = request(&app, "GET", "/api/me", Some(&key), None).await;
    let frank_id = body["data"]["id"].as_i64().unwrap();

    let (status, body) = request(
        &app,
        "POST",
        &format!("/api/admin/users/{frank_id}/adjust-balance"),
        Some(ADMIN_API_KEY),
        Some(serde_json::json!({"delta": 1000, "reason": "compensation"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["balance"], 1000);

    // Cannot drive the balance negative
    let (status, _) = request(
        &app,
        "POST",
        &format!("/api/admin/users/{frank_id}/adjust-balance"),
        Some(ADMIN_API_KEY),
        Some(serde_json::json!({"delta": -2000})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // Zero delta is invalid
    let (status, _) = request(
        &app,
        "POST",
        &format!("/api/admin/users/{frank_id}/adjust-balance"),
        Some(ADMIN_API_KEY),
        Some(serde_json::json!({"delta": 0})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // The adjustment is audited
    let (status, body) = request(
        &app,
        "GET",
        &format!("/api/admin/users/{frank_id}/ledger"),
        Some(ADMIN_API_KEY),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let entries = body["data"].as_array().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0]["delta"], 1000);
    assert_eq!(entries[0]["kind"], "admin_adjustment");
    assert_eq!(entries[0]["reason"], "compensation");
}

#[tokio::test]
async fn test_api_key_regeneration() {
    let app = spawn_app().await;
    let old_key = register_and_login(&app, "heidi").await;

    let (status, body) = request(
        &app,
        "POST",
        "/api/api-key/regenerate",
        Some(&old_key),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let new_key = body["data"]["api_key"].as_str().unwrap().to_string();
    assert_ne!(new_key, old_key);

    // The old key stops authenticating; the new one works
    let (status, _) = request(&app, "GET", "/api/me", Some(&old_key), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = request(&app, "GET", "/api/me", Some(&new_key), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["username"], "heidi");
}

#[tokio::test]
async fn test_pack_catalog() {
    let app = spawn_app().await;
    let key = register_and_login(&app, "grace").await;

    let (status, body) = request(&app, "GET", "/api/packs", Some(&key), None).await;
    assert_eq!(status, StatusCode::OK);

    let packs = body["data"].as_array().unwrap();
    assert_eq!(packs.len(), 4);
    let life = packs.iter().find(|p| p["code"] == "life").unwrap();
    assert_eq!(life["price"], 150000);
    assert_eq!(life["minutes"], 0);
}

#[tokio::test]
async fn test_service_status() {
    let app = spawn_app().await;

    let (status, body) = request(&app, "GET", "/", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["service"], "keyvend");
}
