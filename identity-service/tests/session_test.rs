mod common;

use axum::http::{Method, StatusCode};
use chrono::Duration;
use common::TestApp;
use identity_service::services::CredentialStore;
use serde_json::json;

#[tokio::test]
async fn test_token_valid_until_exactly_seven_days() {
    let app = TestApp::new();
    let token = app
        .register_user("Asha", "a@x.com", "9998887770", "Secret123")
        .await;

    app.clock.advance(Duration::days(7) - Duration::seconds(1));
    let (status, _) = app
        .call(Method::GET, "/api/auth/profile", Some(&token), None)
        .await;
    assert_eq!(status, StatusCode::OK);

    app.clock.advance(Duration::seconds(1));
    let (status, body) = app
        .call(Method::GET, "/api/auth/profile", Some(&token), None)
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "Token expired");
}

#[tokio::test]
async fn test_profile_requires_bearer_token() {
    let app = TestApp::new();

    let (status, body) = app.call(Method::GET, "/api/auth/profile", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "Invalid token");

    let (status, _) = app
        .call(Method::GET, "/api/auth/profile", Some("not.a.token"), None)
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_token_from_other_secret_rejected() {
    let app = TestApp::new();
    let token = app
        .register_user("Asha", "a@x.com", "9998887770", "Secret123")
        .await;

    let mut config = common::test_config();
    config.jwt.secret = secrecy::SecretString::new("a-completely-different-secret-value!!".to_string());
    let other = TestApp::with_config(config);

    let (status, _) = other
        .call(Method::GET, "/api/auth/profile", Some(&token), None)
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_profile_roundtrip() {
    let app = TestApp::new();
    let token = app
        .register_user("Asha", "a@x.com", "9998887770", "Secret123")
        .await;

    let (status, body) = app
        .call(Method::GET, "/api/auth/profile", Some(&token), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["name"], "Asha");
    assert!(body["data"].get("password_hash").is_none());

    let (status, body) = app
        .call(
            Method::PUT,
            "/api/auth/profile",
            Some(&token),
            Some(json!({
                "name": "Asha K",
                "favorites": ["listing-1", "listing-2", "listing-1"],
                "preferences": {
                    "property_types": ["apartment"],
                    "price_range": { "min": 100000, "max": 900000 },
                    "locations": ["Pune"]
                }
            })),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["message"], "Profile updated successfully");
    assert_eq!(body["data"]["name"], "Asha K");
    assert_eq!(body["data"]["favorites"], json!(["listing-1", "listing-2"]));
    assert_eq!(body["data"]["preferences"]["locations"], json!(["Pune"]));
}

#[tokio::test]
async fn test_profile_rejects_inverted_price_range() {
    let app = TestApp::new();
    let token = app
        .register_user("Asha", "a@x.com", "9998887770", "Secret123")
        .await;

    let (status, _) = app
        .call(
            Method::PUT,
            "/api/auth/profile",
            Some(&token),
            Some(json!({ "preferences": { "price_range": { "min": 10, "max": 5 } } })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_profile_of_deleted_identity_is_not_found() {
    let app = TestApp::new();
    let (admin, token) = app.seed_admin().await;
    assert!(app.store.delete_identity(&admin.id).await.unwrap());

    let (status, body) = app
        .call(Method::GET, "/api/auth/profile", Some(&token), None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "User not found");
}

#[tokio::test]
async fn test_introspect_reports_token_state() {
    let app = TestApp::new();
    let token = app
        .register_user("Asha", "a@x.com", "9998887770", "Secret123")
        .await;

    let (status, body) = app
        .post("/api/auth/introspect", json!({ "token": token }))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["active"], true);
    assert_eq!(body["data"]["account_kind"], "buyer");
    assert_eq!(body["data"]["email"], "a@x.com");

    app.clock.advance(Duration::days(8));
    let (status, body) = app
        .post("/api/auth/introspect", json!({ "token": token }))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["active"], false);
    assert!(body["data"].get("sub").is_none());

    let (_, body) = app
        .post("/api/auth/introspect", json!({ "token": "garbage" }))
        .await;
    assert_eq!(body["data"]["active"], false);
}
