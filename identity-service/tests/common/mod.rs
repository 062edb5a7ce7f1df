//! Shared setup for the router-level tests: an in-memory store, mock
//! collaborators and a clock the tests move by hand.

#![allow(dead_code)]

use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    Router,
};
use chrono::{DateTime, TimeZone, Utc};
use http_body_util::BodyExt;
use identity_service::{
    build_router,
    config::{
        AuthConfig, CollaboratorConfig, Environment, GoogleConfig, JwtConfig, MongoConfig,
        OtpConfig, RateLimitConfig, SecurityConfig,
    },
    models::{AccountKind, AuthProvider, Identity, StaffProfile},
    services::{
        Clock, CredentialStore, GoogleProfile, InMemoryStore, ManualClock, MockGoogleVerifier,
        MockNotifier, MockSmsGateway, PermissionCatalog,
    },
    utils::hash_password,
    AppState,
};
use secrecy::SecretString;
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

pub const TEST_SECRET: &str = "integration-test-secret-0123456789abcdef";

pub fn test_start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 2, 9, 30, 0).unwrap()
}

pub fn test_config() -> AuthConfig {
    AuthConfig {
        common: service_core::config::Config::default(),
        environment: Environment::Dev,
        service_name: "identity-service".to_string(),
        service_version: "test".to_string(),
        log_level: "error".to_string(),
        otlp_endpoint: None,
        mongodb: MongoConfig {
            uri: "mongodb://localhost:27017".to_string(),
            database: "estate_test".to_string(),
            timeout_seconds: 2,
        },
        jwt: JwtConfig {
            secret: SecretString::new(TEST_SECRET.to_string()),
            token_expiry_days: 7,
        },
        otp: OtpConfig::default(),
        notification: CollaboratorConfig {
            url: None,
            enabled: false,
            timeout_seconds: 2,
        },
        sms: CollaboratorConfig {
            url: None,
            enabled: false,
            timeout_seconds: 2,
        },
        google: GoogleConfig::default(),
        security: SecurityConfig {
            allowed_origins: vec!["http://localhost:3000".to_string()],
        },
        rate_limit: RateLimitConfig::default(),
    }
}

pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub store: Arc<InMemoryStore>,
    pub notifier: Arc<MockNotifier>,
    pub sms: Arc<MockSmsGateway>,
    pub google: Arc<MockGoogleVerifier>,
    pub clock: Arc<ManualClock>,
}

impl TestApp {
    pub fn new() -> Self {
        Self::build(test_config(), MockNotifier::new())
    }

    pub fn with_config(config: AuthConfig) -> Self {
        Self::build(config, MockNotifier::new())
    }

    pub fn with_notifier(notifier: MockNotifier) -> Self {
        Self::build(test_config(), notifier)
    }

    fn build(config: AuthConfig, notifier: MockNotifier) -> Self {
        let store = Arc::new(InMemoryStore::new());
        let notifier = Arc::new(notifier);
        let sms = Arc::new(MockSmsGateway::new());
        let google = Arc::new(MockGoogleVerifier::new());
        let clock = Arc::new(ManualClock::new(test_start()));

        let state = AppState::new(
            config,
            store.clone(),
            store.clone(),
            notifier.clone(),
            sms.clone(),
            google.clone(),
            clock.clone(),
        )
        .expect("state");
        let router = build_router(state.clone()).expect("router");

        Self {
            router,
            state,
            store,
            notifier,
            sms,
            google,
            clock,
        }
    }

    pub async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, body)
    }

    pub async fn call(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        self.send(request).await
    }

    pub async fn post(&self, uri: &str, body: Value) -> (StatusCode, Value) {
        self.call(Method::POST, uri, None, Some(body)).await
    }

    /// Make `id_token` verify as a Google account with this email.
    pub fn google_account(&self, id_token: &str, email: &str, verified: bool) {
        self.google.accept(
            id_token,
            GoogleProfile {
                subject: format!("google-{}", id_token),
                email: email.to_string(),
                email_verified: verified,
                name: None,
                given_name: Some("Gita".to_string()),
                family_name: Some("Rao".to_string()),
            },
        );
    }

    pub async fn register(&self, body: Value) -> (StatusCode, Value) {
        self.post("/api/auth/register", body).await
    }

    /// Register with email and phone and return the issued token.
    pub async fn register_user(&self, name: &str, email: &str, phone: &str, password: &str) -> String {
        let (status, body) = self
            .register(json!({
                "name": name,
                "email": email,
                "phone": phone,
                "password": password,
            }))
            .await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        body["data"]["token"].as_str().unwrap().to_string()
    }

    /// Insert an identity directly, bypassing the public sign-up rules.
    pub async fn seed(&self, mut identity: Identity, password: &str) -> Identity {
        identity.password_hash = Some(hash_password(password).unwrap());
        self.store.insert_identity(&identity).await.unwrap();
        identity
    }

    pub async fn seed_admin(&self) -> (Identity, String) {
        let admin = Identity::new(
            "Site Admin".to_string(),
            Some("admin@estate.example".to_string()),
            None,
            AccountKind::Admin,
            AuthProvider::Password,
            self.clock.now(),
        )
        .unwrap();
        let admin = self.seed(admin, "AdminPass1").await;
        let token = self.state.tokens.issue_for(&admin).unwrap();
        (admin, token)
    }

    pub async fn seed_staff(&self, username: &str, role: &str) -> (Identity, String) {
        let catalog = PermissionCatalog::standard();
        let mut staff = Identity::new(
            format!("Staff {}", username),
            Some(format!("{}@estate.example", username)),
            None,
            AccountKind::Staff,
            AuthProvider::Password,
            self.clock.now(),
        )
        .unwrap();
        staff.username = Some(username.to_string());
        staff.staff = Some(StaffProfile {
            role: role.to_string(),
            permissions: catalog.permissions_for(role).to_vec(),
            is_first_login: false,
            created_by: None,
        });
        let staff = self.seed(staff, "StaffPass1").await;
        let token = self.state.tokens.issue_for(&staff).unwrap();
        (staff, token)
    }
}
