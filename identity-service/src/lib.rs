pub mod config;
pub mod dtos;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod services;
pub mod utils;

use axum::{
    extract::State,
    http::{header, HeaderValue, Method, Request},
    middleware::{from_fn, from_fn_with_state},
    routing::{get, post, put},
    Json, Router,
};
use service_core::error::AppError;
use service_core::middleware::{
    metrics::metrics_middleware,
    rate_limit::{create_ip_rate_limiter, ip_rate_limit_middleware, IpRateLimiter},
    security_headers::security_headers_middleware,
    tracing::{request_id_middleware, REQUEST_ID_HEADER},
};
use std::sync::Arc;
use std::time::Duration;
use tower_http::{cors::CorsLayer, timeout::TimeoutLayer, trace::TraceLayer};
use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};

use crate::config::AuthConfig;
use crate::middleware::{enforce_access, require_authenticated, require_role};
use crate::models::AccountKind;
use crate::services::{
    AuthService, Clock, CredentialStore, GoogleVerifier, OtpService, OtpStore, PermissionCatalog,
    ServiceError, SmsGateway, StaffService, TokenService, WelcomeNotifier,
};

#[derive(OpenApi)]
#[openapi(
    paths(
        health_check,
        handlers::metrics::metrics,
        handlers::auth::register,
        handlers::auth::login,
        handlers::auth::google_login,
        handlers::auth::introspect,
        handlers::auth::get_profile,
        handlers::auth::update_profile,
        handlers::otp::send_otp,
        handlers::otp::verify_otp,
        handlers::staff::list_roles,
        handlers::staff::list_staff,
        handlers::staff::create_staff,
        handlers::staff::update_staff,
        handlers::staff::set_staff_status,
        handlers::staff::set_staff_password,
        handlers::staff::delete_staff,
    ),
    components(
        schemas(
            dtos::ErrorBody,
            dtos::MessageResponse,
            dtos::auth::RegisterRequest,
            dtos::auth::LoginRequest,
            dtos::auth::SendOtpRequest,
            dtos::auth::VerifyOtpRequest,
            dtos::auth::GoogleLoginRequest,
            dtos::auth::IntrospectRequest,
            dtos::auth::IntrospectResponse,
            dtos::auth::SessionResponse,
            dtos::auth::AgentProfileUpdate,
            dtos::auth::UpdateProfileRequest,
            dtos::staff::CreateStaffRequest,
            dtos::staff::UpdateStaffRequest,
            dtos::staff::StaffStatusRequest,
            dtos::staff::StaffPasswordRequest,
            dtos::staff::StaffCredentials,
            dtos::staff::CreatedStaffResponse,
            models::AccountKind,
            models::IdentityStatus,
            models::AuthProvider,
            models::AgentProfile,
            models::PriceRange,
            models::Preferences,
            models::IdentityView,
            services::RoleDefinition,
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Authentication", description = "Registration, password, federated sign-in and token checks"),
        (name = "OTP", description = "Phone one-time code sign-in"),
        (name = "Profile", description = "The signed-in identity"),
        (name = "Staff", description = "Staff accounts and roles"),
        (name = "Observability", description = "Service health and monitoring"),
    )
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub config: AuthConfig,
    pub auth: AuthService,
    pub staff: StaffService,
    pub tokens: TokenService,
    pub catalog: PermissionCatalog,
    pub store: Arc<dyn CredentialStore>,
    pub login_rate_limiter: IpRateLimiter,
    pub register_rate_limiter: IpRateLimiter,
    pub otp_rate_limiter: IpRateLimiter,
    pub verify_otp_rate_limiter: IpRateLimiter,
    pub ip_rate_limiter: IpRateLimiter,
}

impl AppState {
    /// Wire the services over the given store and collaborators.
    pub fn new(
        config: AuthConfig,
        store: Arc<dyn CredentialStore>,
        otp_store: Arc<dyn OtpStore>,
        notifier: Arc<dyn WelcomeNotifier>,
        sms: Arc<dyn SmsGateway>,
        google: Arc<dyn GoogleVerifier>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, AppError> {
        let catalog = PermissionCatalog::standard();
        let tokens = TokenService::new(&config.jwt, clock.clone())?;
        let otp = OtpService::new(otp_store, sms, clock.clone(), config.otp.clone())?;
        let auth = AuthService::new(
            store.clone(),
            tokens.clone(),
            otp,
            google,
            notifier,
            clock.clone(),
        );
        let staff = StaffService::new(store.clone(), catalog.clone(), clock);

        let limits = &config.rate_limit;
        let limiter = |attempts, window_seconds| {
            create_ip_rate_limiter(attempts, window_seconds, limits.trust_forwarded_for)
        };
        let login_rate_limiter = limiter(limits.login_attempts, limits.login_window_seconds);
        let register_rate_limiter =
            limiter(limits.register_attempts, limits.register_window_seconds);
        let otp_rate_limiter = limiter(limits.otp_attempts, limits.otp_window_seconds);
        let verify_otp_rate_limiter =
            limiter(limits.verify_otp_attempts, limits.verify_otp_window_seconds);
        let ip_rate_limiter = limiter(limits.global_ip_limit, limits.global_ip_window_seconds);

        Ok(Self {
            config,
            auth,
            staff,
            tokens,
            catalog,
            store,
            login_rate_limiter,
            register_rate_limiter,
            otp_rate_limiter,
            verify_otp_rate_limiter,
            ip_rate_limiter,
        })
    }
}

fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::error!(origin = %origin, error = %e, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
}

pub fn build_router(state: AppState) -> Result<Router, AppError> {
    let staff_gate = require_role(state.catalog.clone(), AccountKind::Admin, "staff.manage");
    let roles_gate = require_role(state.catalog.clone(), AccountKind::Admin, "roles.manage");

    let staff_routes = Router::new()
        .route(
            "/api/admin/staff",
            get(handlers::staff::list_staff).post(handlers::staff::create_staff),
        )
        .route(
            "/api/admin/staff/:staff_id",
            put(handlers::staff::update_staff).delete(handlers::staff::delete_staff),
        )
        .route(
            "/api/admin/staff/:staff_id/status",
            axum::routing::patch(handlers::staff::set_staff_status),
        )
        .route(
            "/api/admin/staff/:staff_id/password",
            put(handlers::staff::set_staff_password),
        )
        .route_layer(from_fn_with_state(staff_gate, enforce_access))
        .route_layer(from_fn_with_state(state.clone(), require_authenticated));

    let roles_routes = Router::new()
        .route("/api/admin/roles", get(handlers::staff::list_roles))
        .route_layer(from_fn_with_state(roles_gate, enforce_access))
        .route_layer(from_fn_with_state(state.clone(), require_authenticated));

    let profile_routes = Router::new()
        .route(
            "/api/auth/profile",
            get(handlers::auth::get_profile).put(handlers::auth::update_profile),
        )
        .route_layer(from_fn_with_state(state.clone(), require_authenticated));

    let login_route = Router::new()
        .route("/api/auth/login", post(handlers::auth::login))
        .route_layer(from_fn_with_state(
            state.login_rate_limiter.clone(),
            ip_rate_limit_middleware,
        ));

    let register_route = Router::new()
        .route("/api/auth/register", post(handlers::auth::register))
        .route_layer(from_fn_with_state(
            state.register_rate_limiter.clone(),
            ip_rate_limit_middleware,
        ));

    let otp_route = Router::new()
        .route("/api/auth/send-otp", post(handlers::otp::send_otp))
        .route_layer(from_fn_with_state(
            state.otp_rate_limiter.clone(),
            ip_rate_limit_middleware,
        ));

    let verify_otp_route = Router::new()
        .route("/api/auth/verify-otp", post(handlers::otp::verify_otp))
        .route_layer(from_fn_with_state(
            state.verify_otp_rate_limiter.clone(),
            ip_rate_limit_middleware,
        ));

    let ip_limiter = state.ip_rate_limiter.clone();
    let request_timeout = Duration::from_secs(state.config.common.request_timeout_seconds);
    let cors = cors_layer(&state.config.security.allowed_origins);

    let app = Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(handlers::metrics::metrics))
        .route(
            "/.well-known/openapi.json",
            get(|| async { Json(ApiDoc::openapi()) }),
        )
        .route("/api/auth/google", post(handlers::auth::google_login))
        .route("/api/auth/introspect", post(handlers::auth::introspect))
        .merge(login_route)
        .merge(register_route)
        .merge(otp_route)
        .merge(verify_otp_route)
        .merge(profile_routes)
        .merge(roles_routes)
        .merge(staff_routes)
        .with_state(state)
        .layer(from_fn_with_state(ip_limiter, ip_rate_limit_middleware))
        .layer(from_fn(metrics_middleware))
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &Request<_>| {
                let request_id = request
                    .headers()
                    .get(REQUEST_ID_HEADER)
                    .and_then(|value| value.to_str().ok())
                    .unwrap_or("-");

                tracing::info_span!(
                    "http_request",
                    request_id = %request_id,
                    method = %request.method(),
                    uri = %request.uri(),
                    version = ?request.version(),
                )
            }),
        )
        .layer(from_fn(request_id_middleware))
        .layer(from_fn(security_headers_middleware))
        .layer(TimeoutLayer::new(request_timeout))
        .layer(cors);

    Ok(app)
}

/// Service health check
#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service is healthy"),
        (status = 503, description = "Credential store unreachable")
    ),
    tag = "Observability"
)]
pub async fn health_check(
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, AppError> {
    state.store.health_check().await.map_err(|e| {
        tracing::error!(error = %e, "Credential store health check failed");
        ServiceError::from(e)
    })?;

    Ok(Json(serde_json::json!({
        "status": "healthy",
        "service": state.config.service_name,
        "version": state.config.service_version,
        "environment": format!("{:?}", state.config.environment),
        "checks": {
            "credential_store": "up"
        }
    })))
}
