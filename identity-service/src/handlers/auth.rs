use axum::{extract::State, http::StatusCode, Json};
use service_core::error::AppError;

use crate::{
    dtos::{
        auth::{
            GoogleLoginRequest, IntrospectRequest, IntrospectResponse, LoginRequest,
            RegisterRequest, SessionResponse, UpdateProfileRequest,
        },
        ApiResponse, ErrorBody,
    },
    middleware::AuthUser,
    models::IdentityView,
    services::Session,
    utils::ValidatedJson,
    AppState,
};

fn session_response(session: Session) -> ApiResponse<SessionResponse> {
    ApiResponse::ok(SessionResponse {
        user: session.identity.into(),
        token: session.token,
    })
    .with_message(session.message)
}

/// Register a buyer, seller or agent
#[utoipa::path(
    post,
    path = "/api/auth/register",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "Registered and signed in", body = SessionResponse),
        (status = 400, description = "Invalid input", body = ErrorBody),
        (status = 409, description = "Email or phone already registered", body = ErrorBody),
        (status = 429, description = "Too many requests", body = ErrorBody)
    ),
    tag = "Authentication"
)]
pub async fn register(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<RegisterRequest>,
) -> Result<(StatusCode, Json<ApiResponse<SessionResponse>>), AppError> {
    let session = state.auth.register(req).await?;
    Ok(session_response(session).created())
}

/// Sign in with a password
#[utoipa::path(
    post,
    path = "/api/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Signed in", body = SessionResponse),
        (status = 401, description = "Invalid credentials", body = ErrorBody),
        (status = 403, description = "Account not active", body = ErrorBody),
        (status = 429, description = "Too many requests", body = ErrorBody)
    ),
    tag = "Authentication"
)]
pub async fn login(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<LoginRequest>,
) -> Result<ApiResponse<SessionResponse>, AppError> {
    let session = state.auth.login(req).await?;
    Ok(session_response(session))
}

/// Sign in with a Google ID token
#[utoipa::path(
    post,
    path = "/api/auth/google",
    request_body = GoogleLoginRequest,
    responses(
        (status = 200, description = "Signed in", body = SessionResponse),
        (status = 400, description = "Missing token or unverified Google email", body = ErrorBody),
        (status = 401, description = "Google did not vouch for the token", body = ErrorBody),
        (status = 403, description = "Account must sign in with a password", body = ErrorBody),
        (status = 503, description = "Google sign-in unavailable", body = ErrorBody)
    ),
    tag = "Authentication"
)]
pub async fn google_login(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<GoogleLoginRequest>,
) -> Result<ApiResponse<SessionResponse>, AppError> {
    let session = state.auth.google_login(req).await?;
    Ok(session_response(session))
}

/// Report whether a token is currently valid
#[utoipa::path(
    post,
    path = "/api/auth/introspect",
    request_body = IntrospectRequest,
    responses((status = 200, description = "Token state", body = IntrospectResponse)),
    tag = "Authentication"
)]
pub async fn introspect(
    State(state): State<AppState>,
    Json(req): Json<IntrospectRequest>,
) -> ApiResponse<IntrospectResponse> {
    ApiResponse::ok(state.auth.introspect(&req.token))
}

/// Current user's profile
#[utoipa::path(
    get,
    path = "/api/auth/profile",
    responses(
        (status = 200, description = "Profile", body = IdentityView),
        (status = 401, description = "Missing, invalid or expired token", body = ErrorBody),
        (status = 404, description = "Identity no longer exists", body = ErrorBody)
    ),
    security(("bearer_auth" = [])),
    tag = "Profile"
)]
pub async fn get_profile(
    State(state): State<AppState>,
    AuthUser(claims): AuthUser,
) -> Result<ApiResponse<IdentityView>, AppError> {
    let identity = state.auth.profile(&claims.sub).await?;
    Ok(ApiResponse::ok(identity.into()))
}

/// Update the current user's profile
#[utoipa::path(
    put,
    path = "/api/auth/profile",
    request_body = UpdateProfileRequest,
    responses(
        (status = 200, description = "Updated profile", body = IdentityView),
        (status = 400, description = "Invalid input", body = ErrorBody),
        (status = 401, description = "Missing, invalid or expired token", body = ErrorBody),
        (status = 409, description = "Phone already in use", body = ErrorBody)
    ),
    security(("bearer_auth" = [])),
    tag = "Profile"
)]
pub async fn update_profile(
    State(state): State<AppState>,
    AuthUser(claims): AuthUser,
    ValidatedJson(req): ValidatedJson<UpdateProfileRequest>,
) -> Result<ApiResponse<IdentityView>, AppError> {
    let identity = state.auth.update_profile(&claims.sub, req).await?;
    Ok(ApiResponse::ok(identity.into()).with_message("Profile updated successfully"))
}
