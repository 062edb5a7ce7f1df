use axum::extract::State;
use service_core::error::AppError;

use crate::{
    dtos::{
        auth::{SendOtpRequest, SessionResponse, VerifyOtpRequest},
        ApiResponse, ErrorBody, MessageResponse,
    },
    utils::ValidatedJson,
    AppState,
};

/// Text a one-time code to a phone
#[utoipa::path(
    post,
    path = "/api/auth/send-otp",
    request_body = SendOtpRequest,
    responses(
        (status = 200, description = "Code sent", body = MessageResponse),
        (status = 400, description = "Invalid phone", body = ErrorBody),
        (status = 503, description = "SMS delivery unavailable", body = ErrorBody)
    ),
    tag = "OTP"
)]
pub async fn send_otp(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<SendOtpRequest>,
) -> Result<ApiResponse<MessageResponse>, AppError> {
    state.auth.send_otp(&req.phone).await?;
    Ok(ApiResponse::ok(MessageResponse::new("OTP sent successfully")))
}

/// Exchange a one-time code for a session
#[utoipa::path(
    post,
    path = "/api/auth/verify-otp",
    request_body = VerifyOtpRequest,
    responses(
        (status = 200, description = "Signed in", body = SessionResponse),
        (status = 400, description = "Invalid or expired OTP", body = ErrorBody)
    ),
    tag = "OTP"
)]
pub async fn verify_otp(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<VerifyOtpRequest>,
) -> Result<ApiResponse<SessionResponse>, AppError> {
    let session = state.auth.verify_otp(&req.phone, &req.otp).await?;
    Ok(ApiResponse::ok(SessionResponse {
        user: session.identity.into(),
        token: session.token,
    })
    .with_message(session.message))
}
