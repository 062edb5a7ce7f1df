use service_core::error::AppError;
use thiserror::Error;

use super::store::StoreError;

/// Failure taxonomy of the identity core. Messages for credential and OTP
/// failures are deliberately identical whatever the underlying cause.
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("{0}")]
    InvalidInput(String),

    #[error("An account with this email or phone already exists")]
    DuplicateIdentity,

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Invalid or expired OTP")]
    OtpInvalidOrExpired,

    #[error("Token expired")]
    TokenExpired,

    #[error("Invalid token")]
    TokenInvalid,

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    NotFound(String),

    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl ServiceError {
    pub fn invalid(message: impl Into<String>) -> Self {
        ServiceError::InvalidInput(message.into())
    }
}

impl From<StoreError> for ServiceError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Duplicate(_) => ServiceError::DuplicateIdentity,
            StoreError::Unavailable(msg) => ServiceError::StoreUnavailable(msg),
        }
    }
}

impl From<ServiceError> for AppError {
    fn from(err: ServiceError) -> Self {
        let message = err.to_string();
        match err {
            ServiceError::InvalidInput(_) | ServiceError::OtpInvalidOrExpired => {
                AppError::BadRequest(anyhow::anyhow!(message))
            }
            ServiceError::DuplicateIdentity => AppError::Conflict(anyhow::anyhow!(message)),
            ServiceError::InvalidCredentials
            | ServiceError::TokenExpired
            | ServiceError::TokenInvalid => AppError::Unauthorized(anyhow::anyhow!(message)),
            ServiceError::Forbidden(_) => AppError::Forbidden(anyhow::anyhow!(message)),
            ServiceError::NotFound(_) => AppError::NotFound(anyhow::anyhow!(message)),
            ServiceError::StoreUnavailable(msg) => AppError::ServiceUnavailable(msg),
            ServiceError::Internal(e) => AppError::InternalError(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use service_core::axum::http::StatusCode;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (ServiceError::invalid("bad"), StatusCode::BAD_REQUEST),
            (ServiceError::DuplicateIdentity, StatusCode::CONFLICT),
            (ServiceError::InvalidCredentials, StatusCode::UNAUTHORIZED),
            (ServiceError::OtpInvalidOrExpired, StatusCode::BAD_REQUEST),
            (ServiceError::TokenExpired, StatusCode::UNAUTHORIZED),
            (ServiceError::TokenInvalid, StatusCode::UNAUTHORIZED),
            (ServiceError::Forbidden("no".into()), StatusCode::FORBIDDEN),
            (ServiceError::NotFound("gone".into()), StatusCode::NOT_FOUND),
            (
                ServiceError::StoreUnavailable("timeout".into()),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
        ];

        for (err, status) in cases {
            assert_eq!(AppError::from(err).status_code(), status);
        }
    }

    #[test]
    fn test_duplicate_key_becomes_duplicate_identity() {
        let err: ServiceError = StoreError::Duplicate("email".into()).into();
        assert!(matches!(err, ServiceError::DuplicateIdentity));
    }
}
