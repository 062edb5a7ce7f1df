use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

use crate::models::{AccountKind, IdentityView, Preferences};
use crate::services::token::Claims;

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct RegisterRequest {
    #[validate(length(max = 120, message = "Name is too long"))]
    #[schema(example = "Asha")]
    pub name: String,

    #[validate(length(max = 254, message = "Email is too long"))]
    #[schema(example = "a@x.com")]
    pub email: Option<String>,

    #[validate(length(max = 20, message = "Phone is too long"))]
    #[schema(example = "9998887770")]
    pub phone: Option<String>,

    #[validate(length(max = 256, message = "Password is too long"))]
    #[schema(example = "Secret123")]
    pub password: String,

    /// buyer, seller or agent. Defaults to buyer.
    #[schema(example = "seller")]
    pub account_kind: Option<String>,

    /// Agent-only extras
    pub experience: Option<u32>,
    pub specializations: Option<Vec<String>>,
    pub service_areas: Option<Vec<String>>,
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct LoginRequest {
    #[schema(example = "a@x.com")]
    pub email: Option<String>,

    #[schema(example = "9998887770")]
    pub phone: Option<String>,

    /// Staff sign in with their username.
    pub username: Option<String>,

    #[validate(length(min = 1, message = "Password is required"))]
    #[schema(example = "Secret123")]
    pub password: String,

    /// Restricts the match to one account kind.
    pub account_kind: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct SendOtpRequest {
    #[validate(length(max = 20, message = "Phone is too long"))]
    #[schema(example = "9998887771")]
    pub phone: String,
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct VerifyOtpRequest {
    #[schema(example = "9998887771")]
    pub phone: String,

    #[validate(length(max = 12, message = "OTP is too long"))]
    #[schema(example = "482913")]
    pub otp: String,
}

/// ID token obtained by the client from Google Identity Services.
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct GoogleLoginRequest {
    #[validate(length(max = 4096, message = "ID token is too long"))]
    pub id_token: String,
    /// Kind for a new account. Defaults to seller.
    pub account_kind: Option<String>,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct IntrospectRequest {
    pub token: String,
}

#[derive(Debug, Default, Serialize, ToSchema)]
pub struct IntrospectResponse {
    pub active: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub account_kind: Option<AccountKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iat: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exp: Option<i64>,
}

impl From<Claims> for IntrospectResponse {
    fn from(claims: Claims) -> Self {
        Self {
            active: true,
            sub: Some(claims.sub),
            account_kind: Some(claims.account_kind),
            role: claims.role,
            email: claims.email,
            iat: Some(claims.iat),
            exp: Some(claims.exp),
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SessionResponse {
    pub user: IdentityView,
    pub token: String,
}

#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct AgentProfileUpdate {
    pub experience: Option<u32>,
    pub specializations: Option<Vec<String>>,
    pub service_areas: Option<Vec<String>>,
    pub about_me: Option<String>,
}

/// Fields a user may change on their own profile.
#[derive(Debug, Clone, Default, Deserialize, Validate, ToSchema)]
pub struct UpdateProfileRequest {
    #[validate(length(min = 1, max = 120, message = "Name must be 1-120 characters"))]
    pub name: Option<String>,
    pub phone: Option<String>,
    pub preferences: Option<Preferences>,
    pub favorites: Option<Vec<String>>,
    pub agent_profile: Option<AgentProfileUpdate>,
}
