use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

use crate::models::IdentityView;

#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct StaffListQuery {
    /// Role id or `all`
    pub role: Option<String>,
    /// Status or `all`
    pub status: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct CreateStaffRequest {
    #[validate(length(max = 120, message = "Name is too long"))]
    #[schema(example = "Ravi Kumar")]
    pub name: String,
    #[schema(example = "ravi@estate.example")]
    pub email: String,
    pub phone: Option<String>,
    /// Defaults to admin.
    #[schema(example = "support_executive")]
    pub role: Option<String>,
    /// Defaults to active.
    pub status: Option<String>,
    /// Used only when `auto_generate_password` is false.
    pub password: Option<String>,
    /// Defaults to true.
    pub auto_generate_password: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize, Validate, ToSchema)]
pub struct UpdateStaffRequest {
    #[validate(length(min = 1, max = 120, message = "Name must be 1-120 characters"))]
    pub name: Option<String>,
    pub phone: Option<String>,
    pub role: Option<String>,
    pub status: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct StaffStatusRequest {
    #[schema(example = "suspended")]
    pub status: String,
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct StaffPasswordRequest {
    #[validate(length(max = 256, message = "Password is too long"))]
    pub password: String,
}

/// One-time credentials shown to the admin who created the account.
#[derive(Debug, Serialize, ToSchema)]
pub struct StaffCredentials {
    pub username: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CreatedStaffResponse {
    pub staff: IdentityView,
    pub credentials: StaffCredentials,
}
