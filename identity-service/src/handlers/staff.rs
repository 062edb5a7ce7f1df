use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use service_core::error::AppError;

use crate::{
    dtos::{
        staff::{
            CreateStaffRequest, CreatedStaffResponse, StaffCredentials, StaffListQuery,
            StaffPasswordRequest, StaffStatusRequest, UpdateStaffRequest,
        },
        ApiResponse, ErrorBody, MessageResponse,
    },
    middleware::AuthUser,
    models::IdentityView,
    services::RoleDefinition,
    utils::ValidatedJson,
    AppState,
};

/// Staff roles and their permissions
#[utoipa::path(
    get,
    path = "/api/admin/roles",
    responses(
        (status = 200, description = "Role catalog", body = [RoleDefinition]),
        (status = 403, description = "Insufficient permissions", body = ErrorBody)
    ),
    security(("bearer_auth" = [])),
    tag = "Staff"
)]
pub async fn list_roles(State(state): State<AppState>) -> ApiResponse<Vec<RoleDefinition>> {
    ApiResponse::ok(state.staff.roles())
}

/// List staff members
#[utoipa::path(
    get,
    path = "/api/admin/staff",
    params(StaffListQuery),
    responses(
        (status = 200, description = "Staff, newest first", body = [IdentityView]),
        (status = 403, description = "Insufficient permissions", body = ErrorBody)
    ),
    security(("bearer_auth" = [])),
    tag = "Staff"
)]
pub async fn list_staff(
    State(state): State<AppState>,
    Query(query): Query<StaffListQuery>,
) -> Result<ApiResponse<Vec<IdentityView>>, AppError> {
    let staff = state.staff.list(query).await?;
    Ok(ApiResponse::ok(staff.into_iter().map(Into::into).collect()))
}

/// Create a staff member
#[utoipa::path(
    post,
    path = "/api/admin/staff",
    request_body = CreateStaffRequest,
    responses(
        (status = 201, description = "Created, with one-time credentials", body = CreatedStaffResponse),
        (status = 400, description = "Invalid input or unknown role", body = ErrorBody),
        (status = 409, description = "Email already in use", body = ErrorBody)
    ),
    security(("bearer_auth" = [])),
    tag = "Staff"
)]
pub async fn create_staff(
    State(state): State<AppState>,
    AuthUser(claims): AuthUser,
    ValidatedJson(req): ValidatedJson<CreateStaffRequest>,
) -> Result<(StatusCode, Json<ApiResponse<CreatedStaffResponse>>), AppError> {
    let created = state.staff.create(req, &claims.sub).await?;

    let message = match &created.generated_password {
        Some(_) => "Staff member created. Share the generated password securely; it is shown only once.",
        None => "Staff member created",
    };

    Ok(ApiResponse::ok(CreatedStaffResponse {
        staff: created.identity.into(),
        credentials: StaffCredentials {
            username: created.username,
            password: created.generated_password,
        },
    })
    .with_message(message)
    .created())
}

/// Update a staff member
#[utoipa::path(
    put,
    path = "/api/admin/staff/{staff_id}",
    params(("staff_id" = String, Path, description = "Staff identity id")),
    request_body = UpdateStaffRequest,
    responses(
        (status = 200, description = "Updated", body = IdentityView),
        (status = 400, description = "Invalid input or unknown role", body = ErrorBody),
        (status = 404, description = "Staff member not found", body = ErrorBody)
    ),
    security(("bearer_auth" = [])),
    tag = "Staff"
)]
pub async fn update_staff(
    State(state): State<AppState>,
    Path(staff_id): Path<String>,
    ValidatedJson(req): ValidatedJson<UpdateStaffRequest>,
) -> Result<ApiResponse<IdentityView>, AppError> {
    let identity = state.staff.update(&staff_id, req).await?;
    Ok(ApiResponse::ok(identity.into()).with_message("Staff member updated successfully"))
}

/// Activate, deactivate or suspend a staff member
#[utoipa::path(
    patch,
    path = "/api/admin/staff/{staff_id}/status",
    params(("staff_id" = String, Path, description = "Staff identity id")),
    request_body = StaffStatusRequest,
    responses(
        (status = 200, description = "Status changed", body = IdentityView),
        (status = 400, description = "Invalid status", body = ErrorBody),
        (status = 404, description = "Staff member not found", body = ErrorBody)
    ),
    security(("bearer_auth" = [])),
    tag = "Staff"
)]
pub async fn set_staff_status(
    State(state): State<AppState>,
    Path(staff_id): Path<String>,
    ValidatedJson(req): ValidatedJson<StaffStatusRequest>,
) -> Result<ApiResponse<IdentityView>, AppError> {
    let identity = state.staff.set_status(&staff_id, &req.status).await?;
    Ok(ApiResponse::ok(identity.into()).with_message("Staff status updated successfully"))
}

/// Set a staff member's password
#[utoipa::path(
    put,
    path = "/api/admin/staff/{staff_id}/password",
    params(("staff_id" = String, Path, description = "Staff identity id")),
    request_body = StaffPasswordRequest,
    responses(
        (status = 200, description = "Password updated", body = MessageResponse),
        (status = 400, description = "Password too short", body = ErrorBody),
        (status = 404, description = "Staff member not found", body = ErrorBody)
    ),
    security(("bearer_auth" = [])),
    tag = "Staff"
)]
pub async fn set_staff_password(
    State(state): State<AppState>,
    Path(staff_id): Path<String>,
    ValidatedJson(req): ValidatedJson<StaffPasswordRequest>,
) -> Result<ApiResponse<MessageResponse>, AppError> {
    state.staff.set_password(&staff_id, &req.password).await?;
    Ok(ApiResponse::ok(MessageResponse::new("Password updated successfully")))
}

/// Delete a staff member
#[utoipa::path(
    delete,
    path = "/api/admin/staff/{staff_id}",
    params(("staff_id" = String, Path, description = "Staff identity id")),
    responses(
        (status = 200, description = "Deleted", body = MessageResponse),
        (status = 404, description = "Staff member not found", body = ErrorBody)
    ),
    security(("bearer_auth" = [])),
    tag = "Staff"
)]
pub async fn delete_staff(
    State(state): State<AppState>,
    Path(staff_id): Path<String>,
) -> Result<ApiResponse<MessageResponse>, AppError> {
    state.staff.delete(&staff_id).await?;
    Ok(ApiResponse::ok(MessageResponse::new("Staff member deleted successfully")))
}
