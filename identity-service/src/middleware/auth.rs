use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts},
    middleware::Next,
    response::Response,
};
use service_core::error::AppError;

use crate::{
    models::AccountKind,
    services::{catalog::PermissionCatalog, token::Claims, ServiceError},
    AppState,
};

fn bearer_token(req: &Request) -> Option<&str> {
    req.headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

/// Resolve the bearer token and attach its claims to the request.
pub async fn require_authenticated(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = bearer_token(&req).ok_or(ServiceError::TokenInvalid)?;

    let claims = state.tokens.verify(token).map_err(|e| {
        tracing::debug!(error = %e, "Bearer token rejected");
        e
    })?;

    req.extensions_mut().insert(claims);
    Ok(next.run(req).await)
}

/// What a route demands of the caller. Layered inside
/// [`require_authenticated`].
#[derive(Clone)]
pub struct AccessGate {
    catalog: PermissionCatalog,
    account_kind: Option<AccountKind>,
    permission: &'static str,
}

impl AccessGate {
    /// Passes when the caller's account kind is `kind`, or when the caller
    /// holds `permission`.
    pub fn allows(&self, claims: &Claims) -> bool {
        self.account_kind == Some(claims.account_kind)
            || self.catalog.check_permission(claims, self.permission)
    }
}

pub fn require_role(
    catalog: PermissionCatalog,
    kind: AccountKind,
    permission: &'static str,
) -> AccessGate {
    AccessGate {
        catalog,
        account_kind: Some(kind),
        permission,
    }
}

pub fn require_permission(catalog: PermissionCatalog, permission: &'static str) -> AccessGate {
    AccessGate {
        catalog,
        account_kind: None,
        permission,
    }
}

pub async fn enforce_access(
    State(gate): State<AccessGate>,
    req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let claims = req
        .extensions()
        .get::<Claims>()
        .ok_or(ServiceError::TokenInvalid)?;

    if !gate.allows(claims) {
        tracing::warn!(
            identity_id = %claims.sub,
            account_kind = %claims.account_kind,
            role = claims.role.as_deref().unwrap_or("-"),
            permission = gate.permission,
            "Access denied"
        );
        return Err(ServiceError::Forbidden("Insufficient permissions".to_string()).into());
    }

    Ok(next.run(req).await)
}

/// Claims placed by [`require_authenticated`].
pub struct AuthUser(pub Claims);

#[axum::async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let claims = parts
            .extensions
            .get::<Claims>()
            .cloned()
            .ok_or(ServiceError::TokenInvalid)?;

        Ok(AuthUser(claims))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::catalog::{CONTENT_MANAGER, SUPER_ADMIN, SUPPORT_EXECUTIVE};

    fn claims(kind: AccountKind, role: Option<&str>) -> Claims {
        Claims {
            sub: "id".to_string(),
            account_kind: kind,
            role: role.map(str::to_string),
            email: None,
            iat: 0,
            exp: 1,
        }
    }

    #[test]
    fn test_role_gate() {
        let gate = require_role(PermissionCatalog::standard(), AccountKind::Admin, "staff.manage");

        assert!(gate.allows(&claims(AccountKind::Admin, None)));
        assert!(gate.allows(&claims(AccountKind::Staff, Some(SUPER_ADMIN))));
        assert!(!gate.allows(&claims(AccountKind::Staff, Some(SUPPORT_EXECUTIVE))));
        assert!(!gate.allows(&claims(AccountKind::Seller, None)));
    }

    #[test]
    fn test_permission_gate_ignores_account_kind_match() {
        let gate = require_permission(PermissionCatalog::standard(), "blog.manage");

        assert!(gate.allows(&claims(AccountKind::Staff, Some(CONTENT_MANAGER))));
        assert!(!gate.allows(&claims(AccountKind::Staff, Some(SUPPORT_EXECUTIVE))));
        assert!(!gate.allows(&claims(AccountKind::Buyer, None)));
    }
}
