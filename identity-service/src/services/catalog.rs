//! Staff roles and the permission strings each one grants.

use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use utoipa::ToSchema;

use super::token::Claims;
use crate::models::AccountKind;

pub const SUPER_ADMIN: &str = "super_admin";
pub const CONTENT_MANAGER: &str = "content_manager";
pub const SALES_MANAGER: &str = "sales_manager";
pub const SUPPORT_EXECUTIVE: &str = "support_executive";
pub const ADMIN: &str = "admin";

/// Grants every permission when present in a role's set.
pub const WILDCARD: &str = "*";

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct RoleDefinition {
    pub id: String,
    pub name: String,
    pub description: String,
    pub color: String,
    pub permissions: Vec<String>,
}

/// Immutable role table, built once at startup and shared by clone.
#[derive(Debug, Clone)]
pub struct PermissionCatalog {
    roles: Arc<Vec<RoleDefinition>>,
    default_role: usize,
}

fn role(id: &str, name: &str, description: &str, color: &str, permissions: &[&str]) -> RoleDefinition {
    // Keep first occurrence order, drop repeats.
    let mut seen = HashSet::new();
    let permissions = permissions
        .iter()
        .filter(|p| seen.insert(**p))
        .map(|p| p.to_string())
        .collect();

    RoleDefinition {
        id: id.to_string(),
        name: name.to_string(),
        description: description.to_string(),
        color: color.to_string(),
        permissions,
    }
}

impl PermissionCatalog {
    /// The platform's five staff roles.
    pub fn standard() -> Self {
        let roles = vec![
            role(
                SUPER_ADMIN,
                "Super Admin",
                "Full access to all features and settings",
                "purple",
                &[
                    "dashboard.view",
                    "content.manage",
                    "content.create",
                    "content.view",
                    "ads.manage",
                    "ads.view",
                    "ads.approve",
                    "categories.manage",
                    "packages.manage",
                    "payments.manage",
                    "payments.view",
                    "payments.approve",
                    "users.manage",
                    "users.view",
                    "sellers.manage",
                    "sellers.verify",
                    "sellers.view",
                    "locations.manage",
                    "reports.manage",
                    "reports.view",
                    "promotions.manage",
                    "notifications.send",
                    "staff.manage",
                    "roles.manage",
                    "blog.manage",
                    "blog.view",
                    "support.view",
                    "system.manage",
                    "system.view",
                    "system.test",
                    "system.update",
                    "system.debug",
                    "analytics.view",
                ],
            ),
            role(
                CONTENT_MANAGER,
                "Content Manager",
                "Manage pages, blogs, and content",
                "blue",
                &[
                    "dashboard.view",
                    "content.manage",
                    "content.create",
                    "content.view",
                    "blog.manage",
                    "blog.view",
                    "ads.view",
                    "support.view",
                ],
            ),
            role(
                SALES_MANAGER,
                "Sales Manager",
                "Manage leads, properties, and sales",
                "green",
                &[
                    "dashboard.view",
                    "users.view",
                    "sellers.manage",
                    "sellers.verify",
                    "sellers.view",
                    "payments.view",
                    "packages.manage",
                    "ads.view",
                    "analytics.view",
                ],
            ),
            role(
                SUPPORT_EXECUTIVE,
                "Support Executive",
                "Handle user queries and support",
                "orange",
                &[
                    "dashboard.view",
                    "users.view",
                    "support.view",
                    "reports.view",
                    "content.view",
                ],
            ),
            role(
                ADMIN,
                "Admin",
                "General admin access",
                "gray",
                &[
                    "dashboard.view",
                    "content.view",
                    "users.view",
                    "ads.view",
                    "analytics.view",
                ],
            ),
        ];

        let default_role = roles.iter().position(|r| r.id == ADMIN).unwrap_or(0);

        Self {
            roles: Arc::new(roles),
            default_role,
        }
    }

    pub fn roles(&self) -> &[RoleDefinition] {
        &self.roles
    }

    pub fn find(&self, role: &str) -> Option<&RoleDefinition> {
        self.roles.iter().find(|r| r.id == role)
    }

    pub fn is_known_role(&self, role: &str) -> bool {
        self.find(role).is_some()
    }

    /// Canonical set for `role`. Unrecognised roles get the minimal `admin`
    /// set rather than an error.
    pub fn permissions_for(&self, role: &str) -> &[String] {
        match self.find(role) {
            Some(def) => &def.permissions,
            None => &self.roles[self.default_role].permissions,
        }
    }

    /// The one permission check every protected operation goes through.
    pub fn check_permission(&self, claims: &Claims, permission: &str) -> bool {
        match (claims.account_kind, claims.role.as_deref()) {
            (_, Some(SUPER_ADMIN)) => true,
            (_, Some(role)) => self
                .permissions_for(role)
                .iter()
                .any(|p| p == WILDCARD || p == permission),
            (AccountKind::Admin, None) => true,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

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
    fn test_super_admin_covers_every_role() {
        let catalog = PermissionCatalog::standard();
        let super_set: HashSet<&String> = catalog.permissions_for(SUPER_ADMIN).iter().collect();

        for role in catalog.roles() {
            for permission in &role.permissions {
                assert!(
                    super_set.contains(permission),
                    "{} grants {} which super_admin lacks",
                    role.id,
                    permission
                );
            }
        }
    }

    #[test]
    fn test_sets_are_duplicate_free() {
        let catalog = PermissionCatalog::standard();
        for role in catalog.roles() {
            let unique: HashSet<&String> = role.permissions.iter().collect();
            assert_eq!(unique.len(), role.permissions.len(), "{}", role.id);
        }

        let deduped = super::role("x", "X", "", "", &["a.view", "b.view", "a.view"]);
        assert_eq!(deduped.permissions, vec!["a.view", "b.view"]);
    }

    #[test]
    fn test_unknown_role_gets_admin_set() {
        let catalog = PermissionCatalog::standard();
        assert_eq!(
            catalog.permissions_for("regional_overlord"),
            catalog.permissions_for(ADMIN)
        );
        assert!(!catalog.is_known_role("regional_overlord"));
    }

    #[test]
    fn test_check_permission_by_role() {
        let catalog = PermissionCatalog::standard();

        let support = claims(AccountKind::Staff, Some(SUPPORT_EXECUTIVE));
        assert!(catalog.check_permission(&support, "support.view"));
        assert!(!catalog.check_permission(&support, "staff.manage"));

        let root = claims(AccountKind::Staff, Some(SUPER_ADMIN));
        assert!(catalog.check_permission(&root, "staff.manage"));
        assert!(catalog.check_permission(&root, "anything.at.all"));
    }

    #[test]
    fn test_check_permission_by_account_kind() {
        let catalog = PermissionCatalog::standard();

        assert!(catalog.check_permission(&claims(AccountKind::Admin, None), "staff.manage"));
        assert!(!catalog.check_permission(&claims(AccountKind::Seller, None), "dashboard.view"));
        assert!(!catalog.check_permission(&claims(AccountKind::Staff, None), "dashboard.view"));
    }

    #[test]
    fn test_wildcard_role_passes_everything() {
        let mut catalog = PermissionCatalog::standard();
        let mut roles = catalog.roles().to_vec();
        roles.push(super::role("ops", "Ops", "", "red", &[WILDCARD]));
        catalog.roles = Arc::new(roles);

        let ops = claims(AccountKind::Staff, Some("ops"));
        assert!(catalog.check_permission(&ops, "system.debug"));
    }
}
