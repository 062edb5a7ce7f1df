use std::sync::Arc;
use tracing::instrument;

use crate::{
    dtos::staff::{CreateStaffRequest, StaffListQuery, UpdateStaffRequest},
    models::{AccountKind, AuthProvider, Identity, IdentityStatus, StaffProfile},
    services::{
        catalog::{PermissionCatalog, RoleDefinition, ADMIN},
        clock::Clock,
        error::ServiceError,
        store::{CredentialStore, IdentityLookup, StaffFilter},
    },
    utils::{generate_password, hash_password, is_valid_email, is_valid_phone},
};

const GENERATED_PASSWORD_LENGTH: usize = 12;
const MIN_STAFF_PASSWORD_LENGTH: usize = 6;

/// A new staff account plus the credentials to hand over once.
#[derive(Debug, Clone)]
pub struct CreatedStaff {
    pub identity: Identity,
    pub username: String,
    /// Present only when the password was generated.
    pub generated_password: Option<String>,
}

#[derive(Clone)]
pub struct StaffService {
    store: Arc<dyn CredentialStore>,
    catalog: PermissionCatalog,
    clock: Arc<dyn Clock>,
}

fn parse_status(raw: &str) -> Result<IdentityStatus, ServiceError> {
    raw.parse().map_err(ServiceError::InvalidInput)
}

fn check_password(password: &str) -> Result<(), ServiceError> {
    if password.chars().count() < MIN_STAFF_PASSWORD_LENGTH {
        return Err(ServiceError::invalid(format!(
            "Password must be at least {} characters long",
            MIN_STAFF_PASSWORD_LENGTH
        )));
    }
    Ok(())
}

fn not_found() -> ServiceError {
    ServiceError::NotFound("Staff member not found".to_string())
}

impl StaffService {
    pub fn new(
        store: Arc<dyn CredentialStore>,
        catalog: PermissionCatalog,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            catalog,
            clock,
        }
    }

    fn known_role(&self, role: &str) -> Result<String, ServiceError> {
        let role = role.trim();
        if !self.catalog.is_known_role(role) {
            return Err(ServiceError::invalid(format!("Unknown role: {}", role)));
        }
        Ok(role.to_string())
    }

    fn assign_role(&self, staff: &mut StaffProfile, role: String) {
        staff.permissions = self.catalog.permissions_for(&role).to_vec();
        staff.role = role;
    }

    async fn find_staff(&self, staff_id: &str) -> Result<Identity, ServiceError> {
        self.store
            .find_by_id(staff_id)
            .await?
            .filter(|identity| identity.account_kind == AccountKind::Staff)
            .ok_or_else(not_found)
    }

    async fn save(&self, mut identity: Identity) -> Result<Identity, ServiceError> {
        identity.updated_at = self.clock.now();
        if !self.store.replace_identity(&identity).await? {
            return Err(not_found());
        }
        Ok(identity)
    }

    pub fn roles(&self) -> Vec<RoleDefinition> {
        self.catalog.roles().to_vec()
    }

    pub async fn list(&self, query: StaffListQuery) -> Result<Vec<Identity>, ServiceError> {
        let wanted = |value: Option<String>| {
            value
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty() && v != "all")
        };

        let filter = StaffFilter {
            role: wanted(query.role),
            status: wanted(query.status)
                .map(|s| parse_status(&s))
                .transpose()?,
        };

        Ok(self.store.list_staff(&filter).await?)
    }

    #[instrument(skip(self, req), fields(role = ?req.role))]
    pub async fn create(
        &self,
        req: CreateStaffRequest,
        created_by: &str,
    ) -> Result<CreatedStaff, ServiceError> {
        let name = req.name.trim().to_string();
        let email = req.email.trim().to_lowercase();
        if name.is_empty() || email.is_empty() {
            return Err(ServiceError::invalid("Name and email are required"));
        }
        if !is_valid_email(&email) {
            return Err(ServiceError::invalid("Please enter a valid email address"));
        }

        let phone = req
            .phone
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty());
        if phone.as_deref().is_some_and(|p| !is_valid_phone(p)) {
            return Err(ServiceError::invalid("Please enter a valid phone number"));
        }

        let role = self.known_role(req.role.as_deref().unwrap_or(ADMIN))?;
        let status = match req.status.as_deref() {
            Some(raw) => parse_status(raw)?,
            None => IdentityStatus::Active,
        };

        let (password, generated_password) = if req.auto_generate_password.unwrap_or(true) {
            let generated = generate_password(GENERATED_PASSWORD_LENGTH);
            (generated.clone(), Some(generated))
        } else {
            let supplied = req
                .password
                .ok_or_else(|| ServiceError::invalid("Password is required"))?;
            check_password(&supplied)?;
            (supplied, None)
        };

        let username = email
            .split('@')
            .next()
            .unwrap_or_default()
            .to_lowercase();

        for lookup in [
            IdentityLookup::Email(email.clone()),
            IdentityLookup::Username(username.clone()),
        ] {
            if self.store.find_one(&lookup, None).await?.is_some() {
                return Err(ServiceError::DuplicateIdentity);
            }
        }

        let mut identity = Identity::new(
            name,
            Some(email),
            phone,
            AccountKind::Staff,
            AuthProvider::Password,
            self.clock.now(),
        )
        .ok_or_else(|| ServiceError::invalid("Name and email are required"))?;

        identity.username = Some(username.clone());
        identity.status = status;
        identity.password_hash = Some(hash_password(&password)?);

        let mut staff = StaffProfile {
            role: String::new(),
            permissions: Vec::new(),
            is_first_login: true,
            created_by: Some(created_by.to_string()),
        };
        self.assign_role(&mut staff, role);
        identity.staff = Some(staff);

        self.store.insert_identity(&identity).await?;

        tracing::info!(
            staff_id = %identity.id,
            role = identity.role().unwrap_or_default(),
            created_by = %created_by,
            "Staff member created"
        );

        Ok(CreatedStaff {
            identity,
            username,
            generated_password,
        })
    }

    #[instrument(skip(self, req))]
    pub async fn update(
        &self,
        staff_id: &str,
        req: UpdateStaffRequest,
    ) -> Result<Identity, ServiceError> {
        let role = req.role.as_deref().map(|r| self.known_role(r)).transpose()?;
        let status = req.status.as_deref().map(parse_status).transpose()?;

        let mut identity = self.find_staff(staff_id).await?;

        if let Some(name) = req.name {
            let name = name.trim();
            if name.is_empty() {
                return Err(ServiceError::invalid("Name is required"));
            }
            identity.name = name.to_string();
        }

        if let Some(phone) = req.phone {
            let phone = phone.trim();
            if phone.is_empty() {
                identity.phone = None;
            } else if is_valid_phone(phone) {
                identity.phone = Some(phone.to_string());
            } else {
                return Err(ServiceError::invalid("Please enter a valid phone number"));
            }
        }

        if let Some(role) = role {
            let staff = identity.staff.get_or_insert_with(|| StaffProfile {
                role: String::new(),
                permissions: Vec::new(),
                is_first_login: false,
                created_by: None,
            });
            self.assign_role(staff, role);
        }

        if let Some(status) = status {
            identity.status = status;
        }

        let identity = self.save(identity).await?;
        tracing::info!(staff_id = %identity.id, "Staff member updated");
        Ok(identity)
    }

    #[instrument(skip(self))]
    pub async fn set_status(&self, staff_id: &str, status: &str) -> Result<Identity, ServiceError> {
        let status = parse_status(status)?;
        let mut identity = self.find_staff(staff_id).await?;
        identity.status = status;

        let identity = self.save(identity).await?;
        tracing::info!(staff_id = %identity.id, status = status.as_str(), "Staff status changed");
        Ok(identity)
    }

    #[instrument(skip(self, password))]
    pub async fn set_password(&self, staff_id: &str, password: &str) -> Result<(), ServiceError> {
        check_password(password)?;
        let mut identity = self.find_staff(staff_id).await?;
        identity.password_hash = Some(hash_password(password)?);

        self.save(identity).await?;
        tracing::info!(staff_id = %staff_id, "Staff password reset");
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn delete(&self, staff_id: &str) -> Result<(), ServiceError> {
        self.find_staff(staff_id).await?;
        if !self.store.delete_identity(staff_id).await? {
            return Err(not_found());
        }
        tracing::info!(staff_id = %staff_id, "Staff member deleted");
        Ok(())
    }
}
