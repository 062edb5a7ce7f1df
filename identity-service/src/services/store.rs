//! Persistence seams for identities and one-time codes.
//!
//! Implementations classify driver failures into [`StoreError`] so callers
//! never see raw database errors.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::models::{AccountKind, Identity, IdentityStatus, OtpRecord};

#[derive(Debug, Error)]
pub enum StoreError {
    /// A unique index rejected the write. Carries the offending field.
    #[error("duplicate value for {0}")]
    Duplicate(String),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// How a password login locates its identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdentityLookup {
    Username(String),
    /// Matches a record whose email or phone equals the given value.
    EmailOrPhone { email: String, phone: String },
    Email(String),
    Phone(String),
}

impl IdentityLookup {
    pub fn matches(&self, identity: &Identity) -> bool {
        let eq = |field: &Option<String>, value: &str| field.as_deref() == Some(value);
        match self {
            IdentityLookup::Username(u) => eq(&identity.username, u),
            IdentityLookup::EmailOrPhone { email, phone } => {
                eq(&identity.email, email) || eq(&identity.phone, phone)
            }
            IdentityLookup::Email(e) => eq(&identity.email, e),
            IdentityLookup::Phone(p) => eq(&identity.phone, p),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct StaffFilter {
    pub role: Option<String>,
    pub status: Option<IdentityStatus>,
}

#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn insert_identity(&self, identity: &Identity) -> Result<(), StoreError>;

    async fn find_by_id(&self, id: &str) -> Result<Option<Identity>, StoreError>;

    async fn find_one(
        &self,
        lookup: &IdentityLookup,
        account_kind: Option<AccountKind>,
    ) -> Result<Option<Identity>, StoreError>;

    /// Write back a modified identity. Returns `false` when no record has
    /// that id.
    async fn replace_identity(&self, identity: &Identity) -> Result<bool, StoreError>;

    /// Stamp a successful login and clear the staff first-login flag.
    async fn record_login(&self, id: &str, at: DateTime<Utc>) -> Result<(), StoreError>;

    /// Staff identities, newest first.
    async fn list_staff(&self, filter: &StaffFilter) -> Result<Vec<Identity>, StoreError>;

    async fn delete_identity(&self, id: &str) -> Result<bool, StoreError>;

    async fn count_identities(&self) -> Result<u64, StoreError>;

    async fn health_check(&self) -> Result<(), StoreError>;
}

#[async_trait]
pub trait OtpStore: Send + Sync {
    /// Store `record` as the only outstanding code for its phone.
    async fn replace_code(&self, record: &OtpRecord) -> Result<(), StoreError>;

    /// Atomically remove and return the record for `phone` whose hash
    /// matches and which is still valid at `now`.
    ///
    /// A mismatch against a live code counts one attempt; the code is
    /// discarded once `max_attempts` have been used.
    async fn take_code(
        &self,
        phone: &str,
        code_hash: &str,
        now: DateTime<Utc>,
        max_attempts: i32,
    ) -> Result<Option<OtpRecord>, StoreError>;
}
