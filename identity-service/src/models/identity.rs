use chrono::{DateTime, Utc};
use mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use utoipa::ToSchema;
use uuid::Uuid;

/// Coarse account classification carried in every session token.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum AccountKind {
    Buyer,
    Seller,
    Agent,
    Admin,
    Staff,
}

impl AccountKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccountKind::Buyer => "buyer",
            AccountKind::Seller => "seller",
            AccountKind::Agent => "agent",
            AccountKind::Admin => "admin",
            AccountKind::Staff => "staff",
        }
    }

    /// Kinds a member of the public may sign up as.
    pub fn is_self_service(&self) -> bool {
        matches!(
            self,
            AccountKind::Buyer | AccountKind::Seller | AccountKind::Agent
        )
    }
}

impl fmt::Display for AccountKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AccountKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "buyer" => Ok(AccountKind::Buyer),
            "seller" => Ok(AccountKind::Seller),
            "agent" => Ok(AccountKind::Agent),
            "admin" => Ok(AccountKind::Admin),
            "staff" => Ok(AccountKind::Staff),
            other => Err(format!("Unknown account type: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum IdentityStatus {
    Active,
    Inactive,
    Suspended,
}

impl IdentityStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            IdentityStatus::Active => "active",
            IdentityStatus::Inactive => "inactive",
            IdentityStatus::Suspended => "suspended",
        }
    }
}

impl FromStr for IdentityStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "active" => Ok(IdentityStatus::Active),
            "inactive" => Ok(IdentityStatus::Inactive),
            "suspended" => Ok(IdentityStatus::Suspended),
            other => Err(format!("Invalid status: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum AuthProvider {
    Password,
    Otp,
    Google,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
pub struct StaffProfile {
    pub role: String,
    /// Always derived from `role` through the permission catalog.
    pub permissions: Vec<String>,
    pub is_first_login: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_by: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
pub struct AgentProfile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub experience: Option<u32>,
    #[serde(default)]
    pub specializations: Vec<String>,
    #[serde(default)]
    pub service_areas: Vec<String>,
    pub rating: f64,
    pub review_count: u32,
    #[serde(default)]
    pub about_me: String,
}

impl AgentProfile {
    pub fn new(
        experience: Option<u32>,
        specializations: Vec<String>,
        service_areas: Vec<String>,
    ) -> Self {
        Self {
            experience,
            specializations,
            service_areas,
            rating: 0.0,
            review_count: 0,
            about_me: String::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
pub struct PriceRange {
    pub min: u64,
    pub max: u64,
}

impl Default for PriceRange {
    fn default() -> Self {
        Self {
            min: 0,
            max: 10_000_000,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, ToSchema)]
pub struct Preferences {
    #[serde(default)]
    pub property_types: Vec<String>,
    #[serde(default)]
    pub price_range: PriceRange,
    #[serde(default)]
    pub locations: Vec<String>,
}

/// A person able to authenticate. Stored in the `identities` collection.
///
/// Optional contact fields are omitted when absent so the sparse unique
/// indexes on `email`, `phone` and `username` only see real values.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Identity {
    #[serde(rename = "_id")]
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password_hash: Option<String>,
    pub account_kind: AccountKind,
    pub status: IdentityStatus,
    pub auth_provider: AuthProvider,
    #[serde(default)]
    pub email_verified: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub staff: Option<StaffProfile>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_profile: Option<AgentProfile>,
    #[serde(default)]
    pub preferences: Preferences,
    #[serde(default)]
    pub favorites: Vec<String>,
    #[serde(default, with = "optional_bson_datetime")]
    pub last_login: Option<DateTime<Utc>>,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub updated_at: DateTime<Utc>,
}

impl Identity {
    /// Fresh active identity. Returns `None` when neither email nor phone is
    /// given, since such a record could never sign in.
    pub fn new(
        name: String,
        email: Option<String>,
        phone: Option<String>,
        account_kind: AccountKind,
        auth_provider: AuthProvider,
        now: DateTime<Utc>,
    ) -> Option<Self> {
        if email.is_none() && phone.is_none() {
            return None;
        }

        Some(Self {
            id: Uuid::new_v4().to_string(),
            name,
            email,
            phone,
            username: None,
            password_hash: None,
            account_kind,
            status: IdentityStatus::Active,
            auth_provider,
            email_verified: false,
            staff: None,
            agent_profile: None,
            preferences: Preferences::default(),
            favorites: Vec::new(),
            last_login: None,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn role(&self) -> Option<&str> {
        self.staff.as_ref().map(|s| s.role.as_str())
    }

    pub fn is_active(&self) -> bool {
        self.status == IdentityStatus::Active
    }
}

/// Identity as returned to callers: no password hash.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct IdentityView {
    pub id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    pub account_kind: AccountKind,
    pub status: IdentityStatus,
    pub auth_provider: AuthProvider,
    pub email_verified: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub permissions: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_first_login: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent_profile: Option<AgentProfile>,
    pub preferences: Preferences,
    pub favorites: Vec<String>,
    pub last_login: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Identity> for IdentityView {
    fn from(identity: Identity) -> Self {
        let (role, permissions, is_first_login) = match identity.staff {
            Some(staff) => (
                Some(staff.role),
                Some(staff.permissions),
                Some(staff.is_first_login),
            ),
            None => (None, None, None),
        };

        Self {
            id: identity.id,
            name: identity.name,
            email: identity.email,
            phone: identity.phone,
            username: identity.username,
            account_kind: identity.account_kind,
            status: identity.status,
            auth_provider: identity.auth_provider,
            email_verified: identity.email_verified,
            role,
            permissions,
            is_first_login,
            agent_profile: identity.agent_profile,
            preferences: identity.preferences,
            favorites: identity.favorites,
            last_login: identity.last_login,
            created_at: identity.created_at,
            updated_at: identity.updated_at,
        }
    }
}

/// `Option<DateTime<Utc>>` stored as a BSON date.
mod optional_bson_datetime {
    use chrono::{DateTime, Utc};
    use mongodb::bson;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S>(value: &Option<DateTime<Utc>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(dt) => bson::DateTime::from_chrono(*dt).serialize(serializer),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Option::<bson::DateTime>::deserialize(deserializer)?;
        Ok(value.map(|dt| dt.to_chrono()))
    }
}
