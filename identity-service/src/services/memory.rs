use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use subtle::ConstantTimeEq;

use super::store::{CredentialStore, IdentityLookup, OtpStore, StaffFilter, StoreError};
use crate::models::{AccountKind, Identity, OtpRecord};

/// Process-local store with the same uniqueness rules as the MongoDB
/// indexes. Each operation holds its collection lock for its whole
/// duration, which gives single-document atomicity.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    identities: Mutex<HashMap<String, Identity>>,
    otp_codes: Mutex<HashMap<String, OtpRecord>>,
}

fn lock<T>(mutex: &Mutex<T>) -> Result<MutexGuard<'_, T>, StoreError> {
    mutex
        .lock()
        .map_err(|_| StoreError::Unavailable("in-memory store lock poisoned".to_string()))
}

/// Name of the first unique field `candidate` shares with another record.
fn conflicting_field(
    identities: &HashMap<String, Identity>,
    candidate: &Identity,
) -> Option<&'static str> {
    let same = |a: &Option<String>, b: &Option<String>| a.is_some() && a == b;

    identities
        .values()
        .filter(|existing| existing.id != candidate.id)
        .find_map(|existing| {
            if same(&existing.email, &candidate.email) {
                Some("email")
            } else if same(&existing.phone, &candidate.phone) {
                Some("phone")
            } else if same(&existing.username, &candidate.username) {
                Some("username")
            } else {
                None
            }
        })
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Outstanding code for a phone, if any.
    pub fn otp_for(&self, phone: &str) -> Option<OtpRecord> {
        lock(&self.otp_codes)
            .ok()
            .and_then(|codes| codes.get(phone).cloned())
    }
}

#[async_trait]
impl CredentialStore for InMemoryStore {
    async fn insert_identity(&self, identity: &Identity) -> Result<(), StoreError> {
        let mut identities = lock(&self.identities)?;

        if identities.contains_key(&identity.id) {
            return Err(StoreError::Duplicate("_id".to_string()));
        }
        if let Some(field) = conflicting_field(&identities, identity) {
            return Err(StoreError::Duplicate(field.to_string()));
        }

        identities.insert(identity.id.clone(), identity.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<Identity>, StoreError> {
        Ok(lock(&self.identities)?.get(id).cloned())
    }

    async fn find_one(
        &self,
        lookup: &IdentityLookup,
        account_kind: Option<AccountKind>,
    ) -> Result<Option<Identity>, StoreError> {
        let identities = lock(&self.identities)?;
        Ok(identities
            .values()
            .filter(|i| account_kind.map_or(true, |kind| i.account_kind == kind))
            .find(|i| lookup.matches(i))
            .cloned())
    }

    async fn replace_identity(&self, identity: &Identity) -> Result<bool, StoreError> {
        let mut identities = lock(&self.identities)?;

        if !identities.contains_key(&identity.id) {
            return Ok(false);
        }
        if let Some(field) = conflicting_field(&identities, identity) {
            return Err(StoreError::Duplicate(field.to_string()));
        }

        identities.insert(identity.id.clone(), identity.clone());
        Ok(true)
    }

    async fn record_login(&self, id: &str, at: DateTime<Utc>) -> Result<(), StoreError> {
        let mut identities = lock(&self.identities)?;
        if let Some(identity) = identities.get_mut(id) {
            identity.last_login = Some(at);
            identity.updated_at = at;
            if let Some(staff) = identity.staff.as_mut() {
                staff.is_first_login = false;
            }
        }
        Ok(())
    }

    async fn list_staff(&self, filter: &StaffFilter) -> Result<Vec<Identity>, StoreError> {
        let identities = lock(&self.identities)?;
        let mut staff: Vec<Identity> = identities
            .values()
            .filter(|i| i.account_kind == AccountKind::Staff)
            .filter(|i| {
                filter
                    .role
                    .as_deref()
                    .map_or(true, |role| i.role() == Some(role))
            })
            .filter(|i| filter.status.map_or(true, |status| i.status == status))
            .cloned()
            .collect();

        staff.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(staff)
    }

    async fn delete_identity(&self, id: &str) -> Result<bool, StoreError> {
        Ok(lock(&self.identities)?.remove(id).is_some())
    }

    async fn count_identities(&self) -> Result<u64, StoreError> {
        Ok(lock(&self.identities)?.len() as u64)
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        lock(&self.identities).map(|_| ())
    }
}

#[async_trait]
impl OtpStore for InMemoryStore {
    async fn replace_code(&self, record: &OtpRecord) -> Result<(), StoreError> {
        lock(&self.otp_codes)?.insert(record.phone.clone(), record.clone());
        Ok(())
    }

    async fn take_code(
        &self,
        phone: &str,
        code_hash: &str,
        now: DateTime<Utc>,
        max_attempts: i32,
    ) -> Result<Option<OtpRecord>, StoreError> {
        let mut codes = lock(&self.otp_codes)?;

        let matched = match codes.get_mut(phone) {
            None => return Ok(None),
            Some(record) if record.is_expired(now) => return Ok(None),
            Some(record)
                if record.attempt_count < max_attempts
                    && bool::from(record.code_hash.as_bytes().ct_eq(code_hash.as_bytes())) =>
            {
                true
            }
            Some(record) => {
                record.attempt_count += 1;
                false
            }
        };

        if matched {
            return Ok(codes.remove(phone));
        }
        if codes
            .get(phone)
            .is_some_and(|record| record.attempt_count >= max_attempts)
        {
            codes.remove(phone);
        }
        Ok(None)
    }
}
