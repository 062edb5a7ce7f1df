use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::TryStreamExt;
use mongodb::{
    bson::{doc, DateTime as BsonDateTime, Document},
    error::{ErrorKind, WriteFailure},
    options::{
        ClientOptions, FindOneAndUpdateOptions, FindOptions, IndexOptions, ReturnDocument,
        UpdateOptions,
    },
    Client as MongoClient, Collection, Database, IndexModel,
};
use service_core::error::AppError;
use std::future::Future;
use std::time::Duration;

use super::store::{CredentialStore, IdentityLookup, OtpStore, StaffFilter, StoreError};
use crate::models::{AccountKind, Identity, OtpRecord};

const DUPLICATE_KEY: i32 = 11000;

#[derive(Clone)]
pub struct MongoDb {
    db: Database,
}

/// Split driver errors into unique-index violations and everything else.
fn classify(err: mongodb::error::Error) -> StoreError {
    let duplicate = match err.kind.as_ref() {
        ErrorKind::Write(WriteFailure::WriteError(e)) => e.code == DUPLICATE_KEY,
        ErrorKind::Command(e) => e.code == DUPLICATE_KEY,
        _ => false,
    };

    if duplicate {
        let field = ["email", "phone", "username", "_id"]
            .into_iter()
            .find(|f| err.to_string().contains(&format!("{}_", f)))
            .unwrap_or("unique key");
        StoreError::Duplicate(field.to_string())
    } else {
        tracing::error!(error = %err, "MongoDB operation failed");
        StoreError::Unavailable(err.to_string())
    }
}

/// Run an upsert, repeating it once when a concurrent upsert for the same
/// key won the unique index. A second conflict is reported as unavailable.
async fn upsert_with_retry<F, Fut>(mut upsert: F) -> Result<(), StoreError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<(), StoreError>>,
{
    match upsert().await {
        Err(StoreError::Duplicate(field)) => {
            tracing::debug!(field = %field, "Upsert lost a race; retrying");
            upsert().await.map_err(|e| match e {
                StoreError::Duplicate(field) => {
                    StoreError::Unavailable(format!("concurrent writes on {}", field))
                }
                other => other,
            })
        }
        result => result,
    }
}

fn lookup_filter(lookup: &IdentityLookup, account_kind: Option<AccountKind>) -> Document {
    let mut filter = match lookup {
        IdentityLookup::Username(u) => doc! { "username": u },
        IdentityLookup::EmailOrPhone { email, phone } => {
            doc! { "$or": [ { "email": email }, { "phone": phone } ] }
        }
        IdentityLookup::Email(e) => doc! { "email": e },
        IdentityLookup::Phone(p) => doc! { "phone": p },
    };

    if let Some(kind) = account_kind {
        filter.insert("account_kind", kind.as_str());
    }
    filter
}

impl MongoDb {
    pub async fn connect(uri: &str, database: &str, timeout: Duration) -> Result<Self, AppError> {
        tracing::info!(database = %database, "Connecting to MongoDB");

        let mut options = ClientOptions::parse(uri).await.map_err(|e| {
            tracing::error!("Failed to parse MongoDB URI: {}", e);
            AppError::DatabaseError(anyhow::anyhow!(e.to_string()))
        })?;
        options.connect_timeout = Some(timeout);
        options.server_selection_timeout = Some(timeout);
        options.app_name = Some("identity-service".to_string());

        let client = MongoClient::with_options(options).map_err(|e| {
            tracing::error!("Failed to create MongoDB client: {}", e);
            AppError::DatabaseError(anyhow::anyhow!(e.to_string()))
        })?;
        let db = client.database(database);

        tracing::info!(database = %database, "Successfully connected to MongoDB database");
        Ok(Self { db })
    }

    pub fn identities(&self) -> Collection<Identity> {
        self.db.collection("identities")
    }

    pub fn otp_codes(&self) -> Collection<OtpRecord> {
        self.db.collection("otp_codes")
    }

    pub async fn initialize_indexes(&self) -> Result<(), AppError> {
        tracing::info!("Creating MongoDB indexes for identity-service");

        let unique_sparse = |field: &str| {
            let mut keys = Document::new();
            keys.insert(field, 1);
            IndexModel::builder()
                .keys(keys)
                .options(
                    IndexOptions::builder()
                        .name(format!("{}_unique", field))
                        .unique(true)
                        .sparse(true)
                        .build(),
                )
                .build()
        };

        let identity_indexes = vec![
            unique_sparse("email"),
            unique_sparse("phone"),
            unique_sparse("username"),
            IndexModel::builder()
                .keys(doc! { "account_kind": 1, "staff.role": 1 })
                .options(IndexOptions::builder().name("staff_role_idx".to_string()).build())
                .build(),
        ];

        self.identities()
            .create_indexes(identity_indexes, None)
            .await
            .map_err(|e| {
                tracing::error!("Failed to create identity indexes: {}", e);
                AppError::DatabaseError(anyhow::anyhow!(e.to_string()))
            })?;

        // Expired codes are already invalid at verification; the TTL index
        // only reclaims space.
        let otp_indexes = vec![
            IndexModel::builder()
                .keys(doc! { "phone": 1 })
                .options(
                    IndexOptions::builder()
                        .name("phone_unique".to_string())
                        .unique(true)
                        .build(),
                )
                .build(),
            IndexModel::builder()
                .keys(doc! { "expires_at": 1 })
                .options(
                    IndexOptions::builder()
                        .name("expires_at_ttl".to_string())
                        .expire_after(Duration::from_secs(0))
                        .build(),
                )
                .build(),
        ];

        self.otp_codes()
            .create_indexes(otp_indexes, None)
            .await
            .map_err(|e| {
                tracing::error!("Failed to create otp indexes: {}", e);
                AppError::DatabaseError(anyhow::anyhow!(e.to_string()))
            })?;

        tracing::info!("MongoDB indexes created");
        Ok(())
    }
}

#[async_trait]
impl CredentialStore for MongoDb {
    async fn insert_identity(&self, identity: &Identity) -> Result<(), StoreError> {
        self.identities()
            .insert_one(identity, None)
            .await
            .map(|_| ())
            .map_err(classify)
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<Identity>, StoreError> {
        self.identities()
            .find_one(doc! { "_id": id }, None)
            .await
            .map_err(classify)
    }

    async fn find_one(
        &self,
        lookup: &IdentityLookup,
        account_kind: Option<AccountKind>,
    ) -> Result<Option<Identity>, StoreError> {
        self.identities()
            .find_one(lookup_filter(lookup, account_kind), None)
            .await
            .map_err(classify)
    }

    async fn replace_identity(&self, identity: &Identity) -> Result<bool, StoreError> {
        let result = self
            .identities()
            .replace_one(doc! { "_id": &identity.id }, identity, None)
            .await
            .map_err(classify)?;
        Ok(result.matched_count > 0)
    }

    async fn record_login(&self, id: &str, at: DateTime<Utc>) -> Result<(), StoreError> {
        let at = BsonDateTime::from_chrono(at);

        self.identities()
            .update_one(
                doc! { "_id": id },
                doc! { "$set": { "last_login": at, "updated_at": at } },
                None,
            )
            .await
            .map_err(classify)?;

        self.identities()
            .update_one(
                doc! { "_id": id, "staff": { "$exists": true } },
                doc! { "$set": { "staff.is_first_login": false } },
                None,
            )
            .await
            .map(|_| ())
            .map_err(classify)
    }

    async fn list_staff(&self, filter: &StaffFilter) -> Result<Vec<Identity>, StoreError> {
        let mut query = doc! { "account_kind": AccountKind::Staff.as_str() };
        if let Some(role) = &filter.role {
            query.insert("staff.role", role);
        }
        if let Some(status) = filter.status {
            query.insert("status", status.as_str());
        }

        let options = FindOptions::builder().sort(doc! { "created_at": -1 }).build();
        let cursor = self
            .identities()
            .find(query, options)
            .await
            .map_err(classify)?;
        cursor.try_collect().await.map_err(classify)
    }

    async fn delete_identity(&self, id: &str) -> Result<bool, StoreError> {
        let result = self
            .identities()
            .delete_one(doc! { "_id": id }, None)
            .await
            .map_err(classify)?;
        Ok(result.deleted_count > 0)
    }

    async fn count_identities(&self) -> Result<u64, StoreError> {
        self.identities()
            .count_documents(doc! {}, None)
            .await
            .map_err(classify)
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        self.db
            .run_command(doc! { "ping": 1 }, None)
            .await
            .map(|_| ())
            .map_err(classify)
    }
}

#[async_trait]
impl OtpStore for MongoDb {
    async fn replace_code(&self, record: &OtpRecord) -> Result<(), StoreError> {
        let update = doc! {
            "$set": {
                "code_hash": &record.code_hash,
                "attempt_count": 0,
                "created_at": BsonDateTime::from_chrono(record.created_at),
                "expires_at": BsonDateTime::from_chrono(record.expires_at),
            },
            "$setOnInsert": { "_id": &record.id },
        };

        let collection = self.otp_codes();
        let filter = doc! { "phone": &record.phone };
        let (collection, filter, update) = (&collection, &filter, &update);

        // Two sends for one phone can both try to insert; the loser retries
        // as an update.
        upsert_with_retry(|| async move {
            let options = UpdateOptions::builder().upsert(true).build();
            collection
                .update_one(filter.clone(), update.clone(), options)
                .await
                .map(|_| ())
                .map_err(classify)
        })
        .await
    }

    async fn take_code(
        &self,
        phone: &str,
        code_hash: &str,
        now: DateTime<Utc>,
        max_attempts: i32,
    ) -> Result<Option<OtpRecord>, StoreError> {
        let live = doc! {
            "phone": phone,
            "expires_at": { "$gt": BsonDateTime::from_chrono(now) },
            "attempt_count": { "$lt": max_attempts },
        };

        let mut matching = live.clone();
        matching.insert("code_hash", code_hash);
        let taken = self
            .otp_codes()
            .find_one_and_delete(matching, None)
            .await
            .map_err(classify)?;
        if taken.is_some() {
            return Ok(taken);
        }

        let options = FindOneAndUpdateOptions::builder()
            .return_document(ReturnDocument::After)
            .build();
        let counted = self
            .otp_codes()
            .find_one_and_update(live, doc! { "$inc": { "attempt_count": 1 } }, options)
            .await
            .map_err(classify)?;

        if let Some(record) = counted.filter(|r| r.attempt_count >= max_attempts) {
            tracing::warn!("OTP discarded after too many wrong attempts");
            self.otp_codes()
                .delete_one(doc! { "_id": &record.id }, None)
                .await
                .map_err(classify)?;
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::AuthProvider;

    #[test]
    fn test_lookup_filter_shapes() {
        let filter = lookup_filter(
            &IdentityLookup::EmailOrPhone {
                email: "a@x.com".to_string(),
                phone: "9998887770".to_string(),
            },
            Some(AccountKind::Seller),
        );
        assert!(filter.contains_key("$or"));
        assert_eq!(filter.get_str("account_kind").unwrap(), "seller");

        let filter = lookup_filter(&IdentityLookup::Username("asha".to_string()), None);
        assert_eq!(filter.get_str("username").unwrap(), "asha");
        assert!(!filter.contains_key("account_kind"));
    }

    #[tokio::test]
    async fn test_upsert_retried_once_after_lost_race() {
        let calls = std::sync::atomic::AtomicUsize::new(0);
        let calls = &calls;
        let result = upsert_with_retry(|| async move {
            if calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst) == 0 {
                Err(StoreError::Duplicate("phone".to_string()))
            } else {
                Ok(())
            }
        })
        .await;
        assert!(result.is_ok());
        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_repeated_conflict_is_unavailable_not_duplicate() {
        let result =
            upsert_with_retry(|| async { Err(StoreError::Duplicate("phone".to_string())) }).await;
        assert!(matches!(result, Err(StoreError::Unavailable(_))));
    }

    #[tokio::test]
    #[ignore = "Requires running MongoDB"]
    async fn test_mongo_unique_email_is_duplicate() {
        let uri = std::env::var("MONGODB_URI")
            .unwrap_or_else(|_| "mongodb://localhost:27017".to_string());
        let db_name = format!("test_identity_{}", uuid::Uuid::new_v4());
        let db = MongoDb::connect(&uri, &db_name, Duration::from_secs(5))
            .await
            .unwrap();
        db.initialize_indexes().await.unwrap();

        let first = Identity::new(
            "Asha".to_string(),
            Some("a@x.com".to_string()),
            None,
            AccountKind::Seller,
            AuthProvider::Password,
            Utc::now(),
        )
        .unwrap();
        let mut second = first.clone();
        second.id = uuid::Uuid::new_v4().to_string();

        db.insert_identity(&first).await.unwrap();
        let err = db.insert_identity(&second).await.unwrap_err();
        assert!(matches!(err, StoreError::Duplicate(_)));
        assert_eq!(db.count_identities().await.unwrap(), 1);

        db.db.drop(None).await.unwrap();
    }
}
