use chrono::Duration;
use rand::{rngs::OsRng, Rng};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::instrument;
use uuid::Uuid;

use super::clock::Clock;
use super::error::ServiceError;
use super::notifier::SmsGateway;
use super::store::OtpStore;
use crate::config::OtpConfig;
use crate::models::OtpRecord;

/// One-time codes for phone login.
///
/// A phone has at most one live code: sending again supersedes the earlier
/// one, a successful verification consumes it, and too many wrong guesses
/// discard it.
#[derive(Clone)]
pub struct OtpService {
    store: Arc<dyn OtpStore>,
    sms: Arc<dyn SmsGateway>,
    clock: Arc<dyn Clock>,
    config: OtpConfig,
}

/// Hash bound to the phone so equal codes for different phones differ.
pub fn hash_code(phone: &str, code: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(phone.as_bytes());
    hasher.update(b":");
    hasher.update(code.as_bytes());
    hex::encode(hasher.finalize())
}

impl OtpService {
    pub fn new(
        store: Arc<dyn OtpStore>,
        sms: Arc<dyn SmsGateway>,
        clock: Arc<dyn Clock>,
        config: OtpConfig,
    ) -> Result<Self, ServiceError> {
        config
            .validate()
            .map_err(|e| ServiceError::Internal(anyhow::anyhow!("Invalid OTP settings: {}", e)))?;
        if config.demo_code.is_some() {
            tracing::warn!("OTP demo code is enabled; every phone receives the same code");
        }
        Ok(Self {
            store,
            sms,
            clock,
            config,
        })
    }

    fn generate_code(&self) -> Result<String, ServiceError> {
        if let Some(code) = &self.config.demo_code {
            return Ok(code.clone());
        }

        let width = self.config.code_length as usize;
        let upper = 10u32.checked_pow(self.config.code_length).ok_or_else(|| {
            ServiceError::Internal(anyhow::anyhow!("OTP code length is too large"))
        })?;
        let value = OsRng.gen_range(0..upper);
        Ok(format!("{:0width$}", value, width = width))
    }

    #[instrument(skip(self))]
    pub async fn send(&self, phone: &str) -> Result<(), ServiceError> {
        let phone = phone.trim();
        if phone.is_empty() {
            return Err(ServiceError::invalid("Phone number is required"));
        }

        let code = self.generate_code()?;
        let now = self.clock.now();
        let record = OtpRecord {
            id: Uuid::new_v4().to_string(),
            phone: phone.to_string(),
            code_hash: hash_code(phone, &code),
            attempt_count: 0,
            created_at: now,
            expires_at: now + Duration::minutes(self.config.expiry_minutes),
        };

        self.store.replace_code(&record).await?;

        self.sms
            .send_otp(phone, &code, self.config.expiry_minutes)
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "Failed to deliver OTP");
                ServiceError::StoreUnavailable(format!("SMS delivery failed: {}", e))
            })?;

        metrics::counter!("otp_sent_total").increment(1);
        tracing::info!(expires_at = %record.expires_at, "OTP issued");
        Ok(())
    }

    /// Consume the live code for `phone` if `code` matches it.
    #[instrument(skip(self, code))]
    pub async fn verify(&self, phone: &str, code: &str) -> Result<OtpRecord, ServiceError> {
        let phone = phone.trim();
        let code = code.trim();
        if phone.is_empty() || code.is_empty() {
            return Err(ServiceError::OtpInvalidOrExpired);
        }

        let record = self
            .store
            .take_code(
                phone,
                &hash_code(phone, code),
                self.clock.now(),
                self.config.max_attempts,
            )
            .await?;

        match record {
            Some(record) => {
                metrics::counter!("otp_verified_total").increment(1);
                Ok(record)
            }
            None => {
                metrics::counter!("otp_rejected_total").increment(1);
                tracing::warn!("OTP rejected");
                Err(ServiceError::OtpInvalidOrExpired)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::clock::ManualClock;
    use crate::services::memory::InMemoryStore;
    use crate::services::notifier::MockSmsGateway;
    use chrono::Utc;

    struct Fixture {
        otp: OtpService,
        store: Arc<InMemoryStore>,
        sms: Arc<MockSmsGateway>,
        clock: Arc<ManualClock>,
    }

    fn fixture(config: OtpConfig) -> Fixture {
        let store = Arc::new(InMemoryStore::new());
        let sms = Arc::new(MockSmsGateway::new());
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let otp = OtpService::new(store.clone(), sms.clone(), clock.clone(), config).unwrap();
        Fixture {
            otp,
            store,
            sms,
            clock,
        }
    }

    #[tokio::test]
    async fn test_code_is_stored_hashed_with_ten_minute_expiry() {
        let f = fixture(OtpConfig::default());
        f.otp.send("9998887771").await.unwrap();

        let code = f.sms.last_code_for("9998887771").unwrap();
        assert_eq!(code.len(), 6);
        assert!(code.chars().all(|c| c.is_ascii_digit()));

        let record = f.store.otp_for("9998887771").unwrap();
        assert_ne!(record.code_hash, code);
        assert_eq!(record.code_hash, hash_code("9998887771", &code));
        assert_eq!(record.expires_at - record.created_at, Duration::minutes(10));
    }

    #[tokio::test]
    async fn test_expired_code_rejected() {
        let f = fixture(OtpConfig::default());
        f.otp.send("9998887771").await.unwrap();
        let code = f.sms.last_code_for("9998887771").unwrap();

        f.clock.advance(Duration::minutes(10));
        assert!(matches!(
            f.otp.verify("9998887771", &code).await,
            Err(ServiceError::OtpInvalidOrExpired)
        ));
    }

    #[tokio::test]
    async fn test_valid_just_before_expiry() {
        let f = fixture(OtpConfig::default());
        f.otp.send("9998887771").await.unwrap();
        let code = f.sms.last_code_for("9998887771").unwrap();

        f.clock.advance(Duration::minutes(10) - Duration::seconds(1));
        assert!(f.otp.verify("9998887771", &code).await.is_ok());
    }

    #[tokio::test]
    async fn test_code_dropped_after_max_wrong_attempts() {
        let f = fixture(OtpConfig {
            max_attempts: 3,
            ..OtpConfig::default()
        });
        f.otp.send("9998887771").await.unwrap();
        let code = f.sms.last_code_for("9998887771").unwrap();
        let wrong = if code == "000000" { "000001" } else { "000000" };

        for _ in 0..3 {
            assert!(matches!(
                f.otp.verify("9998887771", wrong).await,
                Err(ServiceError::OtpInvalidOrExpired)
            ));
        }
        assert!(f.store.otp_for("9998887771").is_none());
        assert!(matches!(
            f.otp.verify("9998887771", &code).await,
            Err(ServiceError::OtpInvalidOrExpired)
        ));
    }

    #[test]
    fn test_oversized_code_length_rejected_at_construction() {
        let result = OtpService::new(
            Arc::new(InMemoryStore::new()),
            Arc::new(MockSmsGateway::new()),
            Arc::new(ManualClock::new(Utc::now())),
            OtpConfig {
                code_length: 10,
                ..OtpConfig::default()
            },
        );
        assert!(matches!(result, Err(ServiceError::Internal(_))));
    }

    #[tokio::test]
    async fn test_demo_code_used_when_configured() {
        let f = fixture(OtpConfig {
            demo_code: Some("123456".to_string()),
            ..OtpConfig::default()
        });
        f.otp.send("9998887771").await.unwrap();
        assert_eq!(f.sms.last_code_for("9998887771").as_deref(), Some("123456"));
        assert!(f.otp.verify("9998887771", "123456").await.is_ok());
    }

    #[tokio::test]
    async fn test_blank_phone_is_invalid_input() {
        let f = fixture(OtpConfig::default());
        assert!(matches!(
            f.otp.send("  ").await,
            Err(ServiceError::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn test_gateway_failure_is_store_unavailable() {
        let f = fixture(OtpConfig::default());
        f.sms.set_failing(true);
        assert!(matches!(
            f.otp.send("9998887771").await,
            Err(ServiceError::StoreUnavailable(_))
        ));
    }
}
