use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::ToSchema;

use super::clock::Clock;
use super::error::ServiceError;
use crate::config::{JwtConfig, MAX_TOKEN_EXPIRY_DAYS};
use crate::models::{AccountKind, Identity};

/// Session token payload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
pub struct Claims {
    /// Identity id
    pub sub: String,
    pub account_kind: AccountKind,
    /// Staff role, when the identity is staff
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    pub iat: i64,
    pub exp: i64,
}

/// Issues and verifies HS256 session tokens.
///
/// Tokens are stateless: there is no revocation list, so a leaked token
/// stays valid until `exp`.
#[derive(Clone)]
pub struct TokenService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    expiry: Duration,
    clock: Arc<dyn Clock>,
}

impl TokenService {
    pub fn new(config: &JwtConfig, clock: Arc<dyn Clock>) -> Result<Self, ServiceError> {
        let secret = config.secret.expose_secret().as_bytes();
        if secret.is_empty() {
            return Err(ServiceError::Internal(anyhow::anyhow!(
                "Token signing secret is empty"
            )));
        }
        if !(1..=MAX_TOKEN_EXPIRY_DAYS).contains(&config.token_expiry_days) {
            return Err(ServiceError::Internal(anyhow::anyhow!(
                "Token expiry must be between 1 and {} days",
                MAX_TOKEN_EXPIRY_DAYS
            )));
        }
        let expiry = Duration::try_days(config.token_expiry_days).ok_or_else(|| {
            ServiceError::Internal(anyhow::anyhow!("Token expiry is out of range"))
        })?;

        Ok(Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            expiry,
            clock,
        })
    }

    pub fn expiry(&self) -> Duration {
        self.expiry
    }

    /// Token for a stored identity, with the staff role when present.
    pub fn issue_for(&self, identity: &Identity) -> Result<String, ServiceError> {
        self.issue(
            &identity.id,
            identity.account_kind,
            identity.role(),
            identity.email.as_deref(),
        )
    }

    pub fn issue(
        &self,
        identity_id: &str,
        account_kind: AccountKind,
        role: Option<&str>,
        email: Option<&str>,
    ) -> Result<String, ServiceError> {
        self.issue_at(identity_id, account_kind, role, email, self.clock.now())
    }

    pub fn issue_at(
        &self,
        identity_id: &str,
        account_kind: AccountKind,
        role: Option<&str>,
        email: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<String, ServiceError> {
        let expires_at = now.checked_add_signed(self.expiry).ok_or_else(|| {
            ServiceError::Internal(anyhow::anyhow!("Token expiry overflows the clock"))
        })?;
        let claims = Claims {
            sub: identity_id.to_string(),
            account_kind,
            role: role.map(str::to_string),
            email: email.map(str::to_string),
            iat: now.timestamp(),
            exp: expires_at.timestamp(),
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| ServiceError::Internal(anyhow::anyhow!("Failed to sign token: {}", e)))
    }

    pub fn verify(&self, token: &str) -> Result<Claims, ServiceError> {
        self.verify_at(token, self.clock.now())
    }

    /// Valid strictly before `exp`; expired at and after it.
    pub fn verify_at(&self, token: &str, now: DateTime<Utc>) -> Result<Claims, ServiceError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        validation.leeway = 0;

        let claims = decode::<Claims>(token, &self.decoding_key, &validation)
            .map_err(|e| {
                tracing::debug!(error = %e, "Token rejected");
                ServiceError::TokenInvalid
            })?
            .claims;

        if now.timestamp() >= claims.exp {
            return Err(ServiceError::TokenExpired);
        }

        Ok(claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::clock::SystemClock;
    use secrecy::SecretString;

    fn service(secret: &str) -> TokenService {
        TokenService::new(
            &JwtConfig {
                secret: SecretString::new(secret.to_string()),
                token_expiry_days: 7,
            },
            Arc::new(SystemClock),
        )
        .unwrap()
    }

    #[test]
    fn test_claims_round_trip() {
        let tokens = service("unit-test-secret-unit-test-secret");
        let token = tokens
            .issue("id-1", AccountKind::Staff, Some("sales_manager"), None)
            .unwrap();

        let claims = tokens.verify(&token).unwrap();
        assert_eq!(claims.sub, "id-1");
        assert_eq!(claims.account_kind, AccountKind::Staff);
        assert_eq!(claims.role.as_deref(), Some("sales_manager"));
        assert_eq!(claims.exp - claims.iat, 7 * 24 * 60 * 60);
    }

    #[test]
    fn test_expiry_boundary() {
        let tokens = service("unit-test-secret-unit-test-secret");
        let issued = Utc::now();
        let token = tokens
            .issue_at("id-1", AccountKind::Seller, None, None, issued)
            .unwrap();
        let expiry = issued + Duration::days(7);

        assert!(tokens
            .verify_at(&token, expiry - Duration::seconds(1))
            .is_ok());
        assert!(matches!(
            tokens.verify_at(&token, expiry),
            Err(ServiceError::TokenExpired)
        ));
        assert!(matches!(
            tokens.verify_at(&token, expiry + Duration::seconds(1)),
            Err(ServiceError::TokenExpired)
        ));
    }

    #[test]
    fn test_foreign_secret_is_invalid() {
        let token = service("first-secret-first-secret-first!!")
            .issue("id-1", AccountKind::Buyer, None, None)
            .unwrap();

        let result = service("second-secret-second-secret-second").verify(&token);
        assert!(matches!(result, Err(ServiceError::TokenInvalid)));
    }

    #[test]
    fn test_malformed_token_is_invalid() {
        let tokens = service("unit-test-secret-unit-test-secret");
        assert!(matches!(
            tokens.verify("not.a.token"),
            Err(ServiceError::TokenInvalid)
        ));
        assert!(matches!(tokens.verify(""), Err(ServiceError::TokenInvalid)));
    }

    #[test]
    fn test_empty_secret_rejected() {
        let result = TokenService::new(
            &JwtConfig {
                secret: SecretString::new(String::new()),
                token_expiry_days: 7,
            },
            Arc::new(SystemClock),
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_out_of_range_expiry_rejected() {
        for days in [0, -3, MAX_TOKEN_EXPIRY_DAYS + 1, i64::MAX] {
            let result = TokenService::new(
                &JwtConfig {
                    secret: SecretString::new("unit-test-secret-unit-test-secret".to_string()),
                    token_expiry_days: days,
                },
                Arc::new(SystemClock),
            );
            assert!(
                matches!(result, Err(ServiceError::Internal(_))),
                "{days} days accepted"
            );
        }
    }
}
