//! Google sign-in assertions.
//!
//! The client hands over the ID token Google issued to it; the profile used
//! for sign-in is whatever Google vouches for when the token is checked,
//! never what the request body claims.

use async_trait::async_trait;
use serde::Deserialize;
use service_core::error::AppError;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::instrument;

use super::error::ServiceError;
use crate::config::GoogleConfig;

const GOOGLE_ISSUERS: [&str; 2] = ["accounts.google.com", "https://accounts.google.com"];

/// Profile asserted by Google for a verified ID token.
#[derive(Debug, Clone, PartialEq)]
pub struct GoogleProfile {
    /// Google's stable account id.
    pub subject: String,
    pub email: String,
    pub email_verified: bool,
    pub name: Option<String>,
    pub given_name: Option<String>,
    pub family_name: Option<String>,
}

#[async_trait]
pub trait GoogleVerifier: Send + Sync {
    /// Check `id_token` with Google. A token Google does not vouch for, or
    /// one minted for another client, is `InvalidCredentials`.
    async fn verify(&self, id_token: &str) -> Result<GoogleProfile, ServiceError>;
}

/// Google reports booleans in tokeninfo as strings.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Flag {
    Bool(bool),
    Text(String),
}

impl Flag {
    fn is_true(&self) -> bool {
        match self {
            Flag::Bool(value) => *value,
            Flag::Text(value) => value == "true",
        }
    }
}

#[derive(Debug, Deserialize)]
struct TokenInfo {
    aud: String,
    iss: String,
    sub: String,
    email: Option<String>,
    email_verified: Option<Flag>,
    name: Option<String>,
    given_name: Option<String>,
    family_name: Option<String>,
}

impl TokenInfo {
    fn into_profile(self, client_id: &str) -> Result<GoogleProfile, ServiceError> {
        if self.aud != client_id {
            tracing::warn!("Google token issued for another client");
            return Err(ServiceError::InvalidCredentials);
        }
        if !GOOGLE_ISSUERS.contains(&self.iss.as_str()) {
            tracing::warn!(issuer = %self.iss, "Google token from unexpected issuer");
            return Err(ServiceError::InvalidCredentials);
        }
        let email = self.email.ok_or(ServiceError::InvalidCredentials)?;

        Ok(GoogleProfile {
            subject: self.sub,
            email,
            email_verified: self.email_verified.is_some_and(|f| f.is_true()),
            name: self.name,
            given_name: self.given_name,
            family_name: self.family_name,
        })
    }
}

/// Checks ID tokens against Google's tokeninfo endpoint, which validates
/// signature and expiry on Google's side.
#[derive(Clone)]
pub struct HttpGoogleVerifier {
    client: reqwest::Client,
    tokeninfo_url: String,
    client_id: String,
}

impl HttpGoogleVerifier {
    pub fn new(client_id: &str, tokeninfo_url: &str, timeout_seconds: u64) -> Result<Self, AppError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_seconds))
            .build()
            .map_err(|e| {
                AppError::ConfigError(anyhow::anyhow!("Failed to build HTTP client: {}", e))
            })?;

        tracing::info!(url = %tokeninfo_url, "Google sign-in enabled");
        Ok(Self {
            client,
            tokeninfo_url: tokeninfo_url.to_string(),
            client_id: client_id.to_string(),
        })
    }
}

#[async_trait]
impl GoogleVerifier for HttpGoogleVerifier {
    #[instrument(skip(self, id_token))]
    async fn verify(&self, id_token: &str) -> Result<GoogleProfile, ServiceError> {
        let response = self
            .client
            .get(&self.tokeninfo_url)
            .query(&[("id_token", id_token)])
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "Failed to reach Google tokeninfo");
                ServiceError::StoreUnavailable("Google sign-in is unavailable".to_string())
            })?;

        let status = response.status();
        if status.is_client_error() {
            tracing::warn!(status = %status, "Google rejected the ID token");
            return Err(ServiceError::InvalidCredentials);
        }
        if !status.is_success() {
            tracing::error!(status = %status, "Google tokeninfo error");
            return Err(ServiceError::StoreUnavailable(
                "Google sign-in is unavailable".to_string(),
            ));
        }

        let info: TokenInfo = response.json().await.map_err(|e| {
            tracing::error!(error = %e, "Failed to parse Google tokeninfo response");
            ServiceError::InvalidCredentials
        })?;
        info.into_profile(&self.client_id)
    }
}

/// Used when no client id is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct DisabledGoogleVerifier;

#[async_trait]
impl GoogleVerifier for DisabledGoogleVerifier {
    async fn verify(&self, _id_token: &str) -> Result<GoogleProfile, ServiceError> {
        Err(ServiceError::StoreUnavailable(
            "Google sign-in is not configured".to_string(),
        ))
    }
}

pub fn google_verifier_from(config: &GoogleConfig) -> Result<Arc<dyn GoogleVerifier>, AppError> {
    match &config.client_id {
        Some(client_id) => Ok(Arc::new(HttpGoogleVerifier::new(
            client_id,
            &config.tokeninfo_url,
            config.timeout_seconds,
        )?)),
        None => {
            tracing::info!("Google sign-in disabled (no client id)");
            Ok(Arc::new(DisabledGoogleVerifier))
        }
    }
}

/// Accepts only the tokens it has been handed profiles for.
#[derive(Debug, Default)]
pub struct MockGoogleVerifier {
    profiles: Mutex<HashMap<String, GoogleProfile>>,
}

impl MockGoogleVerifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn accept(&self, id_token: &str, profile: GoogleProfile) {
        if let Ok(mut profiles) = self.profiles.lock() {
            profiles.insert(id_token.to_string(), profile);
        }
    }
}

#[async_trait]
impl GoogleVerifier for MockGoogleVerifier {
    async fn verify(&self, id_token: &str) -> Result<GoogleProfile, ServiceError> {
        self.profiles
            .lock()
            .ok()
            .and_then(|profiles| profiles.get(id_token).cloned())
            .ok_or(ServiceError::InvalidCredentials)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token_info(aud: &str, iss: &str, verified: serde_json::Value) -> TokenInfo {
        serde_json::from_value(serde_json::json!({
            "aud": aud,
            "iss": iss,
            "sub": "1180",
            "email": "g@x.com",
            "email_verified": verified,
            "given_name": "Gita",
        }))
        .unwrap()
    }

    #[test]
    fn test_tokeninfo_accepted_for_our_client() {
        let profile = token_info("client-1", "https://accounts.google.com", "true".into())
            .into_profile("client-1")
            .unwrap();
        assert_eq!(profile.subject, "1180");
        assert_eq!(profile.email, "g@x.com");
        assert!(profile.email_verified);
        assert_eq!(profile.given_name.as_deref(), Some("Gita"));

        let profile = token_info("client-1", "accounts.google.com", false.into())
            .into_profile("client-1")
            .unwrap();
        assert!(!profile.email_verified);
    }

    #[test]
    fn test_foreign_audience_or_issuer_rejected() {
        assert!(matches!(
            token_info("client-2", "accounts.google.com", true.into()).into_profile("client-1"),
            Err(ServiceError::InvalidCredentials)
        ));
        assert!(matches!(
            token_info("client-1", "https://evil.example", true.into()).into_profile("client-1"),
            Err(ServiceError::InvalidCredentials)
        ));
    }

    #[tokio::test]
    async fn test_disabled_verifier_refuses() {
        let verifier = google_verifier_from(&GoogleConfig::default()).unwrap();
        assert!(matches!(
            verifier.verify("anything").await,
            Err(ServiceError::StoreUnavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_unreachable_tokeninfo_is_unavailable() {
        let verifier = HttpGoogleVerifier::new("client-1", "http://127.0.0.1:9/tokeninfo", 1).unwrap();
        assert!(matches!(
            verifier.verify("token").await,
            Err(ServiceError::StoreUnavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_mock_rejects_unknown_tokens() {
        let mock = MockGoogleVerifier::new();
        assert!(matches!(
            mock.verify("forged").await,
            Err(ServiceError::InvalidCredentials)
        ));
    }
}
