//! Outbound collaborators: welcome notifications and SMS delivery.

use async_trait::async_trait;
use serde_json::json;
use service_core::error::AppError;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::instrument;

use crate::config::CollaboratorConfig;
use crate::models::Identity;

#[async_trait]
pub trait WelcomeNotifier: Send + Sync {
    async fn send_welcome(&self, identity: &Identity) -> Result<(), AppError>;
}

#[async_trait]
pub trait SmsGateway: Send + Sync {
    async fn send_otp(&self, phone: &str, code: &str, expiry_minutes: i64) -> Result<(), AppError>;
}

fn http_client(timeout_seconds: u64) -> Result<reqwest::Client, AppError> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_seconds))
        .build()
        .map_err(|e| AppError::ConfigError(anyhow::anyhow!("Failed to build HTTP client: {}", e)))
}

async fn post_json(
    client: &reqwest::Client,
    url: &str,
    body: serde_json::Value,
) -> Result<(), AppError> {
    let response = client.post(url).json(&body).send().await.map_err(|e| {
        if e.is_timeout() {
            AppError::ServiceUnavailable(format!("{} timed out", url))
        } else {
            AppError::ServiceUnavailable(format!("{} unreachable: {}", url, e))
        }
    })?;

    if !response.status().is_success() {
        return Err(AppError::ServiceUnavailable(format!(
            "{} returned {}",
            url,
            response.status()
        )));
    }
    Ok(())
}

/// Posts welcome events to the notification service.
#[derive(Clone)]
pub struct HttpWelcomeNotifier {
    client: reqwest::Client,
    url: String,
}

impl HttpWelcomeNotifier {
    pub fn new(url: &str, timeout_seconds: u64) -> Result<Self, AppError> {
        tracing::info!(url = %url, "Welcome notifications enabled");
        Ok(Self {
            client: http_client(timeout_seconds)?,
            url: url.to_string(),
        })
    }
}

#[async_trait]
impl WelcomeNotifier for HttpWelcomeNotifier {
    #[instrument(skip(self, identity), fields(identity_id = %identity.id))]
    async fn send_welcome(&self, identity: &Identity) -> Result<(), AppError> {
        post_json(
            &self.client,
            &self.url,
            json!({
                "type": "welcome",
                "identity_id": identity.id,
                "name": identity.name,
                "email": identity.email,
                "phone": identity.phone,
                "account_kind": identity.account_kind,
            }),
        )
        .await
    }
}

/// Sends OTP messages through an HTTP SMS gateway.
#[derive(Clone)]
pub struct HttpSmsGateway {
    client: reqwest::Client,
    url: String,
}

impl HttpSmsGateway {
    pub fn new(url: &str, timeout_seconds: u64) -> Result<Self, AppError> {
        tracing::info!(url = %url, "SMS gateway enabled");
        Ok(Self {
            client: http_client(timeout_seconds)?,
            url: url.to_string(),
        })
    }
}

#[async_trait]
impl SmsGateway for HttpSmsGateway {
    #[instrument(skip(self, code))]
    async fn send_otp(&self, phone: &str, code: &str, expiry_minutes: i64) -> Result<(), AppError> {
        post_json(
            &self.client,
            &self.url,
            json!({
                "to": phone,
                "message": format!(
                    "Your verification code is {}. It expires in {} minutes.",
                    code, expiry_minutes
                ),
            }),
        )
        .await
    }
}

/// Stand-in when a collaborator is disabled: records the event in the log
/// only. Codes are never logged.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogOnlyCollaborator;

#[async_trait]
impl WelcomeNotifier for LogOnlyCollaborator {
    async fn send_welcome(&self, identity: &Identity) -> Result<(), AppError> {
        tracing::info!(identity_id = %identity.id, "Welcome notification skipped (disabled)");
        Ok(())
    }
}

#[async_trait]
impl SmsGateway for LogOnlyCollaborator {
    async fn send_otp(&self, phone: &str, _code: &str, _expiry_minutes: i64) -> Result<(), AppError> {
        tracing::info!(phone = %phone, "OTP SMS skipped (disabled)");
        Ok(())
    }
}

pub fn welcome_notifier_from(
    config: &CollaboratorConfig,
) -> Result<Arc<dyn WelcomeNotifier>, AppError> {
    match (&config.url, config.enabled) {
        (Some(url), true) => Ok(Arc::new(HttpWelcomeNotifier::new(
            url,
            config.timeout_seconds,
        )?)),
        _ => Ok(Arc::new(LogOnlyCollaborator)),
    }
}

pub fn sms_gateway_from(
    config: &CollaboratorConfig,
) -> Result<Arc<dyn SmsGateway>, AppError> {
    match (&config.url, config.enabled) {
        (Some(url), true) => Ok(Arc::new(HttpSmsGateway::new(
            url,
            config.timeout_seconds,
        )?)),
        _ => Ok(Arc::new(LogOnlyCollaborator)),
    }
}

/// Records welcomes; can be told to fail.
#[derive(Debug, Default)]
pub struct MockNotifier {
    welcomed: Mutex<Vec<String>>,
    fail: AtomicBool,
}

impl MockNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        let mock = Self::default();
        mock.fail.store(true, Ordering::SeqCst);
        mock
    }

    /// Ids of identities welcomed so far.
    pub fn welcomed(&self) -> Vec<String> {
        self.welcomed.lock().map(|w| w.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl WelcomeNotifier for MockNotifier {
    async fn send_welcome(&self, identity: &Identity) -> Result<(), AppError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(AppError::ServiceUnavailable(
                "notification service down".to_string(),
            ));
        }
        if let Ok(mut welcomed) = self.welcomed.lock() {
            welcomed.push(identity.id.clone());
        }
        Ok(())
    }
}

/// Captures outgoing codes so tests can read them back.
#[derive(Debug, Default)]
pub struct MockSmsGateway {
    sent: Mutex<Vec<(String, String)>>,
    fail: AtomicBool,
}

impl MockSmsGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn last_code_for(&self, phone: &str) -> Option<String> {
        self.sent.lock().ok().and_then(|sent| {
            sent.iter()
                .rev()
                .find(|(p, _)| p == phone)
                .map(|(_, code)| code.clone())
        })
    }

    pub fn sent_count(&self) -> usize {
        self.sent.lock().map(|s| s.len()).unwrap_or_default()
    }
}

#[async_trait]
impl SmsGateway for MockSmsGateway {
    async fn send_otp(&self, phone: &str, code: &str, _expiry_minutes: i64) -> Result<(), AppError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(AppError::ServiceUnavailable("sms gateway down".to_string()));
        }
        if let Ok(mut sent) = self.sent.lock() {
            sent.push((phone.to_string(), code.to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disabled_collaborators_fall_back_to_log_only() {
        let config = CollaboratorConfig {
            url: Some("http://localhost:9/notify".to_string()),
            enabled: false,
            timeout_seconds: 1,
        };
        assert!(welcome_notifier_from(&config).is_ok());
        assert!(sms_gateway_from(&config).is_ok());
    }

    #[tokio::test]
    async fn test_unreachable_gateway_is_service_unavailable() {
        // Port 9 (discard) is closed on test machines.
        let gateway = HttpSmsGateway::new("http://127.0.0.1:9/sms", 1).unwrap();
        let err = gateway.send_otp("9998887771", "123456", 10).await.unwrap_err();
        assert!(matches!(err, AppError::ServiceUnavailable(_)));
    }

    #[tokio::test]
    async fn test_mock_sms_records_latest_code() {
        let sms = MockSmsGateway::new();
        sms.send_otp("111", "000001", 10).await.unwrap();
        sms.send_otp("111", "000002", 10).await.unwrap();
        assert_eq!(sms.last_code_for("111").as_deref(), Some("000002"));
        assert_eq!(sms.sent_count(), 2);
    }
}
