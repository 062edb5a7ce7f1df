use secrecy::{ExposeSecret, SecretString};
use service_core::config as core_config;
use service_core::error::AppError;
use std::env;
use std::fmt::Display;
use std::str::FromStr;

#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub common: core_config::Config,
    pub environment: Environment,
    pub service_name: String,
    pub service_version: String,
    pub log_level: String,
    pub otlp_endpoint: Option<String>,
    pub mongodb: MongoConfig,
    pub jwt: JwtConfig,
    pub otp: OtpConfig,
    pub notification: CollaboratorConfig,
    pub sms: CollaboratorConfig,
    pub google: GoogleConfig,
    pub security: SecurityConfig,
    pub rate_limit: RateLimitConfig,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Environment {
    Dev,
    Prod,
}

#[derive(Debug, Clone)]
pub struct MongoConfig {
    pub uri: String,
    pub database: String,
    pub timeout_seconds: u64,
}

#[derive(Debug, Clone)]
pub struct JwtConfig {
    pub secret: SecretString,
    pub token_expiry_days: i64,
}

#[derive(Debug, Clone)]
pub struct OtpConfig {
    pub code_length: u32,
    pub expiry_minutes: i64,
    /// Wrong guesses a code survives; it is discarded on the last one.
    pub max_attempts: i32,
    /// Fixed code for local demos. Refused outside `dev`.
    pub demo_code: Option<String>,
}

/// Longest session the signer accepts.
pub const MAX_TOKEN_EXPIRY_DAYS: i64 = 365;

impl OtpConfig {
    pub fn validate(&self) -> Result<(), AppError> {
        if !(1..=24 * 60).contains(&self.expiry_minutes) {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "OTP_EXPIRY_MINUTES must be between 1 and 1440"
            )));
        }

        if !(4..=9).contains(&self.code_length) {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "OTP_CODE_LENGTH must be between 4 and 9"
            )));
        }

        if self.max_attempts < 1 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "OTP_MAX_ATTEMPTS must be at least 1"
            )));
        }

        if let Some(code) = &self.demo_code {
            if code.len() != self.code_length as usize || !code.chars().all(|c| c.is_ascii_digit())
            {
                return Err(AppError::ConfigError(anyhow::anyhow!(
                    "OTP_DEMO_CODE must be {} digits",
                    self.code_length
                )));
            }
        }

        Ok(())
    }
}

impl Default for OtpConfig {
    fn default() -> Self {
        Self {
            code_length: 6,
            expiry_minutes: 10,
            max_attempts: 5,
            demo_code: None,
        }
    }
}

/// An outbound HTTP collaborator (notification service, SMS gateway).
#[derive(Debug, Clone)]
pub struct CollaboratorConfig {
    pub url: Option<String>,
    pub enabled: bool,
    pub timeout_seconds: u64,
}

/// Google sign-in. Without a client id the endpoint refuses every request.
#[derive(Debug, Clone)]
pub struct GoogleConfig {
    pub client_id: Option<String>,
    pub tokeninfo_url: String,
    pub timeout_seconds: u64,
}

impl Default for GoogleConfig {
    fn default() -> Self {
        Self {
            client_id: None,
            tokeninfo_url: "https://oauth2.googleapis.com/tokeninfo".to_string(),
            timeout_seconds: 5,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SecurityConfig {
    pub allowed_origins: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub login_attempts: u32,
    pub login_window_seconds: u64,
    pub register_attempts: u32,
    pub register_window_seconds: u64,
    pub otp_attempts: u32,
    pub otp_window_seconds: u64,
    pub verify_otp_attempts: u32,
    pub verify_otp_window_seconds: u64,
    pub global_ip_limit: u32,
    pub global_ip_window_seconds: u64,
    /// Key limiters on `x-forwarded-for`. Only safe behind a proxy that
    /// overwrites the header.
    pub trust_forwarded_for: bool,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            login_attempts: 5,
            login_window_seconds: 900,
            register_attempts: 3,
            register_window_seconds: 3600,
            otp_attempts: 5,
            otp_window_seconds: 600,
            verify_otp_attempts: 10,
            verify_otp_window_seconds: 600,
            global_ip_limit: 100,
            global_ip_window_seconds: 60,
            trust_forwarded_for: false,
        }
    }
}

impl AuthConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let common_config = core_config::Config::load()?;

        let env_str = env::var("ENVIRONMENT").unwrap_or_else(|_| "dev".to_string());
        let environment: Environment = env_str
            .parse()
            .map_err(|e: String| AppError::ConfigError(anyhow::anyhow!(e)))?;

        let is_prod = environment == Environment::Prod;

        let config = AuthConfig {
            common: common_config,
            environment,
            service_name: get_env_or("SERVICE_NAME", "identity-service"),
            service_version: get_env_or("SERVICE_VERSION", env!("CARGO_PKG_VERSION")),
            log_level: get_env_or("LOG_LEVEL", "info"),
            otlp_endpoint: get_optional_env("OTLP_ENDPOINT"),
            mongodb: MongoConfig {
                uri: get_env("MONGODB_URI", Some("mongodb://localhost:27017"), is_prod)?,
                database: get_env("MONGODB_DATABASE", Some("estate"), is_prod)?,
                timeout_seconds: parse_env("MONGODB_TIMEOUT_SECONDS", 5)?,
            },
            jwt: JwtConfig {
                secret: SecretString::new(get_env("JWT_SECRET", None, is_prod)?),
                token_expiry_days: parse_env("JWT_TOKEN_EXPIRY_DAYS", 7)?,
            },
            otp: OtpConfig {
                code_length: parse_env("OTP_CODE_LENGTH", 6)?,
                expiry_minutes: parse_env("OTP_EXPIRY_MINUTES", 10)?,
                max_attempts: parse_env("OTP_MAX_ATTEMPTS", 5)?,
                demo_code: get_optional_env("OTP_DEMO_CODE"),
            },
            notification: CollaboratorConfig {
                url: get_optional_env("NOTIFICATION_SERVICE_URL"),
                enabled: parse_env("NOTIFICATION_ENABLED", false)?,
                timeout_seconds: parse_env("NOTIFICATION_TIMEOUT_SECONDS", 5)?,
            },
            sms: CollaboratorConfig {
                url: get_optional_env("SMS_GATEWAY_URL"),
                enabled: parse_env("SMS_ENABLED", false)?,
                timeout_seconds: parse_env("SMS_TIMEOUT_SECONDS", 5)?,
            },
            google: GoogleConfig {
                client_id: get_optional_env("GOOGLE_CLIENT_ID"),
                tokeninfo_url: get_env_or(
                    "GOOGLE_TOKENINFO_URL",
                    "https://oauth2.googleapis.com/tokeninfo",
                ),
                timeout_seconds: parse_env("GOOGLE_TIMEOUT_SECONDS", 5)?,
            },
            security: SecurityConfig {
                allowed_origins: get_env(
                    "ALLOWED_ORIGINS",
                    Some("http://localhost:3000"),
                    is_prod,
                )?
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            },
            rate_limit: RateLimitConfig {
                login_attempts: parse_env("RATE_LIMIT_LOGIN_ATTEMPTS", 5)?,
                login_window_seconds: parse_env("RATE_LIMIT_LOGIN_WINDOW_SECONDS", 900)?,
                register_attempts: parse_env("RATE_LIMIT_REGISTER_ATTEMPTS", 3)?,
                register_window_seconds: parse_env("RATE_LIMIT_REGISTER_WINDOW_SECONDS", 3600)?,
                otp_attempts: parse_env("RATE_LIMIT_OTP_ATTEMPTS", 5)?,
                otp_window_seconds: parse_env("RATE_LIMIT_OTP_WINDOW_SECONDS", 600)?,
                verify_otp_attempts: parse_env("RATE_LIMIT_VERIFY_OTP_ATTEMPTS", 10)?,
                verify_otp_window_seconds: parse_env(
                    "RATE_LIMIT_VERIFY_OTP_WINDOW_SECONDS",
                    600,
                )?,
                global_ip_limit: parse_env("RATE_LIMIT_GLOBAL_IP_LIMIT", 100)?,
                global_ip_window_seconds: parse_env("RATE_LIMIT_GLOBAL_IP_WINDOW_SECONDS", 60)?,
                trust_forwarded_for: parse_env("RATE_LIMIT_TRUST_FORWARDED_FOR", false)?,
            },
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), AppError> {
        if self.common.port == 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "PORT must be greater than 0"
            )));
        }

        if !(1..=MAX_TOKEN_EXPIRY_DAYS).contains(&self.jwt.token_expiry_days) {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "JWT_TOKEN_EXPIRY_DAYS must be between 1 and {}",
                MAX_TOKEN_EXPIRY_DAYS
            )));
        }

        let secret_len = self.jwt.secret.expose_secret().len();
        if secret_len == 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "JWT_SECRET must not be empty"
            )));
        }
        if secret_len < 32 {
            tracing::warn!("JWT_SECRET is shorter than 32 bytes");
        }

        self.otp.validate()?;

        for (name, collaborator) in [("NOTIFICATION", &self.notification), ("SMS", &self.sms)] {
            if collaborator.enabled && collaborator.url.is_none() {
                return Err(AppError::ConfigError(anyhow::anyhow!(
                    "{} is enabled but no URL is configured",
                    name
                )));
            }
        }

        if self.environment == Environment::Prod {
            if self.security.allowed_origins.iter().any(|o| o == "*") {
                return Err(AppError::ConfigError(anyhow::anyhow!(
                    "Wildcard CORS origin not allowed in production"
                )));
            }

            if self.otp.demo_code.is_some() {
                return Err(AppError::ConfigError(anyhow::anyhow!(
                    "OTP_DEMO_CODE is a development-only setting"
                )));
            }

            if self.rate_limit.trust_forwarded_for {
                tracing::warn!("Rate limits are keyed on x-forwarded-for; the proxy must overwrite it");
            }

            if !self.sms.enabled {
                tracing::error!("SMS delivery is disabled in production; OTP login will not work");
            }
        }

        Ok(())
    }
}

/// Required setting. `dev_default` applies only outside production.
fn get_env(key: &str, dev_default: Option<&str>, is_prod: bool) -> Result<String, AppError> {
    match env::var(key) {
        Ok(val) => Ok(val),
        Err(_) => {
            if is_prod {
                Err(AppError::ConfigError(anyhow::anyhow!(format!(
                    "{} is required in production but not set",
                    key
                ))))
            } else if let Some(def) = dev_default {
                Ok(def.to_string())
            } else {
                Err(AppError::ConfigError(anyhow::anyhow!(format!(
                    "{} is required but not set",
                    key
                ))))
            }
        }
    }
}

fn get_env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn get_optional_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parse_env<T>(key: &str, default: T) -> Result<T, AppError>
where
    T: FromStr,
    T::Err: Display,
{
    match env::var(key) {
        Ok(raw) => raw.trim().parse().map_err(|e: T::Err| {
            AppError::ConfigError(anyhow::anyhow!("{} has an invalid value: {}", key, e))
        }),
        Err(_) => Ok(default),
    }
}

impl FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "dev" => Ok(Environment::Dev),
            "prod" => Ok(Environment::Prod),
            _ => Err(format!("Invalid environment: {}", s)),
        }
    }
}
