use std::sync::{Arc, OnceLock};
use tracing::instrument;

use crate::{
    dtos::auth::{
        GoogleLoginRequest, IntrospectResponse, LoginRequest, RegisterRequest,
        UpdateProfileRequest,
    },
    models::{AccountKind, AgentProfile, AuthProvider, Identity},
    services::{
        clock::Clock,
        error::ServiceError,
        google::{GoogleProfile, GoogleVerifier},
        notifier::WelcomeNotifier,
        otp::OtpService,
        store::{CredentialStore, IdentityLookup, StoreError},
        token::{Claims, TokenService},
    },
    utils::{hash_password, is_valid_email, is_valid_phone, verify_password},
};

/// A signed-in identity and its freshly minted token.
#[derive(Debug, Clone)]
pub struct Session {
    pub identity: Identity,
    pub token: String,
    pub message: String,
}

#[derive(Clone)]
pub struct AuthService {
    store: Arc<dyn CredentialStore>,
    tokens: TokenService,
    otp: OtpService,
    google: Arc<dyn GoogleVerifier>,
    notifier: Arc<dyn WelcomeNotifier>,
    clock: Arc<dyn Clock>,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn normalize_email(value: Option<String>) -> Option<String> {
    non_empty(value).map(|v| v.to_lowercase())
}

/// Parse a sign-up kind; only buyer, seller and agent are accepted.
fn self_service_kind(
    raw: Option<&str>,
    default: AccountKind,
) -> Result<AccountKind, ServiceError> {
    let kind = match raw.map(str::trim).filter(|r| !r.is_empty()) {
        Some(raw) => raw.parse::<AccountKind>().map_err(ServiceError::InvalidInput)?,
        None => default,
    };

    if !kind.is_self_service() {
        return Err(ServiceError::invalid(format!(
            "Cannot sign up as {}",
            kind
        )));
    }
    Ok(kind)
}

/// Hash checked against when no identity matched, so a miss costs the
/// same as a wrong password.
fn decoy_hash() -> Option<&'static str> {
    static DECOY: OnceLock<Option<String>> = OnceLock::new();
    DECOY
        .get_or_init(|| hash_password("decoy-password").ok())
        .as_deref()
}

impl AuthService {
    pub fn new(
        store: Arc<dyn CredentialStore>,
        tokens: TokenService,
        otp: OtpService,
        google: Arc<dyn GoogleVerifier>,
        notifier: Arc<dyn WelcomeNotifier>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            tokens,
            otp,
            google,
            notifier,
            clock,
        }
    }

    /// Side effect only: a failed welcome never fails the caller.
    async fn welcome(&self, identity: &Identity) {
        if let Err(e) = self.notifier.send_welcome(identity).await {
            tracing::warn!(
                identity_id = %identity.id,
                error = %e,
                "Welcome notification failed"
            );
        }
    }

    /// Admin and staff accounts sign in with a password only.
    fn refuse_privileged(identity: &Identity, channel: &str) -> Result<(), ServiceError> {
        if identity.account_kind.is_self_service() {
            return Ok(());
        }
        tracing::warn!(
            identity_id = %identity.id,
            account_kind = %identity.account_kind,
            channel,
            "Sign-in channel refused for privileged account"
        );
        Err(ServiceError::Forbidden(format!(
            "{} sign-in is not available for this account",
            channel
        )))
    }

    async fn start_session(
        &self,
        mut identity: Identity,
        message: &str,
    ) -> Result<Session, ServiceError> {
        if !identity.is_active() {
            tracing::warn!(identity_id = %identity.id, status = identity.status.as_str(), "Login refused for inactive account");
            return Err(ServiceError::Forbidden(format!(
                "Account is {}",
                identity.status.as_str()
            )));
        }

        let now = self.clock.now();
        self.store.record_login(&identity.id, now).await?;

        let first_login = identity
            .staff
            .as_ref()
            .is_some_and(|staff| staff.is_first_login);
        identity.last_login = Some(now);
        identity.updated_at = now;
        if let Some(staff) = identity.staff.as_mut() {
            staff.is_first_login = false;
        }

        let token = self.tokens.issue_for(&identity)?;
        metrics::counter!("logins_total", "account_kind" => identity.account_kind.as_str())
            .increment(1);

        let message = if first_login {
            format!("{}. Please change your password.", message)
        } else {
            message.to_string()
        };

        Ok(Session {
            identity,
            token,
            message,
        })
    }

    /// Insert, or when a concurrent request won the unique index, return
    /// the winner's record.
    async fn insert_or_fetch(
        &self,
        identity: Identity,
        lookup: IdentityLookup,
    ) -> Result<(Identity, bool), ServiceError> {
        match self.store.insert_identity(&identity).await {
            Ok(()) => Ok((identity, true)),
            Err(StoreError::Duplicate(_)) => {
                let existing = self.store.find_one(&lookup, None).await?.ok_or_else(|| {
                    ServiceError::StoreUnavailable("identity vanished after conflict".to_string())
                })?;
                Ok((existing, false))
            }
            Err(e) => Err(e.into()),
        }
    }

    #[instrument(skip(self, req), fields(account_kind = ?req.account_kind))]
    pub async fn register(&self, req: RegisterRequest) -> Result<Session, ServiceError> {
        let name = req.name.trim().to_string();
        if name.is_empty() {
            return Err(ServiceError::invalid("Name is required"));
        }
        if req.password.is_empty() {
            return Err(ServiceError::invalid("Password is required"));
        }

        let email = normalize_email(req.email);
        let phone = non_empty(req.phone);

        let lookup = match (&email, &phone) {
            (Some(email), Some(phone)) => IdentityLookup::EmailOrPhone {
                email: email.clone(),
                phone: phone.clone(),
            },
            (Some(email), None) => IdentityLookup::Email(email.clone()),
            (None, Some(phone)) => IdentityLookup::Phone(phone.clone()),
            (None, None) => return Err(ServiceError::invalid("Email or phone is required")),
        };

        if email.as_deref().is_some_and(|e| !is_valid_email(e)) {
            return Err(ServiceError::invalid("Please enter a valid email address"));
        }
        if phone.as_deref().is_some_and(|p| !is_valid_phone(p)) {
            return Err(ServiceError::invalid("Please enter a valid phone number"));
        }

        let account_kind = self_service_kind(req.account_kind.as_deref(), AccountKind::Buyer)?;

        if self.store.find_one(&lookup, None).await?.is_some() {
            tracing::info!("Registration rejected: email or phone already in use");
            return Err(ServiceError::DuplicateIdentity);
        }

        let mut identity = Identity::new(
            name,
            email,
            phone,
            account_kind,
            AuthProvider::Password,
            self.clock.now(),
        )
        .ok_or_else(|| ServiceError::invalid("Email or phone is required"))?;

        identity.password_hash = Some(hash_password(&req.password)?);

        if account_kind == AccountKind::Agent {
            identity.agent_profile = Some(AgentProfile::new(
                req.experience,
                req.specializations.unwrap_or_default(),
                req.service_areas.unwrap_or_default(),
            ));
        }

        // A concurrent registration can still win the unique index here.
        self.store.insert_identity(&identity).await?;

        tracing::info!(
            identity_id = %identity.id,
            account_kind = %identity.account_kind,
            "Identity registered"
        );
        metrics::counter!("registrations_total", "account_kind" => account_kind.as_str())
            .increment(1);

        self.welcome(&identity).await;

        let token = self.tokens.issue_for(&identity)?;
        Ok(Session {
            identity,
            token,
            message: "Registration successful".to_string(),
        })
    }

    #[instrument(skip(self, req))]
    pub async fn login(&self, req: LoginRequest) -> Result<Session, ServiceError> {
        let username = non_empty(req.username).map(|u| u.to_lowercase());
        let email = normalize_email(req.email);
        let phone = non_empty(req.phone);

        let lookup = match (username, email, phone) {
            (Some(username), _, _) => IdentityLookup::Username(username),
            (None, Some(email), Some(phone)) => IdentityLookup::EmailOrPhone { email, phone },
            (None, Some(email), None) => IdentityLookup::Email(email),
            (None, None, Some(phone)) => IdentityLookup::Phone(phone),
            (None, None, None) => {
                return Err(ServiceError::invalid("Email, phone or username is required"))
            }
        };

        let account_kind = match non_empty(req.account_kind) {
            Some(raw) => Some(
                raw.parse::<AccountKind>()
                    .map_err(ServiceError::InvalidInput)?,
            ),
            None => None,
        };

        let identity = self.store.find_one(&lookup, account_kind).await?;

        let matched = match &identity {
            Some(identity) => identity
                .password_hash
                .as_deref()
                .is_some_and(|hash| verify_password(&req.password, hash)),
            None => {
                if let Some(decoy) = decoy_hash() {
                    let _ = verify_password(&req.password, decoy);
                }
                false
            }
        };

        let identity = match identity {
            Some(identity) if matched => identity,
            _ => {
                tracing::warn!("Login failed: invalid credentials");
                metrics::counter!("login_failures_total").increment(1);
                return Err(ServiceError::InvalidCredentials);
            }
        };

        let session = self.start_session(identity, "Login successful").await?;
        tracing::info!(identity_id = %session.identity.id, "Login succeeded");
        Ok(session)
    }

    #[instrument(skip(self))]
    pub async fn send_otp(&self, phone: &str) -> Result<(), ServiceError> {
        let phone = phone.trim();
        if !phone.is_empty() && !is_valid_phone(phone) {
            return Err(ServiceError::invalid("Please enter a valid phone number"));
        }
        self.otp.send(phone).await
    }

    /// Consume the code, then sign in the identity owning the phone,
    /// creating a seller account on first use.
    #[instrument(skip(self, code))]
    pub async fn verify_otp(&self, phone: &str, code: &str) -> Result<Session, ServiceError> {
        self.otp.verify(phone, code).await?;
        let phone = phone.trim().to_string();
        let lookup = IdentityLookup::Phone(phone.clone());

        let identity = match self.store.find_one(&lookup, None).await? {
            Some(identity) => {
                Self::refuse_privileged(&identity, "OTP")?;
                identity
            }
            None => {
                let identity = Identity::new(
                    phone.clone(),
                    None,
                    Some(phone),
                    AccountKind::Seller,
                    AuthProvider::Otp,
                    self.clock.now(),
                )
                .ok_or_else(|| ServiceError::invalid("Phone number is required"))?;

                let (identity, created) = self.insert_or_fetch(identity, lookup).await?;
                if created {
                    tracing::info!(identity_id = %identity.id, "Identity created from OTP login");
                    self.welcome(&identity).await;
                }
                identity
            }
        };

        self.start_session(identity, "Login successful").await
    }

    /// Check the ID token with Google, then sign in the verified profile.
    #[instrument(skip(self, req))]
    pub async fn google_login(&self, req: GoogleLoginRequest) -> Result<Session, ServiceError> {
        let id_token = req.id_token.trim();
        if id_token.is_empty() {
            return Err(ServiceError::invalid("ID token is required"));
        }
        let profile = self.google.verify(id_token).await?;
        self.federated_login(profile, req.account_kind.as_deref())
            .await
    }

    /// Sign in a profile asserted by Google. Callers must only pass profiles
    /// that came out of a [`GoogleVerifier`].
    #[instrument(skip(self, profile), fields(subject = %profile.subject))]
    pub async fn federated_login(
        &self,
        profile: GoogleProfile,
        account_kind: Option<&str>,
    ) -> Result<Session, ServiceError> {
        if !profile.email_verified {
            tracing::warn!("Google sign-in refused: email not verified");
            return Err(ServiceError::invalid("Google account email not verified"));
        }
        let email = normalize_email(Some(profile.email))
            .ok_or_else(|| ServiceError::invalid("Email is required"))?;
        if !is_valid_email(&email) {
            return Err(ServiceError::invalid("Please enter a valid email address"));
        }
        let account_kind = self_service_kind(account_kind, AccountKind::Seller)?;
        let lookup = IdentityLookup::Email(email.clone());

        if let Some(existing) = self.store.find_one(&lookup, None).await? {
            Self::refuse_privileged(&existing, "Google")?;
            return self.start_session(existing, "Login successful").await;
        }

        let name = non_empty(profile.name)
            .or_else(|| {
                let full = format!(
                    "{} {}",
                    profile.given_name.unwrap_or_default(),
                    profile.family_name.unwrap_or_default()
                );
                non_empty(Some(full))
            })
            .unwrap_or_else(|| email.split('@').next().unwrap_or_default().to_string());

        let mut identity = Identity::new(
            name,
            Some(email),
            None,
            account_kind,
            AuthProvider::Google,
            self.clock.now(),
        )
        .ok_or_else(|| ServiceError::invalid("Email is required"))?;
        identity.email_verified = true;

        let (identity, created) = self.insert_or_fetch(identity, lookup).await?;
        if created {
            tracing::info!(identity_id = %identity.id, "Identity created from Google sign-in");
            self.welcome(&identity).await;
        }

        self.start_session(identity, "Login successful").await
    }

    pub fn verify_token(&self, token: &str) -> Result<Claims, ServiceError> {
        self.tokens.verify(token)
    }

    /// Never fails: anything that does not verify is reported inactive.
    pub fn introspect(&self, token: &str) -> IntrospectResponse {
        match self.tokens.verify(token) {
            Ok(claims) => IntrospectResponse::from(claims),
            Err(_) => IntrospectResponse::default(),
        }
    }

    pub async fn profile(&self, identity_id: &str) -> Result<Identity, ServiceError> {
        self.store
            .find_by_id(identity_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound("User not found".to_string()))
    }

    #[instrument(skip(self, req))]
    pub async fn update_profile(
        &self,
        identity_id: &str,
        req: UpdateProfileRequest,
    ) -> Result<Identity, ServiceError> {
        let mut identity = self.profile(identity_id).await?;

        if let Some(name) = req.name {
            let name = name.trim();
            if name.is_empty() {
                return Err(ServiceError::invalid("Name is required"));
            }
            identity.name = name.to_string();
        }

        if let Some(phone) = req.phone {
            match non_empty(Some(phone)) {
                Some(phone) if is_valid_phone(&phone) => identity.phone = Some(phone),
                Some(_) => return Err(ServiceError::invalid("Please enter a valid phone number")),
                None if identity.email.is_some() => identity.phone = None,
                None => return Err(ServiceError::invalid("Email or phone is required")),
            }
        }

        if let Some(preferences) = req.preferences {
            if preferences.price_range.min > preferences.price_range.max {
                return Err(ServiceError::invalid(
                    "Minimum price cannot exceed maximum price",
                ));
            }
            identity.preferences = preferences;
        }

        if let Some(favorites) = req.favorites {
            let mut seen = std::collections::HashSet::new();
            identity.favorites = favorites
                .into_iter()
                .filter(|f| seen.insert(f.clone()))
                .collect();
        }

        if let Some(update) = req.agent_profile {
            if identity.account_kind != AccountKind::Agent {
                return Err(ServiceError::invalid("Only agents have an agent profile"));
            }
            let profile = identity
                .agent_profile
                .get_or_insert_with(|| AgentProfile::new(None, Vec::new(), Vec::new()));
            if update.experience.is_some() {
                profile.experience = update.experience;
            }
            if let Some(specializations) = update.specializations {
                profile.specializations = specializations;
            }
            if let Some(service_areas) = update.service_areas {
                profile.service_areas = service_areas;
            }
            if let Some(about_me) = update.about_me {
                profile.about_me = about_me;
            }
        }

        identity.updated_at = self.clock.now();

        if !self.store.replace_identity(&identity).await? {
            return Err(ServiceError::NotFound("User not found".to_string()));
        }

        tracing::info!(identity_id = %identity.id, "Profile updated");
        Ok(identity)
    }
}
