pub mod auth;
pub mod catalog;
pub mod clock;
pub mod database;
pub mod error;
pub mod google;
pub mod memory;
pub mod notifier;
pub mod otp;
pub mod staff;
pub mod store;
pub mod token;

pub use auth::{AuthService, Session};
pub use catalog::{PermissionCatalog, RoleDefinition};
pub use clock::{Clock, ManualClock, SystemClock};
pub use database::MongoDb;
pub use error::ServiceError;
pub use google::{GoogleProfile, GoogleVerifier, MockGoogleVerifier};
pub use memory::InMemoryStore;
pub use notifier::{MockNotifier, MockSmsGateway, SmsGateway, WelcomeNotifier};
pub use otp::OtpService;
pub use staff::{CreatedStaff, StaffService};
pub use store::{CredentialStore, OtpStore, StoreError};
pub use token::{Claims, TokenService};
