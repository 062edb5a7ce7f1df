pub mod identity;
pub mod otp;

pub use identity::{
    AccountKind, AgentProfile, AuthProvider, Identity, IdentityStatus, IdentityView, Preferences,
    PriceRange, StaffProfile,
};
pub use otp::OtpRecord;
