pub mod auth;
pub mod metrics;
pub mod otp;
pub mod staff;
