pub mod auth;

pub use auth::{
    require_authenticated, require_permission, require_role, AccessGate, AuthUser,
    enforce_access,
};
