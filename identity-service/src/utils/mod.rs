pub mod password;
pub mod validation;

pub use password::{generate_password, hash_password, verify_password};
pub use validation::{is_valid_email, is_valid_phone, ValidatedJson};
