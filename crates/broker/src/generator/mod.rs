//! Account name suffixes and passwords for issued credentials

pub mod identifier;
pub mod password;

pub use identifier::{UserIdScheme, format_short_id, short_id};
pub use password::{PasswordError, PasswordSpec, generate_password, opaque_token};
