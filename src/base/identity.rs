//! Parsing of fully qualified chat user IDs.

use std::sync::OnceLock;

use regex::Regex;
use thiserror::Error;

/// Error returned when a chat user ID is not of the form `@name:domain`.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum IdentityError {
    #[error("Malformed user ID `{0}`, expected `@name:domain`")]
    Malformed(String),
}

fn user_id_regex() -> &'static Regex {
    static USER_ID: OnceLock<Regex> = OnceLock::new();
    USER_ID.get_or_init(|| Regex::new(r"^@([^:]+):(.+)$").expect("user ID pattern is valid"))
}

/// Extract the localpart (`name`) from a user ID of the form `@name:domain`.
///
/// The localpart doubles as the directory username (the "kerb").
pub fn extract_localpart(user_id: &str) -> Result<&str, IdentityError> {
    user_id_regex()
        .captures(user_id)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
        .ok_or_else(|| IdentityError::Malformed(user_id.to_string()))
}
