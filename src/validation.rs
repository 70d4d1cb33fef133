//! Input validation shared by the auth core, the moderation engine and the
//! HTTP handlers.
//!
//! Validators return `Err(message)` describing the problem; callers attach the
//! failing field name when converting into [`crate::Error::Validation`].

use lazy_static::lazy_static;
use regex::Regex;

use crate::{Error, Result};

lazy_static! {
    /// Letters, digits, underscore, dot and dash
    static ref USERNAME_REGEX: Regex = Regex::new(r"^[A-Za-z0-9_.-]+$").unwrap();

    /// Deliberately loose: one `@`, no whitespace, a dot in the domain part
    static ref EMAIL_REGEX: Regex =
        Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
}

pub const MAX_TITLE_LEN: usize = 200;
pub const MAX_CONTENT_LEN: usize = 5000;
pub const MAX_NAME_LEN: usize = 100;
pub const MAX_NOTES_LEN: usize = 1000;
const MAX_PASSWORD_LEN: usize = 1024;

/// Validate a username (3-50 characters)
pub fn validate_username(username: &str) -> std::result::Result<(), String> {
    if username.is_empty() {
        return Err("Username is required".to_string());
    }

    let len = username.chars().count();
    if !(3..=50).contains(&len) {
        return Err("Username must be between 3 and 50 characters".to_string());
    }

    if !USERNAME_REGEX.is_match(username) {
        return Err(
            "Username may only contain letters, numbers, underscores, dots and dashes".to_string(),
        );
    }

    Ok(())
}

/// Validate an email address
pub fn validate_email(email: &str) -> std::result::Result<(), String> {
    if email.len() > 254 {
        return Err("Email is too long (max 254 characters)".to_string());
    }

    if !EMAIL_REGEX.is_match(email) {
        return Err("Invalid email address".to_string());
    }

    Ok(())
}

/// Validate a new password against the configured minimum length
pub fn validate_password(password: &str, min_length: usize) -> std::result::Result<(), String> {
    let len = password.chars().count();
    if len < min_length {
        return Err(format!(
            "Password must be at least {} characters",
            min_length
        ));
    }

    if len > MAX_PASSWORD_LEN {
        return Err(format!(
            "Password is too long (max {} characters)",
            MAX_PASSWORD_LEN
        ));
    }

    Ok(())
}

/// Validate a required free-text field; whitespace-only counts as missing
pub fn validate_text(label: &str, value: &str, max_len: usize) -> std::result::Result<(), String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(format!("{} is required", label));
    }

    if trimmed.chars().count() > max_len {
        return Err(format!(
            "{} is too long (max {} characters)",
            label, max_len
        ));
    }

    Ok(())
}

/// Run a validator and tag its message with the field name
pub fn check(field: &'static str, result: std::result::Result<(), String>) -> Result<()> {
    result.map_err(|message| Error::validation(field, message))
}

/// Trim an optional string, mapping blank to `None`
pub fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_usernames() {
        assert!(validate_username("alice").is_ok());
        assert!(validate_username("bob.smith").is_ok());
        assert!(validate_username("carol_admin-2").is_ok());
    }

    #[test]
    fn test_invalid_usernames() {
        assert!(validate_username("").is_err());
        assert!(validate_username("ab").is_err());
        assert!(validate_username(&"a".repeat(51)).is_err());
        assert!(validate_username("has space").is_err());
        assert!(validate_username("semi;colon").is_err());
    }

    #[test]
    fn test_email() {
        assert!(validate_email("alice@example.org").is_ok());
        assert!(validate_email("alice").is_err());
        assert!(validate_email("alice@localhost").is_err());
        assert!(validate_email("a b@example.org").is_err());
    }

    #[test]
    fn test_password_length() {
        assert!(validate_password("12345678", 8).is_ok());
        assert!(validate_password("1234567", 8).is_err());
        assert!(validate_password(&"x".repeat(2000), 8).is_err());
    }

    #[test]
    fn test_text() {
        assert!(validate_text("Title", "Healing", MAX_TITLE_LEN).is_ok());
        assert!(validate_text("Title", "   ", MAX_TITLE_LEN).is_err());
        assert!(validate_text("Title", &"x".repeat(201), MAX_TITLE_LEN).is_err());
    }

    #[test]
    fn test_check_tags_field() {
        let err = check("title", validate_text("Title", "", 10)).unwrap_err();
        match err {
            Error::Validation { field, message } => {
                assert_eq!(field, "title");
                assert_eq!(message, "Title is required");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_non_blank() {
        assert_eq!(non_blank(Some("  x ")), Some("x"));
        assert_eq!(non_blank(Some("   ")), None);
        assert_eq!(non_blank(None), None);
    }
}
