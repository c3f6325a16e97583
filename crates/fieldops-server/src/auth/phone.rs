//! Canonical phone numbers.
//!
//! Every path that stores or looks up a phone goes through
//! [`normalize_phone`]: strip everything that is not an ASCII digit.

use crate::error::{ServiceError, ServiceResult};

pub const MIN_PHONE_DIGITS: usize = 10;
pub const MAX_PHONE_DIGITS: usize = 15;

/// Digits-only form of `raw`. Idempotent.
pub fn normalize_phone(raw: &str) -> String {
    raw.chars().filter(char::is_ascii_digit).collect()
}

/// Normalize and require a plausible length.
pub fn parse_phone(raw: &str) -> ServiceResult<String> {
    let phone = normalize_phone(raw);
    if !(MIN_PHONE_DIGITS..=MAX_PHONE_DIGITS).contains(&phone.len()) {
        return Err(ServiceError::Validation(format!(
            "phone number must have {MIN_PHONE_DIGITS}-{MAX_PHONE_DIGITS} digits"
        )));
    }
    Ok(phone)
}

/// Last four digits, safe to log.
pub fn phone_suffix(phone: &str) -> &str {
    &phone[phone.len().saturating_sub(4)..]
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn strips_formatting() {
        assert_eq!(normalize_phone("+91 98765-43210"), "919876543210");
        assert_eq!(normalize_phone("(987) 654.3210"), "9876543210");
        assert_eq!(normalize_phone("٩٨٧"), "");
    }

    #[test]
    fn normalization_is_idempotent() {
        for raw in [
            "9876543210",
            "+1 (555) 010-9999",
            "98 76 54 32 10 ext",
            "  0044 20 7946 0958 ",
        ] {
            let once = normalize_phone(raw);
            assert_eq!(normalize_phone(&once), once);
        }
    }

    #[test]
    fn parse_enforces_length() {
        assert_eq!(parse_phone("98765 43210").unwrap(), "9876543210");
        assert!(matches!(
            parse_phone("12345"),
            Err(ServiceError::Validation(_))
        ));
        assert!(parse_phone("1234567890123456").is_err());
    }

    #[test]
    fn suffix_is_last_four() {
        assert_eq!(phone_suffix("9876543210"), "3210");
        assert_eq!(phone_suffix("12"), "12");
    }
}
