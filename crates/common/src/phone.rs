//! Phone number normalization.
//!
//! All phone numbers are stored in canonical `+91XXXXXXXXXX` form so that
//! OTP lookups and delivery verification compare equal regardless of how
//! the customer typed the number.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PhoneError {
    #[error("phone number must contain exactly 10 digits after the country code")]
    InvalidLength,

    #[error("phone number contains invalid characters")]
    InvalidCharacters,
}

/// A normalized Indian mobile number: `+91` followed by 10 digits.
///
/// Construction goes through [`Phone::parse`], so a `Phone` value is
/// always in canonical form and two values for the same number are equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Phone(String);

impl Phone {
    /// Parses and normalizes a raw phone number.
    ///
    /// Accepts `+91` prefixed, `91` prefixed, or bare 10-digit input, with
    /// any mix of spaces and dashes between digits.
    pub fn parse(raw: &str) -> Result<Self, PhoneError> {
        let cleaned: String = raw
            .chars()
            .filter(|c| !c.is_whitespace() && *c != '-')
            .collect();

        let digits = cleaned.strip_prefix("+91").unwrap_or_else(|| {
            if cleaned.len() == 12 {
                cleaned.strip_prefix("91").unwrap_or(&cleaned)
            } else {
                &cleaned
            }
        });

        if !digits.chars().all(|c| c.is_ascii_digit()) {
            return Err(PhoneError::InvalidCharacters);
        }
        if digits.len() != 10 {
            return Err(PhoneError::InvalidLength);
        }

        Ok(Self(format!("+91{digits}")))
    }

    /// Returns the canonical form, e.g. `+919876543210`.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Phone {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for Phone {
    type Err = PhoneError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Phone::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_bare_ten_digits() {
        let phone = Phone::parse("9876543210").unwrap();
        assert_eq!(phone.as_str(), "+919876543210");
    }

    #[test]
    fn accepts_country_code_variants() {
        for raw in ["+919876543210", "919876543210", "+91 98765 43210", "98765-43210"] {
            let phone = Phone::parse(raw).unwrap();
            assert_eq!(phone.as_str(), "+919876543210", "input: {raw}");
        }
    }

    #[test]
    fn equal_numbers_compare_equal_across_formats() {
        let a = Phone::parse("+91 98765 43210").unwrap();
        let b = Phone::parse("9876543210").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn rejects_wrong_length() {
        assert_eq!(Phone::parse("12345").unwrap_err(), PhoneError::InvalidLength);
        assert_eq!(
            Phone::parse("98765432100").unwrap_err(),
            PhoneError::InvalidLength
        );
    }

    #[test]
    fn rejects_non_digits() {
        assert_eq!(
            Phone::parse("98765abcde").unwrap_err(),
            PhoneError::InvalidCharacters
        );
    }

    #[test]
    fn serde_is_transparent() {
        let phone = Phone::parse("9876543210").unwrap();
        let json = serde_json::to_string(&phone).unwrap();
        assert_eq!(json, "\"+919876543210\"");
    }
}
