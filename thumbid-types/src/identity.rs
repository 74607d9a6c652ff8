//! Identity structures

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};

use crate::error::{Error, Result};
use crate::record::EncodedRecordId;

/// Identifier of a user in the identity database
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct UserId(String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Six-digit numeric passkey handed to a user for self-registration
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Passkey(u32);

impl Passkey {
    /// Number of digits in a passkey
    pub const DIGITS: usize = 6;

    const MAX: u32 = 999_999;

    pub fn new(value: u32) -> Result<Self> {
        if value > Self::MAX {
            return Err(Error::Validation(format!(
                "passkey must have at most {} digits",
                Self::DIGITS
            )));
        }
        Ok(Self(value))
    }

    pub fn get(self) -> u32 {
        self.0
    }
}

impl FromStr for Passkey {
    type Err = Error;

    /// Parse exactly six ASCII digits; leading zeros are significant input
    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.len() != Self::DIGITS || !s.bytes().all(|b| b.is_ascii_digit()) {
            return Err(Error::Parse(format!(
                "passkey must be exactly {} digits",
                Self::DIGITS
            )));
        }
        let value = s
            .parse()
            .map_err(|e| Error::Parse(format!("passkey: {}", e)))?;
        Self::new(value)
    }
}

impl fmt::Display for Passkey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:06}", self.0)
    }
}

// Passkeys are short-lived secrets; keep them out of logs.
impl fmt::Debug for Passkey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Passkey(******)")
    }
}

/// Who is enrolling, and on which physical unit
///
/// Supplied by the caller before an enrollment starts and read-only for the
/// lifetime of the attempt.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IdentityContext {
    /// User the template will be bound to
    pub user_id: UserId,

    /// Label of the physical unit hosting the sensor
    pub unit_label: String,
}

impl IdentityContext {
    pub fn new(user_id: UserId, unit_label: impl Into<String>) -> Self {
        Self {
            user_id,
            unit_label: unit_label.into(),
        }
    }
}

impl fmt::Display for IdentityContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.user_id, self.unit_label)
    }
}

/// Persisted association between a user and a sensor record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FingerprintBinding {
    pub user_id: UserId,
    pub record: EncodedRecordId,
    pub bound_at: DateTime<Utc>,
}

impl FingerprintBinding {
    pub fn new(user_id: UserId, record: EncodedRecordId) -> Self {
        Self {
            user_id,
            record,
            bound_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_passkey_from_str() {
        let key: Passkey = "012345".parse().unwrap();
        assert_eq!(key.get(), 12345);
        assert_eq!(key.to_string(), "012345");
    }

    #[test]
    fn test_passkey_rejects_wrong_width() {
        assert!("12345".parse::<Passkey>().is_err());
        assert!("1234567".parse::<Passkey>().is_err());
        assert!("12a456".parse::<Passkey>().is_err());
        assert!(Passkey::new(1_000_000).is_err());
    }

    #[test]
    fn test_passkey_debug_is_redacted() {
        let key = Passkey::new(424242).unwrap();
        assert!(!format!("{:?}", key).contains("424242"));
    }

    #[test]
    fn test_identity_display() {
        let identity = IdentityContext::new(UserId::new("u-17"), "A01");
        assert_eq!(identity.to_string(), "u-17@A01");
    }
}
