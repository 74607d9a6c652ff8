//! Record slot identifiers

use std::fmt;

use crate::error::{Error, Result};

/// Physical template slot on the sensor
///
/// Valid ids lie in `1..=DeviceRecordId::MAX`. A slot is unique per device
/// at any instant but may be reused after deletion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DeviceRecordId(u16);

impl DeviceRecordId {
    /// Highest slot number the reference sensor exposes
    pub const MAX: u16 = 1000;

    /// First slot
    pub const FIRST: Self = Self(1);

    /// Create a record id, rejecting 0 and anything above [`Self::MAX`]
    ///
    /// # Examples
    ///
    /// ```
    /// use thumbid_types::DeviceRecordId;
    ///
    /// assert!(DeviceRecordId::new(4).is_ok());
    /// assert!(DeviceRecordId::new(0).is_err());
    /// assert!(DeviceRecordId::new(1001).is_err());
    /// ```
    pub fn new(value: u16) -> Result<Self> {
        if value == 0 || value > Self::MAX {
            return Err(Error::Validation(format!(
                "record id {} outside 1..={}",
                value,
                Self::MAX
            )));
        }
        Ok(Self(value))
    }

    /// Raw slot number
    pub fn get(self) -> u16 {
        self.0
    }
}

impl fmt::Display for DeviceRecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<u16> for DeviceRecordId {
    type Error = Error;

    fn try_from(value: u16) -> Result<Self> {
        Self::new(value)
    }
}

impl From<DeviceRecordId> for u16 {
    fn from(id: DeviceRecordId) -> u16 {
        id.0
    }
}

/// Token issued by the sensor when a template is stored
///
/// # Token Structure
///
/// ```text
/// ┌──────────┬──────────┬──────────┐
/// │  Prefix  │   Unit   │ RecordId │
/// │ N chars  │ 3 chars  │ 4 digits │
/// └──────────┴──────────┴──────────┘
/// ```
///
/// The full token is what gets persisted; the record id is only used to
/// verify the slot the sensor actually wrote.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EncodedRecordId {
    token: String,
    unit: String,
    record_id: DeviceRecordId,
}

impl EncodedRecordId {
    /// Width of the unit segment
    pub const UNIT_LEN: usize = 3;

    /// Width of the zero-padded record segment
    pub const ID_LEN: usize = 4;

    /// Parse a token that must start with `prefix`
    ///
    /// # Errors
    ///
    /// Returns [`Error::Parse`] if:
    /// - the prefix is missing
    /// - the remainder is not exactly unit + id wide
    /// - the id segment is not all digits or is not a valid slot
    ///
    /// # Examples
    ///
    /// ```
    /// use thumbid_types::EncodedRecordId;
    ///
    /// let record = EncodedRecordId::parse("TIDA010004", "TID").unwrap();
    /// assert_eq!(record.unit(), "A01");
    /// assert_eq!(record.record_id().get(), 4);
    ///
    /// assert!(EncodedRecordId::parse("XY12", "TID").is_err());
    /// ```
    pub fn parse(token: &str, prefix: &str) -> Result<Self> {
        let rest = token
            .strip_prefix(prefix)
            .ok_or_else(|| Error::Parse(format!("token {:?} lacks prefix {:?}", token, prefix)))?;

        if !rest.is_ascii() || rest.len() != Self::UNIT_LEN + Self::ID_LEN {
            return Err(Error::Parse(format!(
                "token {:?} has {} chars after prefix, expected {}",
                token,
                rest.chars().count(),
                Self::UNIT_LEN + Self::ID_LEN
            )));
        }

        let (unit, digits) = rest.split_at(Self::UNIT_LEN);
        if !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(Error::Parse(format!(
                "token {:?} has non-numeric record segment {:?}",
                token, digits
            )));
        }

        let value: u16 = digits
            .parse()
            .map_err(|e| Error::Parse(format!("token {:?}: {}", token, e)))?;
        let record_id = DeviceRecordId::new(value)
            .map_err(|e| Error::Parse(format!("token {:?}: {}", token, e)))?;

        Ok(Self {
            token: token.to_string(),
            unit: unit.to_string(),
            record_id,
        })
    }

    /// Full token as reported by the sensor
    pub fn as_str(&self) -> &str {
        &self.token
    }

    /// Unit segment
    pub fn unit(&self) -> &str {
        &self.unit
    }

    /// Slot the sensor wrote
    pub fn record_id(&self) -> DeviceRecordId {
        self.record_id
    }
}

impl fmt::Display for EncodedRecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.token)
    }
}
