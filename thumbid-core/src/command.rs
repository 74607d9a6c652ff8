//! Sensor command definitions

use std::fmt;
use std::str::FromStr;

use bytes::{BufMut, Bytes, BytesMut};
use thumbid_types::DeviceRecordId;

use crate::constants::commands;
use crate::error::{Error, Result};

/// Commands understood by the sensor firmware
///
/// Every command is a single newline-terminated text line. The sensor
/// answers with one or more status lines; see [`crate::parser`].
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Command {
    /// Report occupied slots (`IDS:...`)
    GetIds,

    /// Start the capture sequence into the sensor's next free slot
    Enroll,

    /// Clear one slot
    DeleteId(DeviceRecordId),
}

impl Command {
    /// Get command name
    pub fn name(self) -> &'static str {
        match self {
            Self::GetIds => commands::GET_IDS,
            Self::Enroll => commands::ENROLL,
            Self::DeleteId(_) => "DELETE_ID",
        }
    }

    /// Encode to wire form, including the trailing newline
    ///
    /// # Examples
    ///
    /// ```
    /// use thumbid_core::Command;
    /// use thumbid_types::DeviceRecordId;
    ///
    /// assert_eq!(&Command::GetIds.encode()[..], b"GET_IDS\n");
    ///
    /// let id = DeviceRecordId::new(12).unwrap();
    /// assert_eq!(&Command::DeleteId(id).encode()[..], b"DELETE_ID:12\n");
    /// ```
    pub fn encode(self) -> Bytes {
        let text = self.to_string();
        let mut buf = BytesMut::with_capacity(text.len() + 1);
        buf.put_slice(text.as_bytes());
        buf.put_u8(b'\n');
        buf.freeze()
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DeleteId(id) => write!(f, "{}{}", commands::DELETE_ID, id),
            other => f.write_str(other.name()),
        }
    }
}

impl FromStr for Command {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        match s {
            commands::GET_IDS => Ok(Self::GetIds),
            commands::ENROLL => Ok(Self::Enroll),
            _ => {
                let raw = s
                    .strip_prefix(commands::DELETE_ID)
                    .ok_or_else(|| Error::UnknownCommand(s.to_string()))?;
                let value: u16 = raw
                    .trim()
                    .parse()
                    .map_err(|_| Error::UnknownCommand(s.to_string()))?;
                Ok(Self::DeleteId(DeviceRecordId::new(value)?))
            }
        }
    }
}
