//! Type definitions for thumbid

pub mod error;
pub mod identity;
pub mod record;

pub use error::{Error, Result};
pub use identity::{FingerprintBinding, IdentityContext, Passkey, UserId};
pub use record::{DeviceRecordId, EncodedRecordId};
