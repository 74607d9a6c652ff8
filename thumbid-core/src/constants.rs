//! Protocol constants

use thumbid_types::DeviceRecordId;

/// Number of template slots on the reference sensor
pub const CAPACITY: u16 = DeviceRecordId::MAX;

/// Deadline for a storage report after GET_IDS (seconds)
pub const DEFAULT_STORAGE_TIMEOUT: u64 = 8;

/// Deadline for a delete acknowledgment after DELETE_ID (seconds)
pub const DEFAULT_DELETE_TIMEOUT: u64 = 8;

/// Slot corrections allowed per attempt before giving up
pub const MAX_VERIFICATION_ATTEMPTS: u8 = 3;

/// Consecutive pre-capture re-snapshots allowed per attempt
pub const MAX_RESNAPSHOTS: u8 = 5;

/// Prefix of the token in a registration line
pub const DEFAULT_RECORD_PREFIX: &str = "TID";

/// Longest unterminated line kept while waiting for a newline
pub const MAX_LINE_LENGTH: usize = 4096;

/// Line patterns emitted by the sensor firmware
pub mod lines {
    /// `IDS:1,2,3` (empty list allowed)
    pub const STORAGE_REPORT: &str = "IDS:";

    /// Followed by the slot the sensor proposes
    pub const AWAITING_FINGER: &str = "Waiting for valid finger to enroll as #";

    pub const IMAGE_TAKEN: &str = "Image taken";
    pub const IMAGE_CONVERTED: &str = "Image converted";
    pub const REMOVE_FINGER: &str = "Remove finger";
    pub const PLACE_AGAIN: &str = "Place same finger again";
    pub const PRINTS_MATCHED: &str = "Prints matched!";
    pub const PRINTS_MISMATCHED: &str = "Fingerprints did not match";
    pub const IMAGE_MESSY: &str = "Image too messy";
    pub const NO_FEATURES: &str = "Could not find fingerprint features";

    /// Followed by `<prefix><unit(3)><id(4)>`
    pub const REGISTERED: &str = "ThumbID Registered:";

    /// Followed by the slot that was cleared
    pub const DELETED: &str = "Deleted #";
}

/// Command keywords sent to the sensor
pub mod commands {
    pub const GET_IDS: &str = "GET_IDS";
    pub const ENROLL: &str = "ENROLL";
    pub const DELETE_ID: &str = "DELETE_ID:";
}
