//! Sensor message parsing
//!
//! The sensor reports progress as free-text lines. Every line the protocol
//! cares about is turned into exactly one [`DeviceEvent`] here, so no other
//! code path ever matches on raw text. Unknown lines are ignored so newer
//! firmware can add chatter without breaking older hosts.

use thumbid_types::{DeviceRecordId, EncodedRecordId};
use tracing::{debug, warn};

use crate::constants::{lines, DEFAULT_RECORD_PREFIX};
use crate::storage::StorageReport;

/// Typed sensor event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceEvent {
    /// Answer to `GET_IDS`
    StorageReport(StorageReport),

    /// Capture started; the sensor intends to store into this slot
    AwaitingFinger(DeviceRecordId),

    ImageCaptured,
    ImageProcessed,
    RemoveFinger,
    PlaceAgain,
    TemplatesMatched,

    /// Template written
    Stored {
        assigned: DeviceRecordId,
        record: EncodedRecordId,
    },

    TemplatesMismatched,
    PoorImage,
    FeatureExtractionFailed,

    /// Answer to `DELETE_ID`
    RecordDeleted(DeviceRecordId),
}

impl DeviceEvent {
    /// Get event name
    pub fn name(&self) -> &'static str {
        match self {
            Self::StorageReport(_) => "StorageReport",
            Self::AwaitingFinger(_) => "AwaitingFinger",
            Self::ImageCaptured => "ImageCaptured",
            Self::ImageProcessed => "ImageProcessed",
            Self::RemoveFinger => "RemoveFinger",
            Self::PlaceAgain => "PlaceAgain",
            Self::TemplatesMatched => "TemplatesMatched",
            Self::Stored { .. } => "Stored",
            Self::TemplatesMismatched => "TemplatesMismatched",
            Self::PoorImage => "PoorImage",
            Self::FeatureExtractionFailed => "FeatureExtractionFailed",
            Self::RecordDeleted(_) => "RecordDeleted",
        }
    }
}

/// Parser settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParserConfig {
    /// Prefix in front of the unit and slot in a registration token
    pub record_prefix: String,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            record_prefix: DEFAULT_RECORD_PREFIX.to_string(),
        }
    }
}

impl ParserConfig {
    pub fn with_record_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.record_prefix = prefix.into();
        self
    }
}

/// Stateless line parser
///
/// # Examples
///
/// ```
/// use thumbid_core::{DeviceEvent, Parser};
///
/// let parser = Parser::new();
/// let events = parser.parse("Image taken\nsome debug chatter\nRemove finger\n");
///
/// assert_eq!(events, vec![DeviceEvent::ImageCaptured, DeviceEvent::RemoveFinger]);
/// ```
#[derive(Debug, Clone, Default)]
pub struct Parser {
    config: ParserConfig,
}

impl Parser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: ParserConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ParserConfig {
        &self.config
    }

    /// Parse a blob of one or more newline-delimited lines, in order
    pub fn parse(&self, raw: &str) -> Vec<DeviceEvent> {
        raw.lines().filter_map(|line| self.parse_line(line)).collect()
    }

    /// Parse a single line; `None` for unknown or malformed lines
    pub fn parse_line(&self, line: &str) -> Option<DeviceEvent> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }

        let event = match line {
            lines::IMAGE_TAKEN => DeviceEvent::ImageCaptured,
            lines::IMAGE_CONVERTED => DeviceEvent::ImageProcessed,
            lines::REMOVE_FINGER => DeviceEvent::RemoveFinger,
            lines::PLACE_AGAIN => DeviceEvent::PlaceAgain,
            lines::PRINTS_MATCHED => DeviceEvent::TemplatesMatched,
            lines::PRINTS_MISMATCHED => DeviceEvent::TemplatesMismatched,
            lines::IMAGE_MESSY => DeviceEvent::PoorImage,
            lines::NO_FEATURES => DeviceEvent::FeatureExtractionFailed,
            _ => return self.parse_structured(line),
        };

        Some(event)
    }

    fn parse_structured(&self, line: &str) -> Option<DeviceEvent> {
        if let Some(list) = line.strip_prefix(lines::STORAGE_REPORT) {
            return parse_id_list(list).map(DeviceEvent::StorageReport);
        }

        if let Some(raw) = line.strip_prefix(lines::AWAITING_FINGER) {
            return parse_record_id(raw, line).map(DeviceEvent::AwaitingFinger);
        }

        if let Some(raw) = line.strip_prefix(lines::DELETED) {
            return parse_record_id(raw, line).map(DeviceEvent::RecordDeleted);
        }

        if let Some(token) = line.strip_prefix(lines::REGISTERED) {
            let token = token.trim();
            return match EncodedRecordId::parse(token, &self.config.record_prefix) {
                Ok(record) => Some(DeviceEvent::Stored {
                    assigned: record.record_id(),
                    record,
                }),
                Err(e) => {
                    warn!("Malformed registration token {:?}: {}", token, e);
                    None
                }
            };
        }

        debug!("Ignoring unrecognized line: {:?}", line);
        None
    }
}

fn parse_record_id(raw: &str, line: &str) -> Option<DeviceRecordId> {
    let parsed = raw
        .trim()
        .parse::<u16>()
        .map_err(|e| e.to_string())
        .and_then(|value| DeviceRecordId::new(value).map_err(|e| e.to_string()));

    match parsed {
        Ok(id) => Some(id),
        Err(e) => {
            warn!("Malformed record id in {:?}: {}", line, e);
            None
        }
    }
}

// A report with one unreadable id is dropped whole; a partial report would
// understate occupancy.
fn parse_id_list(list: &str) -> Option<StorageReport> {
    let mut occupied = Vec::new();

    for raw in list.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        let id = raw
            .parse::<u16>()
            .ok()
            .and_then(|value| DeviceRecordId::new(value).ok());

        match id {
            Some(id) => occupied.push(id),
            None => {
                warn!("Malformed storage report entry {:?} in {:?}", raw, list);
                return None;
            }
        }
    }

    Some(StorageReport::new(occupied))
}
