//! # thumbid-core
//!
//! Sans-IO protocol engine for line-oriented fingerprint sensors.
//!
//! This crate provides the protocol primitives:
//! - Command encoding
//! - Line framing and message parsing
//! - Storage allocation
//! - The enrollment state machine, including slot reconciliation
//! - Attempt generations for discarding stale events

pub mod command;
pub mod constants;
pub mod enrollment;
pub mod error;
pub mod frame;
pub mod parser;
pub mod session;
pub mod storage;

pub use command::Command;
pub use enrollment::{
    Action, EnrollmentConfig, EnrollmentFailure, EnrollmentMachine, EnrollmentOutcome,
    EnrollmentStatus, Input,
};
pub use error::{Error, Result};
pub use frame::LineBuffer;
pub use parser::{DeviceEvent, Parser, ParserConfig};
pub use session::{Generation, Session, SessionState, Tagged};
pub use storage::{compute_next_free, StorageReport};
