//! # thumbid
//!
//! Fingerprint enrollment for line-oriented sensors behind a serial bridge.
//!
//! ## Features
//!
//! - Slot allocation checked against the sensor's own storage report
//! - Automatic correction when the sensor stores into an unexpected slot
//! - Stale sensor output from abandoned attempts is never acted on
//! - Pluggable identity and record stores
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use thumbid::{
//!     Binder, Device, Enroller, EnrollmentConfig, MemoryDirectory, MemoryRecordStore,
//!     Registration,
//! };
//! use thumbid_types::Passkey;
//!
//! #[tokio::main]
//! async fn main() -> thumbid::Result<()> {
//!     let directory = Arc::new(MemoryDirectory::new());
//!     let store = Arc::new(MemoryRecordStore::new());
//!
//!     // Resolve who is enrolling
//!     let registration = Registration::new(directory, store.clone());
//!     let identity = registration.prepare("123456".parse::<Passkey>()?).await?;
//!
//!     // Connect to the sensor
//!     let mut device = Device::new("192.168.1.50", 8888);
//!     device.connect().await?;
//!
//!     let enroller = Enroller::spawn(device, Binder::new(store), EnrollmentConfig::default());
//!     let outcome = enroller.start_enrollment(identity).await?.outcome().await;
//!     println!("{:?}", outcome);
//!
//!     enroller.shutdown().await?;
//!     Ok(())
//! }
//! ```

pub mod binder;
pub mod device;
pub mod enroller;
pub mod error;
pub mod registration;
pub mod store;

#[cfg(test)]
mod testing;

// Re-exports
pub use binder::{BindError, Binder};
pub use device::Device;
pub use enroller::{AttemptHandle, Enroller, EnrollmentUpdate};
pub use error::{Error, Result};
pub use registration::{Registration, MAX_RECORDS_PER_UNIT};
pub use store::{IdentityLookup, MemoryDirectory, MemoryRecordStore, RecordStore, StoreError};

// Re-export types
pub use thumbid_core::{
    Command, DeviceEvent, EnrollmentConfig, EnrollmentFailure, EnrollmentOutcome, Generation,
    ParserConfig, Session, StorageReport,
};
