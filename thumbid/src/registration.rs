//! Registration gate
//!
//! Resolves a passkey to the identity being enrolled and enforces the
//! per-unit record limit before any sensor work starts.

use std::sync::Arc;

use thumbid_types::{IdentityContext, Passkey};
use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::store::{IdentityLookup, RecordStore};

/// Fingerprints a user may have on one unit
pub const MAX_RECORDS_PER_UNIT: usize = 2;

/// Decides whether an enrollment may begin
#[derive(Clone)]
pub struct Registration {
    directory: Arc<dyn IdentityLookup>,
    store: Arc<dyn RecordStore>,
    max_records: usize,
}

impl Registration {
    pub fn new(directory: Arc<dyn IdentityLookup>, store: Arc<dyn RecordStore>) -> Self {
        Self {
            directory,
            store,
            max_records: MAX_RECORDS_PER_UNIT,
        }
    }

    pub fn with_max_records(mut self, max_records: usize) -> Self {
        self.max_records = max_records;
        self
    }

    /// Identity to enroll for `passkey`
    ///
    /// # Errors
    ///
    /// - [`Error::UnknownPasskey`] if no user holds the passkey
    /// - [`Error::SlotsExhausted`] if the user already has the maximum
    ///   number of records on the unit
    /// - [`Error::Store`] if either backend fails
    pub async fn prepare(&self, passkey: Passkey) -> Result<IdentityContext> {
        let identity = match self.directory.lookup_by_passkey(passkey).await? {
            Some(identity) => identity,
            None => {
                warn!("Unknown passkey {:?}", passkey);
                return Err(Error::UnknownPasskey);
            }
        };

        let count = self
            .store
            .list_records_for_user(&identity.user_id)
            .await?
            .iter()
            .filter(|record| record.unit() == identity.unit_label)
            .count();

        if count >= self.max_records {
            warn!("{} already has {} record(s)", identity, count);
            return Err(Error::SlotsExhausted {
                user_id: identity.user_id,
                unit_label: identity.unit_label,
                count,
            });
        }

        info!("Registration ready for {} ({} existing)", identity, count);
        Ok(identity)
    }
}
