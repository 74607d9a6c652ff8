//! Identity binding
//!
//! Commits a verified sensor record to the identity database. Runs once per
//! successful attempt, after the record's slot has been confirmed.

use std::sync::Arc;

use thumbid_types::{EncodedRecordId, IdentityContext};
use tracing::{error, info};

use crate::store::{RecordStore, StoreError};

/// Binding failed after the sensor already stored the template
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BindError {
    /// The record was issued by another unit than the one enrolling
    #[error("Record {record} was not issued by unit {unit_label}")]
    UnitMismatch {
        record: EncodedRecordId,
        unit_label: String,
    },

    #[error("Failed to bind {record} to {user}: {source}")]
    Store {
        user: String,
        record: EncodedRecordId,
        #[source]
        source: StoreError,
    },
}

/// Writes (user, record) associations to a [`RecordStore`]
#[derive(Clone)]
pub struct Binder {
    store: Arc<dyn RecordStore>,
}

impl Binder {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }

    /// Persist the binding with a single upsert
    ///
    /// The store upserts, so an outer retry of the same registration does
    /// not create a second binding. A record from another unit is refused
    /// without touching the store; it would escape the per-unit limit.
    pub async fn bind(
        &self,
        identity: &IdentityContext,
        record: &EncodedRecordId,
    ) -> Result<(), BindError> {
        if record.unit() != identity.unit_label {
            error!(
                "Record {} is on the sensor but was issued for unit {}, not {}",
                record,
                record.unit(),
                identity.unit_label
            );
            return Err(BindError::UnitMismatch {
                record: record.clone(),
                unit_label: identity.unit_label.clone(),
            });
        }

        match self
            .store
            .upsert_fingerprint_record(&identity.user_id, record)
            .await
        {
            Ok(()) => {
                info!("Bound {} to {}", record, identity);
                Ok(())
            }
            Err(source) => {
                error!(
                    "Record {} is on the sensor but binding to {} failed: {}",
                    record, identity, source
                );
                Err(BindError::Store {
                    user: identity.user_id.to_string(),
                    record: record.clone(),
                    source,
                })
            }
        }
    }
}
