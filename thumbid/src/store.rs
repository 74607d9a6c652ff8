//! Identity and persistence collaborators
//!
//! The enrollment engine never talks to a database directly. It consumes
//! these two traits; deployments plug in their own backends.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;
use thumbid_types::{EncodedRecordId, FingerprintBinding, IdentityContext, Passkey, UserId};
use tracing::debug;

/// Errors reported by a backend
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Store rejected the write: {0}")]
    Rejected(String),
}

/// Maps a registration passkey to the user it was issued for
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait IdentityLookup: Send + Sync {
    async fn lookup_by_passkey(
        &self,
        passkey: Passkey,
    ) -> Result<Option<IdentityContext>, StoreError>;
}

/// Durable user ↔ sensor record associations
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Insert or refresh a binding
    ///
    /// Writing the same (user, record) twice must leave a single binding.
    async fn upsert_fingerprint_record(
        &self,
        user_id: &UserId,
        record: &EncodedRecordId,
    ) -> Result<(), StoreError>;

    async fn list_records_for_user(
        &self,
        user_id: &UserId,
    ) -> Result<Vec<EncodedRecordId>, StoreError>;
}

/// In-memory [`RecordStore`]
#[derive(Debug, Default)]
pub struct MemoryRecordStore {
    bindings: RwLock<Vec<FingerprintBinding>>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every binding
    pub fn bindings(&self) -> Vec<FingerprintBinding> {
        self.bindings.read().clone()
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn upsert_fingerprint_record(
        &self,
        user_id: &UserId,
        record: &EncodedRecordId,
    ) -> Result<(), StoreError> {
        let mut bindings = self.bindings.write();

        match bindings
            .iter_mut()
            .find(|b| &b.user_id == user_id && &b.record == record)
        {
            Some(existing) => {
                debug!("Refreshing binding {} -> {}", user_id, record);
                *existing = FingerprintBinding::new(user_id.clone(), record.clone());
            }
            None => {
                debug!("Binding {} -> {}", user_id, record);
                bindings.push(FingerprintBinding::new(user_id.clone(), record.clone()));
            }
        }

        Ok(())
    }

    async fn list_records_for_user(
        &self,
        user_id: &UserId,
    ) -> Result<Vec<EncodedRecordId>, StoreError> {
        Ok(self
            .bindings
            .read()
            .iter()
            .filter(|b| &b.user_id == user_id)
            .map(|b| b.record.clone())
            .collect())
    }
}

/// In-memory [`IdentityLookup`]
#[derive(Debug, Default)]
pub struct MemoryDirectory {
    users: RwLock<HashMap<Passkey, IdentityContext>>,
}

impl MemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, passkey: Passkey, identity: IdentityContext) {
        self.users.write().insert(passkey, identity);
    }
}

#[async_trait]
impl IdentityLookup for MemoryDirectory {
    async fn lookup_by_passkey(
        &self,
        passkey: Passkey,
    ) -> Result<Option<IdentityContext>, StoreError> {
        Ok(self.users.read().get(&passkey).cloned())
    }
}
