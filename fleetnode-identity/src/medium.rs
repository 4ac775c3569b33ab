use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use fleetnode_util::store::{Store, StoreError};

use crate::identity::DeviceIdentity;

// IMPORTANT: be VERY careful making changes to this struct.
// It is persisted to disk and failure to deserialize it will cause
// the device *to lose identity* and check in as a new device.
// When making changes always consider how you'll migrate from an
// older version of this struct.

/// Flat key-value record holding the identity on the persistent medium
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentityRecord {
    pub alias: String,
    pub owner: String,
    pub apikey: String,
    pub udid: String,
}

impl IdentityRecord {
    /// Name of the document holding the record
    pub const NAME: &'static str = "identity";
}

impl From<&DeviceIdentity> for IdentityRecord {
    fn from(identity: &DeviceIdentity) -> Self {
        Self {
            alias: identity.alias.clone(),
            owner: identity.owner.clone(),
            apikey: identity.api_key.to_string(),
            udid: identity.udid.to_string(),
        }
    }
}

/// Persistent medium for the identity record
#[async_trait]
pub trait RecordMedium: Send + Sync {
    /// Read the record, `None` if there is none stored yet
    async fn read(&self) -> Result<Option<IdentityRecord>, StoreError>;

    /// Create or replace the record
    async fn write(&self, record: &IdentityRecord) -> Result<(), StoreError>;

    /// Wipe the medium, losing anything stored on it
    async fn format(&self) -> Result<(), StoreError>;
}

#[async_trait]
impl RecordMedium for Store {
    async fn read(&self) -> Result<Option<IdentityRecord>, StoreError> {
        Store::read(self, "/", IdentityRecord::NAME).await
    }

    async fn write(&self, record: &IdentityRecord) -> Result<(), StoreError> {
        Store::write(self, "/", IdentityRecord::NAME, record).await
    }

    async fn format(&self) -> Result<(), StoreError> {
        Store::format(self).await
    }
}
