use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use fleetnode_util::store::StoreError;

use crate::identity::DeviceIdentity;
use crate::medium::{IdentityRecord, RecordMedium};

// A stored field replaces the built-in default only if it is longer than
// these (in bytes). This keeps empty or truncated records from wiping a
// usable identity.
const MIN_ALIAS_LEN: usize = 1;
const MIN_OWNER_LEN: usize = 5;
const MIN_API_KEY_LEN: usize = 8;
const MIN_UDID_LEN: usize = 1;

#[derive(Debug, Error)]
pub enum StorageError {
    /// The write failed even after formatting the medium. The identity
    /// survives in memory for this session only.
    #[error("identity could not be persisted: {0}")]
    Persistent(#[source] StoreError),
}

/// Loads and persists the device identity
///
/// Saves take `&mut self` so there is never more than one save in flight,
/// share the store behind a mutex if it ever needs to be used from more than
/// one task.
pub struct IdentityStore<M> {
    medium: M,
    defaults: DeviceIdentity,
    memory_only: bool,
}

impl<M: RecordMedium> IdentityStore<M> {
    /// Create a store over `medium`, `defaults` is the built-in identity used
    /// for any field that has no plausible stored value
    pub fn new(medium: M, defaults: DeviceIdentity) -> Self {
        Self {
            medium,
            defaults,
            memory_only: false,
        }
    }

    /// Whether the last save failed and the identity only lives in memory
    pub fn is_memory_only(&self) -> bool {
        self.memory_only
    }

    /// Load the identity, falling back to the defaults
    ///
    /// This never fails, a missing, unreadable or corrupt record results in
    /// the built-in identity.
    #[instrument(name = "identity_load", skip_all)]
    pub async fn load(&self) -> DeviceIdentity {
        let mut identity = self.defaults.clone();

        match self.medium.read().await {
            Ok(Some(record)) => restore(&mut identity, record),
            Ok(None) => info!("no stored identity, using defaults"),
            Err(err) => warn!("failed to read stored identity, using defaults: {err}"),
        }

        identity
    }

    /// Persist the identity
    ///
    /// If the write fails, the medium is formatted and the write retried
    /// exactly once. The record is read back after every successful save.
    #[instrument(name = "identity_save", skip_all, err(level = "warn"))]
    pub async fn save(&mut self, identity: &DeviceIdentity) -> Result<(), StorageError> {
        let record = IdentityRecord::from(identity);

        if let Err(err) = self.medium.write(&record).await {
            warn!("cannot save identity ({err}), formatting medium");
            if let Err(err) = self.medium.format().await {
                warn!("format failed: {err}");
            }

            debug!("trying to save identity again");
            if let Err(err) = self.medium.write(&record).await {
                self.memory_only = true;
                return Err(StorageError::Persistent(err));
            }
        }

        if self.memory_only {
            info!("identity persisted again");
        }
        self.memory_only = false;

        self.verify(&record).await;
        Ok(())
    }

    // Read-after-write consistency check
    async fn verify(&self, expected: &IdentityRecord) {
        match self.medium.read().await {
            Ok(Some(stored)) if &stored == expected => debug!("identity saved"),
            Ok(Some(stored)) => {
                warn!(?stored, ?expected, "stored identity does not match the saved one")
            }
            Ok(None) => warn!("stored identity missing right after save"),
            Err(err) => warn!("failed to read back stored identity: {err}"),
        }
    }
}

fn restore(identity: &mut DeviceIdentity, record: IdentityRecord) {
    let IdentityRecord {
        alias,
        owner,
        apikey,
        udid,
    } = record;

    if alias.len() > MIN_ALIAS_LEN {
        identity.alias = alias;
    }

    if owner.len() > MIN_OWNER_LEN {
        identity.owner = owner;
    }

    if apikey.len() > MIN_API_KEY_LEN {
        identity.api_key = apikey.into();
    }

    if udid.len() > MIN_UDID_LEN {
        identity.udid = udid.into();
    }

    debug!(udid = %identity.udid, owner = %identity.owner, alias = %identity.alias, "restored identity");
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::io;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use tempfile::tempdir;

    use fleetnode_util::store::Store;
    use fleetnode_util::types::{ApiKey, Udid};

    fn defaults() -> DeviceIdentity {
        DeviceIdentity {
            udid: "default-udid".into(),
            owner: "default-owner".to_string(),
            alias: "default-alias".to_string(),
            api_key: "default-api-key".into(),
        }
    }

    /// In memory medium failing the first `failures` writes
    struct FlakyMedium {
        record: Mutex<Option<IdentityRecord>>,
        failures: AtomicUsize,
        writes: AtomicUsize,
        formats: AtomicUsize,
    }

    impl FlakyMedium {
        fn new(failures: usize) -> Self {
            Self {
                record: Mutex::new(None),
                failures: AtomicUsize::new(failures),
                writes: AtomicUsize::new(0),
                formats: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl RecordMedium for FlakyMedium {
        async fn read(&self) -> Result<Option<IdentityRecord>, StoreError> {
            Ok(self.record.lock().unwrap().clone())
        }

        async fn write(&self, record: &IdentityRecord) -> Result<(), StoreError> {
            self.writes.fetch_add(1, Ordering::SeqCst);
            if self.failures.load(Ordering::SeqCst) > 0 {
                self.failures.fetch_sub(1, Ordering::SeqCst);
                return Err(io::Error::other("flash write failed").into());
            }
            *self.record.lock().unwrap() = Some(record.clone());
            Ok(())
        }

        async fn format(&self) -> Result<(), StoreError> {
            self.formats.fetch_add(1, Ordering::SeqCst);
            *self.record.lock().unwrap() = None;
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_load_without_record_returns_defaults() {
        let dir = tempdir().unwrap();
        let store = IdentityStore::new(Store::new(dir.path()), defaults());

        assert_eq!(store.load().await, defaults());
    }

    #[tokio::test]
    async fn test_load_corrupt_record_returns_defaults() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("identity.json"), b"\x00\x01{garbage").unwrap();
        let store = IdentityStore::new(Store::new(dir.path()), defaults());

        assert_eq!(store.load().await, defaults());
    }

    #[tokio::test]
    async fn test_load_empty_record_returns_defaults() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("identity.json"), "{}").unwrap();
        let store = IdentityStore::new(Store::new(dir.path()), defaults());

        assert_eq!(store.load().await, defaults());
    }

    #[tokio::test]
    async fn test_load_applies_plausibility_thresholds() {
        let dir = tempdir().unwrap();
        std::fs::write(
            dir.path().join("identity.json"),
            r#"{"alias":"","owner":"tenantA","apikey":"abcdefghij","udid":"dev-123"}"#,
        )
        .unwrap();
        let store = IdentityStore::new(Store::new(dir.path()), defaults());

        let identity = store.load().await;

        assert_eq!(identity.owner, "tenantA");
        assert_eq!(identity.api_key, ApiKey::from("abcdefghij"));
        assert_eq!(identity.udid, Udid::from("dev-123"));
        assert_eq!(identity.alias, "default-alias");
    }

    #[tokio::test]
    async fn test_load_rejects_short_values() {
        let dir = tempdir().unwrap();
        std::fs::write(
            dir.path().join("identity.json"),
            r#"{"alias":"a","owner":"short","apikey":"12345678","udid":"x"}"#,
        )
        .unwrap();
        let store = IdentityStore::new(Store::new(dir.path()), defaults());

        assert_eq!(store.load().await, defaults());
    }

    #[tokio::test]
    async fn test_saved_alias_round_trips() {
        let dir = tempdir().unwrap();
        let mut store = IdentityStore::new(Store::new(dir.path()), defaults());

        let mut identity = store.load().await;
        identity.alias = "new".to_string();
        store.save(&identity).await.unwrap();

        let reloaded = IdentityStore::new(Store::new(dir.path()), defaults());
        assert_eq!(reloaded.load().await, identity);
    }

    #[tokio::test]
    async fn test_save_twice_is_idempotent() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("identity.json");
        let mut store = IdentityStore::new(Store::new(dir.path()), defaults());
        let identity = defaults();

        store.save(&identity).await.unwrap();
        let once = std::fs::read(&path).unwrap();

        store.save(&identity).await.unwrap();
        let twice = std::fs::read(&path).unwrap();

        assert_eq!(once, twice);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[tokio::test]
    async fn test_save_formats_and_retries_once() {
        let mut store = IdentityStore::new(FlakyMedium::new(1), defaults());

        store.save(&defaults()).await.unwrap();

        assert_eq!(store.medium.writes.load(Ordering::SeqCst), 2);
        assert_eq!(store.medium.formats.load(Ordering::SeqCst), 1);
        assert!(!store.is_memory_only());
        assert_eq!(store.load().await, defaults());
    }

    #[tokio::test]
    async fn test_save_fails_after_single_retry() {
        let mut store = IdentityStore::new(FlakyMedium::new(5), defaults());

        let res = store.save(&defaults()).await;

        assert!(matches!(res, Err(StorageError::Persistent(_))));
        assert_eq!(store.medium.writes.load(Ordering::SeqCst), 2);
        assert_eq!(store.medium.formats.load(Ordering::SeqCst), 1);
        assert!(store.is_memory_only());
    }

    #[tokio::test]
    async fn test_memory_only_clears_on_next_successful_save() {
        let mut store = IdentityStore::new(FlakyMedium::new(2), defaults());

        assert!(store.save(&defaults()).await.is_err());
        assert!(store.is_memory_only());

        store.save(&defaults()).await.unwrap();
        assert!(!store.is_memory_only());
    }
}
