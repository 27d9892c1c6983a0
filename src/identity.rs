#![forbid(unsafe_code)]

//! Installation-scoped device identity.

use std::fmt;
use std::sync::{Arc, Mutex};

use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::clock::{Clock, unix_millis};
use crate::error::Result;
use crate::store::KeyValueStore;

pub const DEVICE_ID_KEY: &str = "@taskflow_device_id";

/// Opaque key used to namespace everything persisted for one installation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeviceId(String);

impl DeviceId {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

pub struct IdentityProvider {
    store: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
    durable: Mutex<Option<DeviceId>>,
}

impl IdentityProvider {
    pub fn new(store: Arc<dyn KeyValueStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            clock,
            durable: Mutex::new(None),
        }
    }

    /// Reads the stored identity, creating and persisting one on first use.
    ///
    /// A failed read is an error. A failed write is not: the fresh id is
    /// still returned for this session, but it is not cached, so the next
    /// call may mint a different one.
    pub fn device_id(&self) -> Result<DeviceId> {
        let mut durable = self
            .durable
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if let Some(id) = durable.as_ref() {
            return Ok(id.clone());
        }

        if let Some(stored) = self.store.get(DEVICE_ID_KEY)? {
            let stored = stored.trim();
            if !stored.is_empty() {
                let id = DeviceId::new(stored);
                *durable = Some(id.clone());
                return Ok(id);
            }
        }

        let id = self.generate();
        match self.store.set(DEVICE_ID_KEY, id.as_str()) {
            Ok(()) => {
                debug!("created device id {id}");
                *durable = Some(id.clone());
            }
            Err(e) => warn!("device id {id} is session-only, could not persist it: {e}"),
        }
        Ok(id)
    }

    /// Like [`Self::device_id`], but never fails: an unreadable store yields
    /// a timestamp-only id for this session.
    pub fn device_id_or_fallback(&self) -> DeviceId {
        match self.device_id() {
            Ok(id) => id,
            Err(e) => {
                let id = DeviceId::new(format!("device_{}", unix_millis(self.clock.now())));
                error!("cannot resolve device id, using {id} for this session: {e}");
                id
            }
        }
    }

    fn generate(&self) -> DeviceId {
        let random: String = Uuid::new_v4().simple().to_string().chars().take(9).collect();
        DeviceId::new(format!(
            "device_{}_{random}",
            unix_millis(self.clock.now())
        ))
    }
}

#[cfg(test)]
mod tests {
    use time::OffsetDateTime;

    use super::*;
    use crate::clock::ManualClock;
    use crate::store::MemoryStore;

    fn clock() -> Arc<ManualClock> {
        Arc::new(ManualClock::new(
            OffsetDateTime::from_unix_timestamp(1_700_000_000).unwrap(),
        ))
    }

    #[test]
    fn creates_once_and_reuses_across_providers() {
        let store = Arc::new(MemoryStore::new());
        let first = IdentityProvider::new(store.clone(), clock()).device_id().unwrap();
        assert!(first.as_str().starts_with("device_1700000000000_"));
        assert_eq!(first.as_str().len(), "device_1700000000000_".len() + 9);
        assert!(
            first
                .as_str()
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_')
        );

        let second = IdentityProvider::new(store.clone(), clock()).device_id().unwrap();
        assert_eq!(first, second);
        assert_eq!(
            store.get(DEVICE_ID_KEY).unwrap().as_deref(),
            Some(first.as_str())
        );
    }

    #[test]
    fn unpersisted_id_is_not_cached() {
        let store = Arc::new(MemoryStore::new());
        store.set_fail_writes(true);
        let provider = IdentityProvider::new(store.clone(), clock());

        let a = provider.device_id().unwrap();
        let b = provider.device_id().unwrap();
        assert_ne!(a, b);
        assert!(store.keys().is_empty());

        store.set_fail_writes(false);
        let c = provider.device_id().unwrap();
        assert_eq!(provider.device_id().unwrap(), c);
    }

    #[test]
    fn unreadable_store_is_an_error_with_fallback() {
        let store = Arc::new(MemoryStore::new());
        store.set_fail_reads(true);
        let provider = IdentityProvider::new(store, clock());

        assert!(provider.device_id().is_err());
        assert_eq!(
            provider.device_id_or_fallback().as_str(),
            "device_1700000000000"
        );
    }

    #[test]
    fn blank_stored_id_is_replaced() {
        let store = Arc::new(MemoryStore::new());
        store.set(DEVICE_ID_KEY, "  ").unwrap();
        let id = IdentityProvider::new(store.clone(), clock()).device_id().unwrap();
        assert!(!id.as_str().trim().is_empty());
        assert_eq!(store.get(DEVICE_ID_KEY).unwrap().as_deref(), Some(id.as_str()));
    }
}
