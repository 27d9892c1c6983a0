#![forbid(unsafe_code)]

//! Startup wiring: identity, then tasks, then the reminder scheduler.

use std::sync::Arc;

use tracing::info;

use crate::clock::{Clock, SystemClock};
use crate::config::{self, Config, NotifyBackend};
use crate::identity::{DeviceId, IdentityProvider};
use crate::notify::{
    CommandGateway, NotificationGateway, NotificationSettingsStore, SettingsScope, StdoutGateway,
};
use crate::reminder::{OverduePolicyKind, ReminderScheduler};
use crate::store::{FileStore, KeyValueStore};
use crate::task::{LoadOutcome, SharedRepository, TaskRepository};

pub struct Session {
    store: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
    device: DeviceId,
    repo: SharedRepository,
    load_outcome: LoadOutcome,
    scope: SettingsScope,
}

impl Session {
    /// Resolves the device identity and loads its tasks. Never fails: storage
    /// problems degrade to a session-only identity or an empty task list.
    pub fn open(
        store: Arc<dyn KeyValueStore>,
        clock: Arc<dyn Clock>,
        scope: SettingsScope,
    ) -> Self {
        let device = IdentityProvider::new(store.clone(), clock.clone()).device_id_or_fallback();
        let mut repo = TaskRepository::new(store.clone(), clock.clone(), device.clone());
        let load_outcome = repo.load_or_recover();
        info!(
            "session for {device}: {} tasks ({load_outcome:?})",
            repo.tasks().len()
        );
        Self {
            store,
            clock,
            device,
            repo: repo.into_shared(),
            load_outcome,
            scope,
        }
    }

    /// Opens a file-backed session under `storage.data_dir`.
    pub fn from_config(cfg: &Config) -> anyhow::Result<Self> {
        let dir = config::expand_path(&cfg.storage.data_dir)?;
        Ok(Self::open(
            Arc::new(FileStore::new(dir)),
            Arc::new(SystemClock),
            cfg.notifications.scope,
        ))
    }

    #[must_use]
    pub fn device(&self) -> &DeviceId {
        &self.device
    }

    #[must_use]
    pub fn repo(&self) -> &SharedRepository {
        &self.repo
    }

    #[must_use]
    pub fn load_outcome(&self) -> LoadOutcome {
        self.load_outcome
    }

    #[must_use]
    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    #[must_use]
    pub fn settings_store(&self) -> NotificationSettingsStore {
        NotificationSettingsStore::new(self.store.clone(), self.scope, &self.device)
    }

    #[must_use]
    pub fn scheduler(&self, gateway: Arc<dyn NotificationGateway>) -> ReminderScheduler {
        ReminderScheduler::new(
            self.repo.clone(),
            self.settings_store(),
            gateway,
            self.clock.clone(),
        )
    }

    /// Scheduler configured from `[scheduler]` and `[notifications]`.
    #[must_use]
    pub fn scheduler_from_config(&self, cfg: &Config) -> ReminderScheduler {
        self.scheduler(gateway_from_config(cfg))
            .with_overdue_policy(overdue_policy_from_config(cfg))
    }
}

#[must_use]
pub fn gateway_from_config(cfg: &Config) -> Arc<dyn NotificationGateway> {
    match cfg.notifications.backend {
        NotifyBackend::Command => Arc::new(CommandGateway::new(cfg.notifications.command.clone())),
        NotifyBackend::Stdout => Arc::new(StdoutGateway),
    }
}

fn overdue_policy_from_config(cfg: &Config) -> Box<dyn crate::reminder::OverduePolicy> {
    let kind: OverduePolicyKind = cfg.scheduler.overdue_policy;
    kind.build(cfg.scheduler.overdue_cooldown_minutes)
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
    fn first_open_creates_identity_and_seed() {
        let store = Arc::new(MemoryStore::new());
        let session = Session::open(store.clone(), clock(), SettingsScope::Shared);
        assert_eq!(session.load_outcome(), LoadOutcome::Seeded);

        let again = Session::open(store, clock(), SettingsScope::Shared);
        assert_eq!(again.device(), session.device());
        assert_eq!(again.load_outcome(), LoadOutcome::Loaded);
    }

    #[test]
    fn unreadable_store_still_opens() {
        let store = Arc::new(MemoryStore::new());
        store.set_fail_reads(true);
        let session = Session::open(store, clock(), SettingsScope::Shared);
        assert_eq!(session.device().as_str(), "device_1700000000000");
        assert_eq!(session.load_outcome(), LoadOutcome::StorageUnavailable);
    }

    #[test]
    fn file_backed_session_uses_data_dir() {
        let td = tempfile::tempdir().expect("tempdir");
        let mut cfg = Config::default();
        cfg.storage.data_dir = td.path().join("data").to_string_lossy().to_string();

        let session = Session::from_config(&cfg).unwrap();
        assert_eq!(session.load_outcome(), LoadOutcome::Seeded);
        assert!(td.path().join("data").join("%40taskflow_device_id.kv").exists());
    }
}
