#![forbid(unsafe_code)]

use std::sync::{Arc, Mutex};

use time::OffsetDateTime;
use tracing::{debug, error, info, warn};

use crate::clock::Clock;
use crate::error::{Result, TaskflowError};
use crate::identity::DeviceId;
use crate::store::KeyValueStore;
use crate::task::model::{
    NewTask, Task, TaskFilter, TaskStats, validate_due_date, validate_new_task,
};
use crate::task::seed::seed_tasks;

/// Repository shared between the command surface and the reminder scheduler.
pub type SharedRepository = Arc<Mutex<TaskRepository>>;

#[must_use]
pub fn storage_key(device: &DeviceId) -> String {
    format!("@taskflow_tasks_{device}")
}

/// How the in-memory collection was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    Loaded,
    /// Nothing stored yet; the example set was installed.
    Seeded,
    /// Stored data did not parse; it was backed up and the example set installed.
    RecoveredFromCorrupt,
    /// The store could not be read; running on an empty collection.
    StorageUnavailable,
}

/// Owns one device's task collection.
///
/// Every mutation builds the next collection, writes it in full and only
/// then replaces the in-memory copy. A failed write leaves both sides at
/// the previous state.
pub struct TaskRepository {
    store: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
    device: DeviceId,
    key: String,
    tasks: Vec<Task>,
}

impl TaskRepository {
    /// Creates an empty, not yet loaded repository.
    pub fn new(store: Arc<dyn KeyValueStore>, clock: Arc<dyn Clock>, device: DeviceId) -> Self {
        let key = storage_key(&device);
        Self {
            store,
            clock,
            device,
            key,
            tasks: Vec::new(),
        }
    }

    #[must_use]
    pub fn into_shared(self) -> SharedRepository {
        Arc::new(Mutex::new(self))
    }

    #[must_use]
    pub fn device(&self) -> &DeviceId {
        &self.device
    }

    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Most recent first.
    #[must_use]
    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    #[must_use]
    pub fn get(&self, id: &str) -> Option<&Task> {
        self.tasks.iter().find(|t| t.id == id)
    }

    pub fn filtered(&self, filter: TaskFilter) -> impl Iterator<Item = &Task> {
        self.tasks.iter().filter(move |t| filter.matches(t))
    }

    #[must_use]
    pub fn stats(&self) -> TaskStats {
        TaskStats::from_tasks(&self.tasks)
    }

    /// Reads the device's collection from the store.
    ///
    /// An absent key installs and persists the example set. Unparseable data
    /// is `CorruptState` and an unreadable store is `StorageUnavailable`; in
    /// both cases the in-memory collection is left untouched.
    pub fn load(&mut self) -> Result<LoadOutcome> {
        let Some(raw) = self.store.get(&self.key)? else {
            self.install_seed();
            return Ok(LoadOutcome::Seeded);
        };
        self.tasks = self.parse(&raw)?;
        debug!("loaded {} tasks for {}", self.tasks.len(), self.device);
        Ok(LoadOutcome::Loaded)
    }

    /// Replaces the in-memory collection with what is stored now.
    ///
    /// Other processes write the same key, so every mutation and every
    /// reminder pass starts from here. An absent key keeps the in-memory
    /// collection; read and parse errors leave it untouched.
    pub fn refresh(&mut self) -> Result<()> {
        if let Some(raw) = self.store.get(&self.key)? {
            self.tasks = self.parse(&raw)?;
        }
        Ok(())
    }

    /// Loads, degrading instead of failing.
    ///
    /// Corrupt data is copied to `<key>.corrupt` and replaced by the example
    /// set. An unreadable store leaves an empty collection.
    pub fn load_or_recover(&mut self) -> LoadOutcome {
        match self.load() {
            Ok(outcome) => outcome,
            Err(e @ TaskflowError::CorruptState { .. }) => {
                error!("discarding unreadable task data: {e}");
                self.backup_corrupt();
                self.install_seed();
                LoadOutcome::RecoveredFromCorrupt
            }
            Err(e) => {
                error!("cannot load tasks, continuing with an empty list: {e}");
                self.tasks.clear();
                LoadOutcome::StorageUnavailable
            }
        }
    }

    /// Validates and prepends a new task, then persists the collection.
    pub fn create(&mut self, input: NewTask) -> Result<Task> {
        let now = self.clock.now();
        validate_new_task(&input, now)?;
        self.refresh()?;

        let task = Task {
            id: self.unique_id(now),
            title: input.title.trim().to_owned(),
            description: input.description.filter(|d| !d.trim().is_empty()),
            priority: input.priority,
            completed: false,
            created_at: now,
            due_date: input.due_date,
            reminder_sent: false,
            extra: serde_json::Map::new(),
        };

        let mut next = Vec::with_capacity(self.tasks.len() + 1);
        next.push(task.clone());
        next.extend(self.tasks.iter().cloned());
        self.commit(next)?;
        info!("created task {}", task.id);
        Ok(task)
    }

    /// Flips `completed` and returns the updated task.
    pub fn toggle_completed(&mut self, id: &str) -> Result<Task> {
        self.update(id, |t| t.completed = !t.completed)
    }

    /// Removes a task for good and returns it.
    pub fn delete(&mut self, id: &str) -> Result<Task> {
        self.refresh()?;
        let idx = self.index_of(id)?;
        let mut next = self.tasks.clone();
        let removed = next.remove(idx);
        self.commit(next)?;
        info!("deleted task {id}");
        Ok(removed)
    }

    pub fn mark_reminder_sent(&mut self, id: &str) -> Result<()> {
        self.update(id, |t| t.reminder_sent = true).map(|_| ())
    }

    /// Replaces a task's due date. A changed due date re-arms its reminder.
    pub fn reschedule(&mut self, id: &str, due_date: Option<OffsetDateTime>) -> Result<Task> {
        if let Some(due) = due_date {
            validate_due_date(due, self.clock.now())?;
        }
        self.update(id, |t| {
            if t.due_date != due_date {
                t.due_date = due_date;
                t.reminder_sent = false;
            }
        })
    }

    fn update(&mut self, id: &str, apply: impl FnOnce(&mut Task)) -> Result<Task> {
        self.refresh()?;
        let idx = self.index_of(id)?;
        let mut next = self.tasks.clone();
        apply(&mut next[idx]);
        let updated = next[idx].clone();
        self.commit(next)?;
        Ok(updated)
    }

    fn index_of(&self, id: &str) -> Result<usize> {
        self.tasks
            .iter()
            .position(|t| t.id == id)
            .ok_or_else(|| TaskflowError::NotFound(id.to_owned()))
    }

    fn unique_id(&self, now: OffsetDateTime) -> String {
        loop {
            let id = Task::new_id(now);
            if self.get(&id).is_none() {
                return id;
            }
        }
    }

    fn commit(&mut self, next: Vec<Task>) -> Result<()> {
        self.persist(&next)?;
        self.tasks = next;
        Ok(())
    }

    fn parse(&self, raw: &str) -> Result<Vec<Task>> {
        serde_json::from_str(raw).map_err(|e| TaskflowError::corrupt(&self.key, e))
    }

    fn persist(&self, tasks: &[Task]) -> Result<()> {
        let raw =
            serde_json::to_string(tasks).map_err(|e| TaskflowError::corrupt(&self.key, e))?;
        self.store.set(&self.key, &raw)
    }

    fn install_seed(&mut self) {
        let seed = seed_tasks(self.clock.now());
        if let Err(e) = self.persist(&seed) {
            warn!("example tasks are session-only, could not persist them: {e}");
        }
        info!("installed {} example tasks for {}", seed.len(), self.device);
        self.tasks = seed;
    }

    fn backup_corrupt(&self) {
        let backup = format!("{}.corrupt", self.key);
        let copied = self
            .store
            .get(&self.key)
            .and_then(|raw| match raw {
                Some(raw) => self.store.set(&backup, &raw),
                None => Ok(()),
            });
        if let Err(e) = copied {
            warn!("could not back up corrupt task data to {backup}: {e}");
        }
    }
}
