#![forbid(unsafe_code)]

//! Periodic reminder evaluation.
//!
//! [`ReminderScheduler::tick`] is a synchronous pass over the task list and
//! can be driven directly (tests do, with a manual clock).
//! [`ReminderScheduler::spawn`] runs it on a tokio interval until the
//! returned [`SchedulerHandle`] is stopped or dropped.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::clock::Clock;
use crate::error::TaskflowError;
use crate::notify::{Notification, NotificationGateway, NotificationSettingsStore, Permission};
use crate::reminder::policy::{EveryTick, OverduePolicy};
use crate::reminder::{ReminderState, classify, overdue_notification, upcoming_notification};
use crate::task::{SharedRepository, TaskRepository};

pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_secs(5 * 60);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TickStatus {
    #[default]
    Ran,
    /// Notifications are switched off in settings.
    Disabled,
    /// Another tick was still running.
    Skipped,
}

#[derive(Debug)]
pub struct TickFailure {
    /// `None` for the overdue batch.
    pub task_id: Option<String>,
    pub error: TaskflowError,
}

/// What one evaluation pass did.
#[derive(Debug, Default)]
pub struct TickReport {
    pub status: TickStatus,
    /// Tasks whose upcoming reminder was delivered and recorded.
    pub reminded: Vec<String>,
    /// Overdue, incomplete tasks seen this pass.
    pub overdue: usize,
    pub overdue_notified: bool,
    /// Notifications computed but not shown because permission is missing.
    pub suppressed: Vec<Notification>,
    pub failures: Vec<TickFailure>,
}

impl TickReport {
    fn with_status(status: TickStatus) -> Self {
        Self {
            status,
            ..Self::default()
        }
    }
}

pub struct ReminderScheduler {
    repo: SharedRepository,
    settings: NotificationSettingsStore,
    gateway: Arc<dyn NotificationGateway>,
    clock: Arc<dyn Clock>,
    policy: Mutex<Box<dyn OverduePolicy>>,
    permission: Mutex<Option<Permission>>,
    running: AtomicBool,
}

impl ReminderScheduler {
    pub fn new(
        repo: SharedRepository,
        settings: NotificationSettingsStore,
        gateway: Arc<dyn NotificationGateway>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            repo,
            settings,
            gateway,
            clock,
            policy: Mutex::new(Box::new(EveryTick)),
            permission: Mutex::new(None),
            running: AtomicBool::new(false),
        }
    }

    #[must_use]
    pub fn with_overdue_policy(mut self, policy: Box<dyn OverduePolicy>) -> Self {
        self.policy = Mutex::new(policy);
        self
    }

    #[must_use]
    pub fn settings(&self) -> &NotificationSettingsStore {
        &self.settings
    }

    /// Asks the gateway for permission and remembers the answer.
    pub fn request_permission(&self) -> Permission {
        let permission = self.gateway.request_permission();
        match permission {
            Permission::Granted => debug!("notification permission granted"),
            other => info!("notifications will not be shown: permission {other}"),
        }
        *lock(&self.permission) = Some(permission);
        permission
    }

    fn permission(&self) -> Permission {
        let cached = *lock(&self.permission);
        cached.unwrap_or_else(|| self.request_permission())
    }

    /// Evaluates every task once.
    ///
    /// Per-task failures are collected in the report and never stop the
    /// pass. A call made while another tick is running returns at once with
    /// [`TickStatus::Skipped`].
    pub fn tick(&self) -> TickReport {
        if self
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("reminder tick skipped, previous tick still running");
            return TickReport::with_status(TickStatus::Skipped);
        }
        let _running = RunningGuard(&self.running);

        let settings = self.settings.load();
        if !settings.enabled {
            return TickReport::with_status(TickStatus::Disabled);
        }

        let now = self.clock.now();
        // Delivery can be slow; do not hold the repository while it runs.
        let tasks = {
            let mut repo = lock_repo(&self.repo);
            if let Err(e) = repo.refresh() {
                warn!("reminder tick using cached tasks: {e}");
            }
            repo.tasks().to_vec()
        };
        let permission = self.permission();

        let mut report = TickReport::default();
        let mut overdue = BTreeSet::new();

        for task in &tasks {
            match classify(task, now, &settings) {
                ReminderState::Dormant | ReminderState::Pending => {}
                ReminderState::Overdue => {
                    overdue.insert(task.id.clone());
                }
                ReminderState::DueSoon => {
                    let notification = upcoming_notification(task, now);
                    if !permission.is_granted() {
                        info!("reminder for {} not shown: {}", task.id, notification.body);
                        report.suppressed.push(notification);
                        continue;
                    }
                    if let Err(e) = self.gateway.deliver(&notification) {
                        warn!("reminder for {} not delivered: {e}", task.id);
                        report.failures.push(TickFailure {
                            task_id: Some(task.id.clone()),
                            error: e,
                        });
                        continue;
                    }
                    match lock_repo(&self.repo).mark_reminder_sent(&task.id) {
                        Ok(()) => report.reminded.push(task.id.clone()),
                        Err(e) => {
                            error!("reminder for {} delivered but not recorded: {e}", task.id);
                            report.failures.push(TickFailure {
                                task_id: Some(task.id.clone()),
                                error: e,
                            });
                        }
                    }
                }
            }
        }

        report.overdue = overdue.len();
        if !overdue.is_empty() {
            self.notify_overdue(&overdue, now, permission, &mut report);
        }

        debug!(
            "reminder tick: {} reminded, {} overdue (notified: {}), {} suppressed, {} failed",
            report.reminded.len(),
            report.overdue,
            report.overdue_notified,
            report.suppressed.len(),
            report.failures.len()
        );
        report
    }

    fn notify_overdue(
        &self,
        overdue: &BTreeSet<String>,
        now: time::OffsetDateTime,
        permission: Permission,
        report: &mut TickReport,
    ) {
        let mut policy = lock(&self.policy);
        if !policy.should_notify(overdue, now) {
            return;
        }
        let notification = overdue_notification(overdue.len());
        if !permission.is_granted() {
            info!("overdue notice not shown: {}", notification.body);
            report.suppressed.push(notification);
            return;
        }
        match self.gateway.deliver(&notification) {
            Ok(()) => {
                policy.notified(overdue, now);
                report.overdue_notified = true;
            }
            Err(e) => {
                warn!("overdue notice not delivered: {e}");
                report.failures.push(TickFailure {
                    task_id: None,
                    error: e,
                });
            }
        }
    }

    /// Requests permission, then ticks immediately and every `period` until
    /// the handle is stopped.
    pub fn spawn(self: Arc<Self>, period: Duration) -> SchedulerHandle {
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let period = period.max(Duration::from_secs(1));

        let join = tokio::spawn(async move {
            let this = self.clone();
            if let Err(e) = tokio::task::spawn_blocking(move || this.request_permission()).await {
                error!("permission request panicked: {e}");
            }
            info!("reminder scheduler started, ticking every {}s", period.as_secs());

            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    () = token.cancelled() => break,
                    _ = ticker.tick() => {}
                }
                let this = self.clone();
                match tokio::task::spawn_blocking(move || this.tick()).await {
                    Ok(report) => {
                        for failure in &report.failures {
                            debug!("tick failure ({:?}): {}", failure.task_id, failure.error);
                        }
                    }
                    Err(e) => error!("reminder tick panicked: {e}"),
                }
            }
            info!("reminder scheduler stopped");
        });

        SchedulerHandle {
            cancel,
            join: Some(join),
        }
    }
}

/// Owns the running timer. Dropping it cancels the loop.
pub struct SchedulerHandle {
    cancel: CancellationToken,
    join: Option<JoinHandle<()>>,
}

impl SchedulerHandle {
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.join.as_ref().is_some_and(|j| !j.is_finished())
    }

    /// Cancels the timer and waits for an in-flight tick to finish.
    pub async fn stop(mut self) {
        self.cancel.cancel();
        if let Some(join) = self.join.take()
            && let Err(e) = join.await
        {
            error!("reminder scheduler task failed: {e}");
        }
    }
}

impl Drop for SchedulerHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

struct RunningGuard<'a>(&'a AtomicBool);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

fn lock<T: ?Sized>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

fn lock_repo(repo: &SharedRepository) -> MutexGuard<'_, TaskRepository> {
    repo.lock().unwrap_or_else(PoisonError::into_inner)
}
