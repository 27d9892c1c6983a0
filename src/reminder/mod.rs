#![forbid(unsafe_code)]

//! Reminder decisions.
//!
//! A task's reminder state is never stored. It is recomputed on every tick
//! from the task, the current time and the notification settings.

pub mod policy;
pub mod scheduler;

pub use policy::{Cooldown, EveryTick, OncePerOverdueSet, OverduePolicy, OverduePolicyKind};
pub use scheduler::{ReminderScheduler, SchedulerHandle, TickFailure, TickReport, TickStatus};

use time::{Duration, OffsetDateTime};

use crate::notify::{Notification, NotificationSettings};
use crate::task::Task;

pub const OVERDUE_TAG: &str = "overdue-tasks";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReminderState {
    /// Completed, or no due date. Nothing will ever be sent.
    Dormant,
    /// Due later than the lead window, already reminded, or due exactly now.
    Pending,
    /// Inside the lead window and not yet reminded.
    DueSoon,
    /// Past due and not completed.
    Overdue,
}

#[must_use]
pub fn classify(task: &Task, now: OffsetDateTime, settings: &NotificationSettings) -> ReminderState {
    let Some(due) = task.due_date else {
        return ReminderState::Dormant;
    };
    if task.completed {
        return ReminderState::Dormant;
    }
    if due < now {
        return ReminderState::Overdue;
    }
    let lead = Duration::minutes(i64::from(settings.reminder_minutes));
    // A window past the representable range covers every later due date.
    let in_window = now.checked_add(lead).is_none_or(|limit| due <= limit);
    if now < due && in_window && !task.reminder_sent {
        return ReminderState::DueSoon;
    }
    ReminderState::Pending
}

#[must_use]
pub fn task_tag(task_id: &str) -> String {
    format!("task-{task_id}")
}

/// Minutes until `due`, rounded up.
#[must_use]
pub fn minutes_left(due: OffsetDateTime, now: OffsetDateTime) -> i64 {
    let secs = (due - now).whole_seconds();
    if secs <= 0 {
        return 0;
    }
    (secs + 59) / 60
}

#[must_use]
pub fn upcoming_notification(task: &Task, now: OffsetDateTime) -> Notification {
    let left = task.due_date.map_or(0, |due| minutes_left(due, now));
    let when = if left > 0 {
        format!("vence em {left} minutos")
    } else {
        "está vencida!".to_owned()
    };
    Notification {
        title: "TaskFlow - Lembrete de Tarefa".to_owned(),
        body: format!("\"{}\" {when}", task.title),
        tag: task_tag(&task.id),
    }
}

#[must_use]
pub fn overdue_notification(count: usize) -> Notification {
    let plural = if count > 1 { "s" } else { "" };
    Notification {
        title: "TaskFlow - Tarefas Vencidas".to_owned(),
        body: format!("Você tem {count} tarefa{plural} vencida{plural}!"),
        tag: OVERDUE_TAG.to_owned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::Priority;

    fn now() -> OffsetDateTime {
        OffsetDateTime::from_unix_timestamp(1_700_000_000).unwrap()
    }

    fn task(due: Option<OffsetDateTime>) -> Task {
        Task {
            id: "t1".to_owned(),
            title: "Pagar conta".to_owned(),
            description: None,
            priority: Priority::High,
            completed: false,
            created_at: now() - Duration::days(1),
            due_date: due,
            reminder_sent: false,
            extra: serde_json::Map::new(),
        }
    }

    fn enabled(minutes: u32) -> NotificationSettings {
        NotificationSettings {
            enabled: true,
            reminder_minutes: minutes,
        }
    }

    #[test]
    fn lead_time_beyond_the_calendar_covers_everything_ahead() {
        let s = enabled(u32::MAX);
        assert_eq!(
            classify(&task(Some(now() + Duration::days(1))), now(), &s),
            ReminderState::DueSoon
        );
        assert_eq!(
            classify(&task(Some(now() - Duration::minutes(1))), now(), &s),
            ReminderState::Overdue
        );
    }

    #[test]
    fn classifies_by_due_date_and_lead_time() {
        let s = enabled(30);
        assert_eq!(classify(&task(None), now(), &s), ReminderState::Dormant);
        assert_eq!(
            classify(&task(Some(now() + Duration::hours(2))), now(), &s),
            ReminderState::Pending
        );
        assert_eq!(
            classify(&task(Some(now() + Duration::minutes(10))), now(), &s),
            ReminderState::DueSoon
        );
        assert_eq!(
            classify(&task(Some(now() + Duration::minutes(30))), now(), &s),
            ReminderState::DueSoon
        );
        assert_eq!(
            classify(&task(Some(now() - Duration::seconds(1))), now(), &s),
            ReminderState::Overdue
        );
        assert_eq!(classify(&task(Some(now())), now(), &s), ReminderState::Pending);
    }

    #[test]
    fn completed_tasks_are_always_dormant() {
        let s = enabled(30);
        for offset in [-120, -1, 0, 5, 500] {
            let mut t = task(Some(now() + Duration::minutes(offset)));
            t.completed = true;
            assert_eq!(classify(&t, now(), &s), ReminderState::Dormant);
        }
    }

    #[test]
    fn reminded_tasks_stop_being_due_soon() {
        let mut t = task(Some(now() + Duration::minutes(10)));
        t.reminder_sent = true;
        assert_eq!(classify(&t, now(), &enabled(30)), ReminderState::Pending);
    }

    #[test]
    fn zero_lead_time_never_reminds_early() {
        let t = task(Some(now() + Duration::minutes(1)));
        assert_eq!(classify(&t, now(), &enabled(0)), ReminderState::Pending);
    }

    #[test]
    fn upcoming_body_rounds_minutes_up() {
        let t = task(Some(now() + Duration::seconds(9 * 60 + 1)));
        let n = upcoming_notification(&t, now());
        assert_eq!(n.body, "\"Pagar conta\" vence em 10 minutos");
        assert_eq!(n.tag, "task-t1");

        let late = upcoming_notification(&task(Some(now() - Duration::minutes(1))), now());
        assert_eq!(late.body, "\"Pagar conta\" está vencida!");
    }

    #[test]
    fn overdue_body_pluralises() {
        assert_eq!(overdue_notification(1).body, "Você tem 1 tarefa vencida!");
        assert_eq!(overdue_notification(3).body, "Você tem 3 tarefas vencidas!");
        assert_eq!(overdue_notification(3).tag, OVERDUE_TAG);
    }
}
