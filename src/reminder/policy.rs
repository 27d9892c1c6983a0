#![forbid(unsafe_code)]

//! When the batched overdue notification is repeated.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};

pub trait OverduePolicy: Send {
    /// Called with the non-empty set of overdue task ids seen this tick.
    fn should_notify(&self, overdue: &BTreeSet<String>, now: OffsetDateTime) -> bool;

    /// Called after the batch notification was actually delivered.
    fn notified(&mut self, overdue: &BTreeSet<String>, now: OffsetDateTime);
}

/// Repeat on every tick while anything is overdue.
#[derive(Debug, Clone, Copy, Default)]
pub struct EveryTick;

impl OverduePolicy for EveryTick {
    fn should_notify(&self, _overdue: &BTreeSet<String>, _now: OffsetDateTime) -> bool {
        true
    }

    fn notified(&mut self, _overdue: &BTreeSet<String>, _now: OffsetDateTime) {}
}

/// Notify again only when a task that was not part of the last delivered
/// batch becomes overdue.
#[derive(Debug, Clone, Default)]
pub struct OncePerOverdueSet {
    announced: BTreeSet<String>,
}

impl OverduePolicy for OncePerOverdueSet {
    fn should_notify(&self, overdue: &BTreeSet<String>, _now: OffsetDateTime) -> bool {
        !overdue.is_subset(&self.announced)
    }

    fn notified(&mut self, overdue: &BTreeSet<String>, _now: OffsetDateTime) {
        self.announced.clone_from(overdue);
    }
}

/// At most one batch per cooldown period.
#[derive(Debug, Clone)]
pub struct Cooldown {
    period: Duration,
    last: Option<OffsetDateTime>,
}

impl Cooldown {
    #[must_use]
    pub fn new(period: Duration) -> Self {
        Self { period, last: None }
    }
}

impl OverduePolicy for Cooldown {
    fn should_notify(&self, _overdue: &BTreeSet<String>, now: OffsetDateTime) -> bool {
        self.last.is_none_or(|last| now - last >= self.period)
    }

    fn notified(&mut self, _overdue: &BTreeSet<String>, now: OffsetDateTime) {
        self.last = Some(now);
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OverduePolicyKind {
    #[default]
    EveryTick,
    Once,
    Cooldown,
}

impl OverduePolicyKind {
    #[must_use]
    pub fn build(self, cooldown_minutes: u64) -> Box<dyn OverduePolicy> {
        match self {
            Self::EveryTick => Box::new(EveryTick),
            Self::Once => Box::new(OncePerOverdueSet::default()),
            Self::Cooldown => Box::new(Cooldown::new(Duration::minutes(
                i64::try_from(cooldown_minutes).unwrap_or(i64::MAX / 60),
            ))),
        }
    }
}
