//! [`SyncStore`]: the single owner of [`DashboardState`] plus its observers.

use std::fmt;

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::{
  Error, Result,
  entity::AlarmState,
  event::ChangeEvent,
  reconcile::{self, Applied},
  state::{DashboardState, Snapshot},
};

/// Identifies a registered observer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Observer = Box<dyn FnMut(&DashboardState) + Send>;

/// Holds the dashboard state and notifies observers after every change.
///
/// Observers run synchronously inside the mutating call, in registration
/// order, and only when something actually changed.
#[derive(Default)]
pub struct SyncStore {
  state:     DashboardState,
  observers: Vec<(SubscriptionId, Observer)>,
  next_id:   u64,
}

impl fmt::Debug for SyncStore {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("SyncStore")
      .field("state", &self.state)
      .field("observers", &self.observers.len())
      .finish()
  }
}

impl SyncStore {
  pub fn new() -> Self { Self::default() }

  /// A consistent view of every collection.
  pub fn snapshot(&self) -> &DashboardState { &self.state }

  pub fn subscribe(
    &mut self,
    observer: impl FnMut(&DashboardState) + Send + 'static,
  ) -> SubscriptionId {
    let id = SubscriptionId(self.next_id);
    self.next_id += 1;
    self.observers.push((id, Box::new(observer)));
    id
  }

  /// Returns whether the observer was registered.
  pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
    let before = self.observers.len();
    self.observers.retain(|(sid, _)| *sid != id);
    self.observers.len() != before
  }

  /// Replace every collection atomically with `snapshot`. Local alarm
  /// trigger state survives for alarms whose time did not change.
  pub fn bootstrap(&mut self, snapshot: Snapshot) {
    let next = DashboardState::from_snapshot(snapshot, Some(&self.state));
    info!(
      subjects = next.subjects.len(),
      tasks = next.tasks.len(),
      notes = next.notes.len(),
      alarms = next.alarms.len(),
      studying = next.study.is_some(),
      "bootstrapped dashboard state"
    );
    self.state = next;
    self.notify();
  }

  /// Apply one change event. Observers are only notified on change.
  pub fn apply(&mut self, event: ChangeEvent, now: DateTime<Utc>) -> Applied {
    let applied = reconcile::apply(&mut self.state, event, now);
    if applied.changed {
      self.notify();
    }
    applied
  }

  /// Move an alarm's local trigger state. Returns `Ok(false)` when the alarm
  /// is already in `to`.
  pub fn set_alarm_state(&mut self, id: &str, to: AlarmState) -> Result<bool> {
    let alarm = self
      .state
      .alarms
      .iter_mut()
      .find(|a| a.id == id)
      .ok_or_else(|| Error::AlarmNotFound(id.to_string()))?;
    if alarm.trigger == to {
      return Ok(false);
    }
    if !alarm.trigger.can_move_to(to) {
      return Err(Error::InvalidAlarmTransition {
        id:   alarm.id.clone(),
        from: alarm.trigger,
        to,
      });
    }
    debug!(alarm = %alarm.id, from = %alarm.trigger, %to, "alarm state moved");
    alarm.trigger = to;
    self.notify();
    Ok(true)
  }

  fn notify(&mut self) {
    let state = &self.state;
    for (_, observer) in &mut self.observers {
      observer(state);
    }
  }
}
