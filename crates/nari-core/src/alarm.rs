//! Serialised alarm presentation: one alarm on screen, the rest queued.

use std::collections::VecDeque;

use chrono::{NaiveDateTime, TimeDelta, Timelike};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
  entity::{Alarm, AlarmState},
  wire,
};

/// How far a snooze pushes the alarm.
pub const SNOOZE_MINUTES: i64 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Enqueued {
  /// Nothing else was on screen; this alarm is now presented.
  Presented,
  Queued,
  /// Already presented or queued.
  Duplicate,
}

/// The alarm the user just dealt with and whatever replaced it on screen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
  pub resolved: Alarm,
  pub next:     Option<Alarm>,
}

/// Body of the create-alarm call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewAlarm {
  pub name:   String,
  #[serde(with = "wire::local_minutes")]
  pub time:   NaiveDateTime,
  pub repeat: bool,
}

impl NewAlarm {
  /// The alarm a snooze creates: `now + 5 min` at minute precision, named
  /// after `alarm`, one-shot.
  pub fn snooze_of(alarm: &Alarm, now: NaiveDateTime) -> Self {
    let at = now + TimeDelta::minutes(SNOOZE_MINUTES);
    let time = at.date().and_hms_opt(at.hour(), at.minute(), 0).unwrap_or(at);
    Self { name: format!("{} (Snoozed)", alarm.name), time, repeat: false }
  }
}

#[derive(Debug, Clone, Default)]
pub struct AlarmScheduler {
  current: Option<Alarm>,
  queue:   VecDeque<Alarm>,
}

impl AlarmScheduler {
  pub fn new() -> Self { Self::default() }

  /// The alarm on screen.
  pub fn current(&self) -> Option<&Alarm> { self.current.as_ref() }

  /// Queued behind the current one.
  pub fn pending(&self) -> usize { self.queue.len() }

  fn contains(&self, id: &str) -> bool {
    self.current.as_ref().is_some_and(|a| a.id == id)
      || self.queue.iter().any(|a| a.id == id)
  }

  pub fn enqueue(&mut self, mut alarm: Alarm) -> Enqueued {
    if self.contains(&alarm.id) {
      return Enqueued::Duplicate;
    }
    alarm.trigger = AlarmState::Triggered;
    if self.current.is_none() {
      debug!(alarm = %alarm.id, "presenting alarm");
      self.current = Some(alarm);
      Enqueued::Presented
    } else {
      debug!(alarm = %alarm.id, pending = self.queue.len() + 1, "alarm queued");
      self.queue.push_back(alarm);
      Enqueued::Queued
    }
  }

  fn resolve(&mut self, as_state: AlarmState) -> Option<Resolution> {
    let mut resolved = self.current.take()?;
    resolved.trigger = as_state;
    self.current = self.queue.pop_front();
    Some(Resolution { resolved, next: self.current.clone() })
  }

  /// Acknowledge the presented alarm and advance the queue. `None` when
  /// nothing is presented.
  pub fn dismiss(&mut self) -> Option<Resolution> {
    self.resolve(AlarmState::Dismissed)
  }

  /// Like [`Self::dismiss`], plus the alarm to create for the snooze.
  pub fn snooze(
    &mut self,
    now: NaiveDateTime,
  ) -> Option<(Resolution, NewAlarm)> {
    let resolution = self.resolve(AlarmState::Snoozed)?;
    let request = NewAlarm::snooze_of(&resolution.resolved, now);
    Some((resolution, request))
  }

  /// Drop `id` from the queue or the screen. Returns whether it was there.
  pub fn withdraw(&mut self, id: &str) -> bool {
    if self.current.as_ref().is_some_and(|a| a.id == id) {
      self.current = self.queue.pop_front();
      return true;
    }
    let before = self.queue.len();
    self.queue.retain(|a| a.id != id);
    self.queue.len() != before
  }
}
