//! Entities mirrored from the backend.
//!
//! The server owns every field on the wire. The only client-local field is
//! [`Alarm::trigger`], which tracks where an alarm is in its presentation
//! lifecycle and is never serialised.

use std::fmt;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::wire;

pub type TaskId = u64;
pub type NoteId = u64;
pub type AlarmId = String;

// ─── Keyed ───────────────────────────────────────────────────────────────────

/// An entity with a stable identity inside its collection.
pub trait Keyed {
  type Key: PartialEq + fmt::Display;

  fn key(&self) -> &Self::Key;
}

// ─── Tasks ───────────────────────────────────────────────────────────────────

#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
  #[default]
  Pending,
  Completed,
}

/// Task priority. The backend stores whatever string the caller sent, so
/// anything unrecognised decodes as [`Priority::Unknown`].
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
  Low,
  #[default]
  Normal,
  Medium,
  High,
  #[serde(other)]
  Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
  pub id:           TaskId,
  pub title:        String,
  #[serde(default)]
  pub status:       TaskStatus,
  #[serde(default)]
  pub priority:     Priority,
  /// Free-form due date as entered by the user.
  #[serde(default)]
  pub due:          Option<String>,
  #[serde(default, with = "wire::local_seconds_opt")]
  pub created:      Option<NaiveDateTime>,
  #[serde(
    default,
    with = "wire::local_seconds_opt",
    skip_serializing_if = "Option::is_none"
  )]
  pub completed_at: Option<NaiveDateTime>,
  #[serde(
    default,
    with = "wire::local_seconds_opt",
    skip_serializing_if = "Option::is_none"
  )]
  pub updated_at:   Option<NaiveDateTime>,
}

impl Task {
  pub fn is_completed(&self) -> bool { self.status == TaskStatus::Completed }
}

impl Keyed for Task {
  type Key = TaskId;

  fn key(&self) -> &TaskId { &self.id }
}

// ─── Notes ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Note {
  pub id:      NoteId,
  pub title:   String,
  #[serde(default)]
  pub content: String,
  #[serde(default, with = "wire::local_seconds_opt")]
  pub created: Option<NaiveDateTime>,
  #[serde(
    default,
    with = "wire::local_seconds_opt",
    skip_serializing_if = "Option::is_none"
  )]
  pub updated: Option<NaiveDateTime>,
}

impl Keyed for Note {
  type Key = NoteId;

  fn key(&self) -> &NoteId { &self.id }
}

// ─── Study session ───────────────────────────────────────────────────────────

/// The single active focus session. `start` is authoritative; every elapsed
/// value shown to the user is derived from it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StudySession {
  pub subject: String,
  pub start:   DateTime<Utc>,
}

/// Payload of `study_stopped`. The client only needs the fact that the
/// session ended; the fields are informational.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StudySummary {
  #[serde(default)]
  pub subject:         Option<String>,
  #[serde(default)]
  pub start:           Option<DateTime<Utc>>,
  #[serde(default)]
  pub end:             Option<DateTime<Utc>>,
  #[serde(default)]
  pub elapsed_seconds: Option<u64>,
}

// ─── Alarms ──────────────────────────────────────────────────────────────────

/// Where an alarm is in its presentation lifecycle.
///
/// Valid moves: `Scheduled → Triggered → {Dismissed, Snoozed}`.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Default,
  Serialize,
  strum::Display,
  strum::IntoStaticStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum AlarmState {
  #[default]
  Scheduled,
  Triggered,
  Dismissed,
  Snoozed,
}

impl AlarmState {
  pub fn can_move_to(self, to: AlarmState) -> bool {
    use AlarmState::*;
    matches!(
      (self, to),
      (Scheduled, Triggered) | (Triggered, Dismissed) | (Triggered, Snoozed)
    )
  }

  /// Dismissed or snoozed: the user has dealt with this occurrence.
  pub fn is_resolved(self) -> bool {
    matches!(self, AlarmState::Dismissed | AlarmState::Snoozed)
  }
}

fn enabled_by_default() -> bool { true }

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Alarm {
  pub id:      AlarmId,
  pub name:    String,
  /// Wall-clock time in the server's zone, minute precision.
  #[serde(with = "wire::local_minutes")]
  pub time:    NaiveDateTime,
  #[serde(default)]
  pub repeat:  bool,
  #[serde(default = "enabled_by_default")]
  pub enabled: bool,
  #[serde(skip)]
  pub trigger: AlarmState,
}

impl Keyed for Alarm {
  type Key = AlarmId;

  fn key(&self) -> &AlarmId { &self.id }
}

// ─── Activity ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityEntry {
  pub timestamp: DateTime<Utc>,
  pub text:      String,
}

impl ActivityEntry {
  pub fn new(timestamp: DateTime<Utc>, text: impl Into<String>) -> Self {
    Self { timestamp, text: text.into() }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn task_decodes_backend_shape() {
    let task: Task = serde_json::from_value(serde_json::json!({
      "id": 3,
      "title": "Read chapter 4",
      "priority": "high",
      "due": "2025-03-20",
      "status": "pending",
      "created": "2025-03-14 09:00:00"
    }))
    .unwrap();
    assert_eq!(task.id, 3);
    assert_eq!(task.priority, Priority::High);
    assert!(!task.is_completed());
  }

  #[test]
  fn unrecognised_priority_is_unknown() {
    let task: Task = serde_json::from_value(
      serde_json::json!({ "id": 1, "title": "x", "priority": "urgent!!" }),
    )
    .unwrap();
    assert_eq!(task.priority, Priority::Unknown);
  }

  #[test]
  fn alarm_defaults_and_local_trigger_state() {
    let alarm: Alarm = serde_json::from_value(serde_json::json!({
      "id": "1718000000000",
      "name": "Stretch",
      "time": "2025-03-14 10:15"
    }))
    .unwrap();
    assert!(alarm.enabled);
    assert!(!alarm.repeat);
    assert_eq!(alarm.trigger, AlarmState::Scheduled);

    let json = serde_json::to_value(&alarm).unwrap();
    assert!(json.get("trigger").is_none());
  }

  #[test]
  fn alarm_transitions() {
    use AlarmState::*;
    assert!(Scheduled.can_move_to(Triggered));
    assert!(Triggered.can_move_to(Dismissed));
    assert!(Triggered.can_move_to(Snoozed));
    assert!(!Scheduled.can_move_to(Dismissed));
    assert!(!Dismissed.can_move_to(Triggered));
    assert!(!Snoozed.can_move_to(Dismissed));
  }
}
