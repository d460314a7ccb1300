//! Change events pushed by the backend's event channel.
//!
//! The channel delivers `(name, payload)` pairs. [`ChangeEvent::decode`] turns
//! such a pair into a typed event, rejecting unknown names and payloads that
//! do not have the expected shape (most commonly a missing `id`).

use serde::{Deserialize, Serialize};
use strum::VariantNames as _;

use crate::{
  Error, Result,
  entity::{
    ActivityEntry, Alarm, AlarmId, Note, NoteId, StudySession, StudySummary,
    Task, TaskId,
  },
};

/// `{"name": "..."}`: payload of the subject events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubjectRef {
  pub name: String,
}

/// `{"id": ...}`: payload of the delete/dismiss events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdRef<K> {
  pub id: K,
}

/// A typed change notification. Variant names double as the wire event names
/// (`snake_case`).
#[derive(
  Debug,
  Clone,
  PartialEq,
  Serialize,
  Deserialize,
  strum::IntoStaticStr,
  strum::VariantNames,
)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ChangeEvent {
  // ── Subjects ────────────────────────────────────────────────────────────
  SubjectAdded(SubjectRef),
  SubjectRemoved(SubjectRef),

  // ── Tasks ───────────────────────────────────────────────────────────────
  TaskAdded(Task),
  TaskUpdated(Task),
  TaskDeleted(IdRef<TaskId>),

  // ── Notes ───────────────────────────────────────────────────────────────
  NoteAdded(Note),
  NoteUpdated(Note),
  NoteDeleted(IdRef<NoteId>),

  // ── Study ───────────────────────────────────────────────────────────────
  StudyStarted(StudySession),
  StudyStopped(StudySummary),

  // ── Alarms ──────────────────────────────────────────────────────────────
  AlarmAdded(Alarm),
  AlarmUpdated(Alarm),
  AlarmDeleted(IdRef<AlarmId>),
  AlarmTriggered(Alarm),
  /// Some client acknowledged the alarm.
  AlarmDismissed(IdRef<AlarmId>),

  // ── Activity ────────────────────────────────────────────────────────────
  ActivityLogged(ActivityEntry),
  /// Opaque payload from the backend's automation engine.
  AutomationEvent(serde_json::Value),
}

impl ChangeEvent {
  /// Decode a raw channel event.
  pub fn decode(name: &str, payload: serde_json::Value) -> Result<Self> {
    if !Self::VARIANTS.contains(&name) {
      return Err(Error::UnknownEvent(name.to_string()));
    }
    // Adjacently tagged: rebuild the `{event, data}` envelope serde expects.
    let wrapped = serde_json::json!({ "event": name, "data": payload });
    serde_json::from_value(wrapped).map_err(|source| Error::MalformedEvent {
      name: name.to_string(),
      source,
    })
  }

  /// The wire name of this event, e.g. `"task_added"`.
  pub fn name(&self) -> &'static str { self.into() }
}
