//! The client-side dashboard state and the snapshot used to (re)build it.

use serde::Serialize;

use crate::{
  activity::ActivityLog,
  entity::{ActivityEntry, Alarm, AlarmState, Keyed, Note, StudySession, Task},
};

// ─── Snapshot ────────────────────────────────────────────────────────────────

/// A full set of collections fetched over REST. Input to
/// [`crate::store::SyncStore::bootstrap`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snapshot {
  pub subjects: Vec<String>,
  pub tasks:    Vec<Task>,
  pub notes:    Vec<Note>,
  pub alarms:   Vec<Alarm>,
  pub study:    Option<StudySession>,
  /// Newest-first.
  pub activity: Vec<ActivityEntry>,
}

// ─── DashboardState ──────────────────────────────────────────────────────────

/// Everything the dashboard renders. Only the reconciler and
/// [`crate::store::SyncStore::bootstrap`] change it.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DashboardState {
  /// Subject names in the order they were added.
  pub subjects: Vec<String>,
  /// Newest-first.
  pub tasks:    Vec<Task>,
  /// Newest-first.
  pub notes:    Vec<Note>,
  /// In the order they were added.
  pub alarms:   Vec<Alarm>,
  pub study:    Option<StudySession>,
  pub activity: ActivityLog,
}

impl DashboardState {
  /// Build a state from `snapshot`, dropping duplicate ids (first occurrence
  /// wins) and carrying over the local trigger state of alarms from
  /// `previous` whose time has not changed.
  pub fn from_snapshot(
    snapshot: Snapshot,
    previous: Option<&DashboardState>,
  ) -> Self {
    let mut subjects: Vec<String> = Vec::with_capacity(snapshot.subjects.len());
    for name in snapshot.subjects {
      if !subjects.contains(&name) {
        subjects.push(name);
      }
    }

    let mut alarms = dedup_by_key(snapshot.alarms);
    if let Some(prev) = previous {
      for alarm in &mut alarms {
        alarm.trigger = prev.carried_trigger(alarm);
      }
    }

    Self {
      subjects,
      tasks: dedup_by_key(snapshot.tasks),
      notes: dedup_by_key(snapshot.notes),
      alarms,
      study: snapshot.study,
      activity: ActivityLog::from_newest_first(snapshot.activity),
    }
  }

  pub fn task(&self, id: u64) -> Option<&Task> {
    self.tasks.iter().find(|t| t.id == id)
  }

  pub fn note(&self, id: u64) -> Option<&Note> {
    self.notes.iter().find(|n| n.id == id)
  }

  pub fn alarm(&self, id: &str) -> Option<&Alarm> {
    self.alarms.iter().find(|a| a.id == id)
  }

  pub fn has_subject(&self, name: &str) -> bool {
    self.subjects.iter().any(|s| s == name)
  }

  /// The trigger state `incoming` should have given what this state knows
  /// about the same alarm. A changed time is a new occurrence.
  pub(crate) fn carried_trigger(&self, incoming: &Alarm) -> AlarmState {
    match self.alarm(&incoming.id) {
      Some(known) if known.time == incoming.time => known.trigger,
      _ => AlarmState::Scheduled,
    }
  }
}

fn dedup_by_key<T: Keyed>(items: Vec<T>) -> Vec<T> {
  let mut out: Vec<T> = Vec::with_capacity(items.len());
  for item in items {
    if !out.iter().any(|existing| existing.key() == item.key()) {
      out.push(item);
    }
  }
  out
}
