//! The event reconciler: folds one [`ChangeEvent`] into a [`DashboardState`].
//!
//! Every operation is idempotent. Re-applying an event that has already been
//! observed (for example the channel echo of a REST response that was applied
//! first) leaves the state untouched and reports [`Applied::changed`] as
//! `false`. Only state-changing applies append to the activity log, so
//! duplicate delivery never shows up in it either.

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::{
  entity::{ActivityEntry, Alarm, AlarmId, AlarmState, Keyed, StudySession},
  event::ChangeEvent,
  state::DashboardState,
};

// ─── Outcome ─────────────────────────────────────────────────────────────────

/// Follow-up work the owner of the state must perform after an apply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
  /// A new session began; the study clock restarts from zero.
  StudyRestarted(StudySession),
  /// The session ended; the study clock stops.
  StudyStopped,
  /// Queue this alarm for presentation.
  PresentAlarm(Alarm),
  /// Stop presenting (or drop from the queue) this alarm.
  WithdrawAlarm(AlarmId),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Applied {
  /// Whether any collection (including the activity log) changed.
  pub changed: bool,
  pub effect:  Option<Effect>,
}

impl Applied {
  fn unchanged() -> Self { Self::default() }

  fn changed() -> Self { Self { changed: true, effect: None } }

  fn with(mut self, effect: Effect) -> Self {
    self.effect = Some(effect);
    self
  }
}

// ─── Collection primitives ───────────────────────────────────────────────────

fn contains<T: Keyed>(items: &[T], key: &T::Key) -> bool {
  items.iter().any(|i| i.key() == key)
}

/// Insert at the front unless the key is already present.
fn insert_front<T: Keyed>(items: &mut Vec<T>, item: T) -> bool {
  if contains(items, item.key()) {
    return false;
  }
  items.insert(0, item);
  true
}

/// Insert at the back unless the key is already present.
fn insert_back<T: Keyed>(items: &mut Vec<T>, item: T) -> bool {
  if contains(items, item.key()) {
    return false;
  }
  items.push(item);
  true
}

/// Replace the entity with the same key wholesale. Returns `false` when the
/// key is absent or the stored entity is already identical.
fn replace<T: Keyed + PartialEq>(items: &mut [T], item: T) -> bool {
  match items.iter_mut().find(|i| i.key() == item.key()) {
    Some(slot) if *slot != item => {
      *slot = item;
      true
    }
    _ => false,
  }
}

fn remove<T: Keyed>(items: &mut Vec<T>, key: &T::Key) -> Option<T> {
  let pos = items.iter().position(|i| i.key() == key)?;
  Some(items.remove(pos))
}

// ─── apply ───────────────────────────────────────────────────────────────────

/// Apply `event` to `state`. `now` stamps the activity entry, if any.
pub fn apply(
  state: &mut DashboardState,
  event: ChangeEvent,
  now: DateTime<Utc>,
) -> Applied {
  let name = event.name();
  let (applied, line) = apply_inner(state, event);
  if let Some(text) = line {
    state.activity.push(ActivityEntry::new(now, text));
  }
  debug!(event = name, changed = applied.changed, "reconciled event");
  applied
}

/// Returns the outcome and the activity line to record (only for changes).
fn apply_inner(
  state: &mut DashboardState,
  event: ChangeEvent,
) -> (Applied, Option<String>) {
  use ChangeEvent::*;

  match event {
    // ── Subjects ──────────────────────────────────────────────────────────
    SubjectAdded(s) => {
      if state.has_subject(&s.name) {
        return (Applied::unchanged(), None);
      }
      let line = format!("Subject added: {}", s.name);
      state.subjects.push(s.name);
      (Applied::changed(), Some(line))
    }
    SubjectRemoved(s) => match state.subjects.iter().position(|n| *n == s.name) {
      Some(pos) => {
        state.subjects.remove(pos);
        (Applied::changed(), Some(format!("Subject removed: {}", s.name)))
      }
      None => (Applied::unchanged(), None),
    },

    // ── Tasks ─────────────────────────────────────────────────────────────
    TaskAdded(task) => {
      let line = format!("Task added: {}", task.title);
      changed_if(insert_front(&mut state.tasks, task), line)
    }
    TaskUpdated(task) => {
      let verb = if task.is_completed() { "completed" } else { "updated" };
      let line = format!("Task {verb}: {}", task.title);
      changed_if(replace(&mut state.tasks, task), line)
    }
    TaskDeleted(r) => match remove(&mut state.tasks, &r.id) {
      Some(task) => {
        (Applied::changed(), Some(format!("Task deleted: {}", task.title)))
      }
      None => (Applied::unchanged(), None),
    },

    // ── Notes ─────────────────────────────────────────────────────────────
    NoteAdded(note) => {
      let line = format!("Note created: {}", note.title);
      changed_if(insert_front(&mut state.notes, note), line)
    }
    NoteUpdated(note) => {
      let line = format!("Note updated: {}", note.title);
      changed_if(replace(&mut state.notes, note), line)
    }
    NoteDeleted(r) => match remove(&mut state.notes, &r.id) {
      Some(note) => {
        (Applied::changed(), Some(format!("Note deleted: {}", note.title)))
      }
      None => (Applied::unchanged(), None),
    },

    // ── Study ─────────────────────────────────────────────────────────────
    StudyStarted(session) => {
      if state.study.as_ref() == Some(&session) {
        return (Applied::unchanged(), None);
      }
      let line = format!("Focus started: {}", session.subject);
      state.study = Some(session.clone());
      (Applied::changed().with(Effect::StudyRestarted(session)), Some(line))
    }
    StudyStopped(summary) => match state.study.take() {
      Some(session) => {
        let subject = summary.subject.unwrap_or(session.subject);
        (
          Applied::changed().with(Effect::StudyStopped),
          Some(format!("Focus stopped: {subject}")),
        )
      }
      None => (Applied::unchanged(), None),
    },

    // ── Alarms ────────────────────────────────────────────────────────────
    AlarmAdded(mut alarm) => {
      alarm.trigger = AlarmState::Scheduled;
      let line = format!(
        "Alarm set: {} at {}",
        alarm.name,
        alarm.time.format(crate::wire::MINUTES_FORMAT)
      );
      changed_if(insert_back(&mut state.alarms, alarm), line)
    }
    AlarmUpdated(mut alarm) => {
      alarm.trigger = state.carried_trigger(&alarm);
      let toggle = if alarm.enabled { "enabled" } else { "disabled" };
      let line = format!("Alarm updated: {} ({toggle})", alarm.name);
      changed_if(replace(&mut state.alarms, alarm), line)
    }
    AlarmDeleted(r) => match remove(&mut state.alarms, &r.id) {
      Some(alarm) => (
        Applied::changed().with(Effect::WithdrawAlarm(r.id)),
        Some(format!("Alarm deleted: {}", alarm.name)),
      ),
      None => (Applied::unchanged().with(Effect::WithdrawAlarm(r.id)), None),
    },
    AlarmTriggered(alarm) => alarm_triggered(state, alarm),
    AlarmDismissed(r) => {
      let withdraw = Effect::WithdrawAlarm(r.id.clone());
      match state.alarms.iter_mut().find(|a| a.id == r.id) {
        Some(known) if known.trigger == AlarmState::Triggered => {
          known.trigger = AlarmState::Dismissed;
          let line = format!("Alarm dismissed: {}", known.name);
          (Applied::changed().with(withdraw), Some(line))
        }
        _ => (Applied::unchanged().with(withdraw), None),
      }
    }

    // ── Activity ──────────────────────────────────────────────────────────
    // Backend entries carry their own timestamp, so a redelivery is exact.
    ActivityLogged(entry) => {
      if state.activity.contains(&entry) {
        return (Applied::unchanged(), None);
      }
      state.activity.push(entry);
      (Applied::changed(), None)
    }
    AutomationEvent(payload) => {
      let text = payload
        .get("message")
        .and_then(|m| m.as_str())
        .map(str::to_string)
        .unwrap_or_else(|| payload.to_string());
      (Applied::changed(), Some(format!("Automation: {text}")))
    }
  }
}

fn changed_if(changed: bool, line: String) -> (Applied, Option<String>) {
  if changed {
    (Applied::changed(), Some(line))
  } else {
    (Applied::unchanged(), None)
  }
}

/// The trigger only moves the local trigger state; `enabled` and `time` stay
/// as the last `alarm_added`/`alarm_updated` left them.
fn alarm_triggered(
  state: &mut DashboardState,
  incoming: Alarm,
) -> (Applied, Option<String>) {
  let Some(known) = state.alarms.iter_mut().find(|a| a.id == incoming.id)
  else {
    // Not in the collection (e.g. the alarm list failed to load): still
    // present it, but do not invent an entity from a trigger. The scheduler
    // drops repeats of the same id.
    let mut presented = incoming;
    presented.trigger = AlarmState::Triggered;
    return (Applied::unchanged().with(Effect::PresentAlarm(presented)), None);
  };

  // A repeating alarm fires again on its next occurrence.
  if known.repeat && known.trigger.is_resolved() {
    known.trigger = AlarmState::Scheduled;
  }
  if !known.trigger.can_move_to(AlarmState::Triggered) {
    return (Applied::unchanged(), None);
  }
  known.trigger = AlarmState::Triggered;
  let line = format!("Alarm triggered: {}", known.name);
  (Applied::changed().with(Effect::PresentAlarm(known.clone())), Some(line))
}
