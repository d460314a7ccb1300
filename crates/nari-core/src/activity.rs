//! Bounded, newest-first activity log.

use std::collections::VecDeque;

use serde::Serialize;

use crate::entity::ActivityEntry;

/// Maximum number of entries kept; the oldest are dropped first.
pub const ACTIVITY_CAPACITY: usize = 200;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ActivityLog {
  entries: VecDeque<ActivityEntry>,
}

impl ActivityLog {
  pub fn new() -> Self { Self::default() }

  /// Build from entries already ordered newest-first (as the backend returns
  /// them). Anything past the capacity is discarded.
  pub fn from_newest_first(
    entries: impl IntoIterator<Item = ActivityEntry>,
  ) -> Self {
    Self {
      entries: entries.into_iter().take(ACTIVITY_CAPACITY).collect(),
    }
  }

  /// Record a new entry at the front.
  pub fn push(&mut self, entry: ActivityEntry) {
    self.entries.push_front(entry);
    self.entries.truncate(ACTIVITY_CAPACITY);
  }

  pub fn contains(&self, entry: &ActivityEntry) -> bool {
    self.entries.contains(entry)
  }

  pub fn newest(&self) -> Option<&ActivityEntry> { self.entries.front() }

  /// Newest-first iterator.
  pub fn iter(&self) -> impl Iterator<Item = &ActivityEntry> {
    self.entries.iter()
  }

  pub fn len(&self) -> usize { self.entries.len() }

  pub fn is_empty(&self) -> bool { self.entries.is_empty() }
}

#[cfg(test)]
mod tests {
  use chrono::{TimeZone, Utc};

  use super::*;

  fn entry(n: i64) -> ActivityEntry {
    ActivityEntry::new(Utc.timestamp_opt(n, 0).unwrap(), format!("#{n}"))
  }

  #[test]
  fn newest_first_and_bounded() {
    let mut log = ActivityLog::new();
    for n in 0..250 {
      log.push(entry(n));
    }
    assert_eq!(log.len(), ACTIVITY_CAPACITY);
    assert_eq!(log.newest().unwrap().text, "#249");
    assert_eq!(log.iter().last().unwrap().text, "#50");
  }

  #[test]
  fn from_newest_first_truncates_the_tail() {
    let log = ActivityLog::from_newest_first((0..300).rev().map(entry));
    assert_eq!(log.len(), ACTIVITY_CAPACITY);
    assert_eq!(log.newest().unwrap().text, "#299");
    assert_eq!(log.iter().last().unwrap().text, "#100");
  }
}
