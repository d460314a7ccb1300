//! Timer derivation.
//!
//! Every displayed duration is recomputed from the domain's own state on each
//! tick. The study clock derives from the session's absolute `start`, the
//! stopwatch from an accumulator plus the instant it was last resumed, and
//! the countdown from its remaining `{minutes, seconds}`.

use std::{
  fmt,
  time::{Duration, Instant},
};

use chrono::{DateTime, Timelike, Utc};
use serde::Serialize;

use crate::{Error, Result};

/// `now - start`, clamped to zero when `start` is in the future (clock skew).
pub fn elapsed(now: DateTime<Utc>, start: DateTime<Utc>) -> Duration {
  (now - start).to_std().unwrap_or(Duration::ZERO)
}

/// `"1h 2m 3s"`, `"1m 5s"` or `"5s"`.
pub fn format_elapsed(d: Duration) -> String {
  let total = d.as_secs();
  let (h, m, s) = (total / 3600, total / 60 % 60, total % 60);
  if h > 0 {
    format!("{h}h {m}m {s}s")
  } else if m > 0 {
    format!("{m}m {s}s")
  } else {
    format!("{s}s")
  }
}

/// `"MM:SS.cc"` (centiseconds).
pub fn format_stopwatch(d: Duration) -> String {
  let total = d.as_secs();
  format!(
    "{:02}:{:02}.{:02}",
    total / 60,
    total % 60,
    d.subsec_millis() / 10
  )
}

/// `"HH:MM:SS"`.
pub fn format_wall_clock(t: &impl Timelike) -> String {
  format!("{:02}:{:02}:{:02}", t.hour(), t.minute(), t.second())
}

// ─── Domains ─────────────────────────────────────────────────────────────────

/// An independently ticking timer domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum Domain {
  Study,
  Countdown,
  Stopwatch,
  WallClock,
}

impl Domain {
  /// Tick period of the domain's scheduler.
  pub fn period(self) -> Duration {
    match self {
      Domain::Stopwatch => Duration::from_millis(10),
      _ => Duration::from_secs(1),
    }
  }
}

// ─── Study clock ─────────────────────────────────────────────────────────────

/// Elapsed time of the active study session.
#[derive(Debug, Clone, Default)]
pub struct StudyClock {
  start: Option<DateTime<Utc>>,
  shown: Duration,
}

impl StudyClock {
  /// A new session began: the display restarts from zero.
  pub fn restart(&mut self, start: DateTime<Utc>) {
    self.start = Some(start);
    self.shown = Duration::ZERO;
  }

  /// The session ended: the display returns to zero.
  pub fn stop(&mut self) {
    self.start = None;
    self.shown = Duration::ZERO;
  }

  pub fn is_active(&self) -> bool { self.start.is_some() }

  /// Recompute from `start`. Never moves backwards within a session.
  pub fn tick(&mut self, now: DateTime<Utc>) -> Duration {
    if let Some(start) = self.start {
      self.shown = self.shown.max(elapsed(now, start));
    }
    self.shown
  }

  pub fn value(&self) -> Duration { self.shown }

  pub fn display(&self) -> String { format_elapsed(self.shown) }
}

// ─── Countdown ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct Remaining {
  pub minutes: u32,
  pub seconds: u32,
}

impl Remaining {
  pub fn is_zero(self) -> bool { self.minutes == 0 && self.seconds == 0 }
}

impl fmt::Display for Remaining {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{:02}:{:02}", self.minutes, self.seconds)
  }
}

#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, strum::Display,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum CountdownPhase {
  #[default]
  Idle,
  Running,
  Paused,
  /// Terminal until `set` or `reset`.
  Finished,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CountdownTick {
  /// The countdown is not running; the tick was stale.
  Ignored,
  Running(Remaining),
  /// Reached `00:00` on this tick. Reported exactly once.
  Completed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct Countdown {
  initial:   Remaining,
  remaining: Remaining,
  phase:     CountdownPhase,
}

impl Countdown {
  pub fn new() -> Self { Self::default() }

  pub fn phase(&self) -> CountdownPhase { self.phase }

  pub fn remaining(&self) -> Remaining { self.remaining }

  pub fn is_running(&self) -> bool { self.phase == CountdownPhase::Running }

  /// Set the duration. Not allowed while running.
  pub fn set(&mut self, minutes: u32, seconds: u32) -> Result<()> {
    if seconds >= 60 {
      return Err(Error::InvalidCountdown(format!(
        "seconds must be below 60, got {seconds}"
      )));
    }
    if self.is_running() {
      return Err(Error::InvalidCountdown(
        "pause the countdown before changing it".into(),
      ));
    }
    self.initial = Remaining { minutes, seconds };
    self.remaining = self.initial;
    self.phase = CountdownPhase::Idle;
    Ok(())
  }

  /// Returns `Ok(false)` if already running.
  pub fn start(&mut self) -> Result<bool> {
    if self.is_running() {
      return Ok(false);
    }
    if self.remaining.is_zero() {
      return Err(Error::InvalidCountdown("nothing to count down".into()));
    }
    self.phase = CountdownPhase::Running;
    Ok(true)
  }

  /// Returns whether the countdown was running.
  pub fn pause(&mut self) -> bool {
    if !self.is_running() {
      return false;
    }
    self.phase = CountdownPhase::Paused;
    true
  }

  /// Back to the last `set` value, idle.
  pub fn reset(&mut self) {
    self.remaining = self.initial;
    self.phase = CountdownPhase::Idle;
  }

  pub fn tick(&mut self) -> CountdownTick {
    if !self.is_running() {
      return CountdownTick::Ignored;
    }
    let r = &mut self.remaining;
    if r.seconds > 0 {
      r.seconds -= 1;
    } else if r.minutes > 0 {
      r.minutes -= 1;
      r.seconds = 59;
    }
    if r.is_zero() {
      self.phase = CountdownPhase::Finished;
      CountdownTick::Completed
    } else {
      CountdownTick::Running(*r)
    }
  }

  pub fn display(&self) -> String { self.remaining.to_string() }
}

// ─── Stopwatch ───────────────────────────────────────────────────────────────

/// Pause-resumable accumulator.
#[derive(Debug, Clone, Default)]
pub struct Stopwatch {
  accumulated: Duration,
  resumed_at:  Option<Instant>,
  shown:       Duration,
}

impl Stopwatch {
  pub fn new() -> Self { Self::default() }

  pub fn is_running(&self) -> bool { self.resumed_at.is_some() }

  /// Returns whether it was stopped before.
  pub fn start(&mut self, now: Instant) -> bool {
    if self.is_running() {
      return false;
    }
    self.resumed_at = Some(now);
    true
  }

  /// Fold the running span into the accumulator. Returns whether it was
  /// running.
  pub fn pause(&mut self, now: Instant) -> bool {
    let Some(resumed) = self.resumed_at.take() else {
      return false;
    };
    self.accumulated += now.saturating_duration_since(resumed);
    self.shown = self.shown.max(self.accumulated);
    true
  }

  /// Zero and paused.
  pub fn reset(&mut self) { *self = Self::default(); }

  pub fn elapsed(&self, now: Instant) -> Duration {
    self.accumulated
      + self
        .resumed_at
        .map(|r| now.saturating_duration_since(r))
        .unwrap_or_default()
  }

  /// Recompute the display value. Non-decreasing until `reset`.
  pub fn tick(&mut self, now: Instant) -> Duration {
    self.shown = self.shown.max(self.elapsed(now));
    self.shown
  }

  pub fn value(&self) -> Duration { self.shown }

  pub fn display(&self) -> String { format_stopwatch(self.shown) }
}

#[cfg(test)]
mod tests {
  use chrono::{NaiveTime, TimeZone};

  use super::*;

  #[test]
  fn sixty_five_seconds_reads_1m_5s() {
    let t0 = Utc.with_ymd_and_hms(2025, 3, 14, 10, 0, 0).unwrap();
    let mut clock = StudyClock::default();
    clock.restart(t0);
    let d = clock.tick(t0 + chrono::Duration::seconds(65));
    assert_eq!(format_elapsed(d), "1m 5s");
    assert_eq!(format_elapsed(Duration::from_secs(3723)), "1h 2m 3s");
    assert_eq!(format_elapsed(Duration::from_secs(9)), "9s");
  }

  #[test]
  fn elapsed_is_clamped_for_future_start() {
    let now = Utc.with_ymd_and_hms(2025, 3, 14, 10, 0, 0).unwrap();
    assert_eq!(elapsed(now, now + chrono::Duration::seconds(5)), Duration::ZERO);
  }

  #[test]
  fn study_clock_resets_on_restart_and_stop() {
    let t0 = Utc.with_ymd_and_hms(2025, 3, 14, 10, 0, 0).unwrap();
    let mut clock = StudyClock::default();
    clock.restart(t0);
    clock.tick(t0 + chrono::Duration::seconds(120));

    let t1 = t0 + chrono::Duration::seconds(130);
    clock.restart(t1);
    assert_eq!(clock.value(), Duration::ZERO);
    assert_eq!(clock.tick(t1 + chrono::Duration::seconds(1)), Duration::from_secs(1));

    clock.stop();
    assert!(!clock.is_active());
    assert_eq!(clock.tick(t1 + chrono::Duration::seconds(9)), Duration::ZERO);
  }

  #[test]
  fn countdown_completes_once_and_stops() {
    let mut c = Countdown::new();
    c.set(0, 2).unwrap();
    assert!(c.start().unwrap());
    assert_eq!(c.tick(), CountdownTick::Running(Remaining { minutes: 0, seconds: 1 }));
    assert_eq!(c.tick(), CountdownTick::Completed);
    assert_eq!(c.tick(), CountdownTick::Ignored);
    assert_eq!(c.phase(), CountdownPhase::Finished);
    assert_eq!(c.display(), "00:00");
    assert!(c.start().is_err());
  }

  #[test]
  fn countdown_borrows_a_minute() {
    let mut c = Countdown::new();
    c.set(1, 0).unwrap();
    c.start().unwrap();
    assert_eq!(c.tick(), CountdownTick::Running(Remaining { minutes: 0, seconds: 59 }));
    assert!(c.pause());
    assert_eq!(c.tick(), CountdownTick::Ignored);
    c.reset();
    assert_eq!(c.display(), "01:00");
  }

  #[test]
  fn countdown_validation() {
    let mut c = Countdown::new();
    assert!(c.set(1, 60).is_err());
    assert!(c.start().is_err());
    c.set(0, 5).unwrap();
    c.start().unwrap();
    assert!(c.set(0, 10).is_err());
    assert!(!c.start().unwrap());
  }

  #[test]
  fn stopwatch_pauses_without_resetting() {
    let t0 = Instant::now();
    let ms = Duration::from_millis;
    let mut sw = Stopwatch::new();
    assert!(sw.start(t0));
    assert_eq!(sw.tick(t0 + ms(1_250)), ms(1_250));
    assert!(sw.pause(t0 + ms(1_500)));
    assert_eq!(sw.tick(t0 + ms(9_000)), ms(1_500));
    sw.start(t0 + ms(10_000));
    assert_eq!(sw.tick(t0 + ms(10_250)), ms(1_750));
    assert_eq!(sw.display(), "00:01.75");

    sw.reset();
    assert!(!sw.is_running());
    assert_eq!(sw.value(), Duration::ZERO);
  }

  #[test]
  fn formats() {
    assert_eq!(format_stopwatch(Duration::from_millis(61_230)), "01:01.23");
    let t = NaiveTime::from_hms_opt(7, 5, 3).unwrap();
    assert_eq!(format_wall_clock(&t), "07:05:03");
    assert_eq!(Domain::Stopwatch.period(), Duration::from_millis(10));
    assert_eq!(Domain::WallClock.to_string(), "wall_clock");
  }
}
