//! Plain-text renderings of the dashboard.

use std::fmt::Write as _;

use nari_client::Clocks;
use nari_core::{
  DashboardState,
  entity::{Alarm, AlarmState},
  supervisor::{ConnectionState, ConnectionStatus},
  wire::MINUTES_FORMAT,
};

use crate::input::View;

pub fn render(
  view: View,
  state: &DashboardState,
  connection: &ConnectionStatus,
  clocks: &Clocks,
) -> String {
  match view {
    View::Status => status(state, connection, clocks),
    View::Tasks => tasks(state),
    View::Notes => notes(state),
    View::Alarms => alarms(state),
    View::Activity => activity(state),
    View::Clocks => clock_lines(clocks),
  }
}

pub fn connection_line(status: &ConnectionStatus) -> String {
  match status.state {
    ConnectionState::Connected => "connected".to_string(),
    state if status.exhausted => {
      format!("{state}: gave up reconnecting, type `retry`")
    }
    ConnectionState::Stale => "stale: data may be out of date".to_string(),
    state => format!("{state} (attempt {})", status.attempts),
  }
}

fn status(
  state: &DashboardState,
  connection: &ConnectionStatus,
  clocks: &Clocks,
) -> String {
  let mut out = String::new();
  let _ = writeln!(out, "connection: {}", connection_line(connection));
  match &state.study {
    Some(session) => {
      let _ = writeln!(
        out,
        "studying {} for {}",
        session.subject,
        clocks.study_display()
      );
    }
    None => out.push_str("not studying\n"),
  }
  let open = state.tasks.iter().filter(|t| !t.is_completed()).count();
  let _ = writeln!(
    out,
    "{} subjects, {open}/{} open tasks, {} notes, {} alarms",
    state.subjects.len(),
    state.tasks.len(),
    state.notes.len(),
    state.alarms.len(),
  );
  out.push_str(&clock_lines(clocks));
  out
}

fn tasks(state: &DashboardState) -> String {
  if state.tasks.is_empty() {
    return "no tasks\n".to_string();
  }
  state.tasks.iter().fold(String::new(), |mut out, t| {
    let mark = if t.is_completed() { 'x' } else { ' ' };
    let _ = write!(out, "[{mark}] #{} {}", t.id, t.title);
    if let Some(due) = &t.due {
      let _ = write!(out, " (due {due})");
    }
    out.push('\n');
    out
  })
}

fn notes(state: &DashboardState) -> String {
  if state.notes.is_empty() {
    return "no notes\n".to_string();
  }
  state.notes.iter().fold(String::new(), |mut out, n| {
    let _ = writeln!(out, "#{} {}", n.id, n.title);
    out
  })
}

fn alarm_line(alarm: &Alarm) -> String {
  let mut line = format!(
    "{} {} {}",
    alarm.id,
    alarm.time.format(MINUTES_FORMAT),
    alarm.name
  );
  if alarm.repeat {
    line.push_str(" (daily)");
  }
  if !alarm.enabled {
    line.push_str(" (off)");
  }
  if alarm.trigger != AlarmState::Scheduled {
    let _ = write!(line, " [{}]", alarm.trigger);
  }
  line
}

fn alarms(state: &DashboardState) -> String {
  if state.alarms.is_empty() {
    return "no alarms\n".to_string();
  }
  state.alarms.iter().map(|a| alarm_line(a) + "\n").collect()
}

fn activity(state: &DashboardState) -> String {
  state.activity.iter().take(20).fold(String::new(), |mut out, e| {
    let _ = writeln!(out, "{} {}", e.timestamp.format("%H:%M:%S"), e.text);
    out
  })
}

fn clock_lines(clocks: &Clocks) -> String {
  format!(
    "clock {}  timer {} ({})  stopwatch {}\n",
    clocks.wall,
    clocks.countdown.display(),
    clocks.countdown.phase(),
    clocks.stopwatch_display(),
  )
}

pub fn presented(alarm: &Alarm) -> String {
  format!("ALARM {}: {} (dismiss | snooze)", alarm.name, alarm.time.format("%H:%M"))
}
