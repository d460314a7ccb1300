//! Line commands typed at the `nari` prompt.

use anyhow::{Context, Result, bail};
use chrono::NaiveDateTime;
use nari_client::{
  Command, Mutation, TimerCommand,
  api::{NewNote, NewTask, TaskPatch},
};
use nari_core::{alarm::NewAlarm, entity::TaskStatus, wire::MINUTES_FORMAT};

pub const HELP: &str = "\
commands:
  status | tasks | notes | alarms | activity | clocks
  dismiss | snooze | retry
  timer set <min> <sec> | timer start|pause|reset
  stopwatch start|pause|reset
  subject add|rm <name>
  task add <title> | task done <id> | task rm <id>
  note add <title> | note rm <id>
  study start <subject> | study stop [discard]
  alarm add <YYYY-MM-DD> <HH:MM> <name> | alarm rm|on|off <id>
  help | quit";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum View {
  Status,
  Tasks,
  Notes,
  Alarms,
  Activity,
  Clocks,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
  Engine(Command),
  Show(View),
  Help,
  Quit,
}

impl From<Mutation> for Input {
  fn from(m: Mutation) -> Self { Input::Engine(Command::Mutate(m)) }
}

fn rest(words: &[&str], what: &str) -> Result<String> {
  if words.is_empty() {
    bail!("missing {what}");
  }
  Ok(words.join(" "))
}

fn number<T: std::str::FromStr>(word: Option<&&str>, what: &str) -> Result<T>
where
  T::Err: std::error::Error + Send + Sync + 'static,
{
  let word = word.with_context(|| format!("missing {what}"))?;
  word.parse().with_context(|| format!("invalid {what} {word:?}"))
}

fn timer_command(word: Option<&&str>) -> Result<TimerCommand> {
  Ok(match word.copied() {
    Some("start") => TimerCommand::Start,
    Some("pause") => TimerCommand::Pause,
    Some("reset") => TimerCommand::Reset,
    other => bail!("expected start, pause or reset, got {other:?}"),
  })
}

/// Parse one line. `Ok(None)` for a blank line.
pub fn parse(line: &str) -> Result<Option<Input>> {
  let words: Vec<&str> = line.split_whitespace().collect();
  let Some((&head, args)) = words.split_first() else {
    return Ok(None);
  };

  let input = match (head, args) {
    ("help" | "?", _) => Input::Help,
    ("quit" | "exit" | "q", _) => Input::Quit,
    ("status", _) => Input::Show(View::Status),
    ("tasks", _) => Input::Show(View::Tasks),
    ("notes", _) => Input::Show(View::Notes),
    ("alarms", _) => Input::Show(View::Alarms),
    ("activity", _) => Input::Show(View::Activity),
    ("clocks", _) => Input::Show(View::Clocks),

    ("dismiss", _) => Input::Engine(Command::Dismiss),
    ("snooze", _) => Input::Engine(Command::Snooze),
    ("retry", _) => Input::Engine(Command::Retry),

    ("timer", ["set", tail @ ..]) => Input::Engine(Command::SetCountdown {
      minutes: number(tail.first(), "minutes")?,
      seconds: number(tail.get(1), "seconds")?,
    }),
    ("timer", tail) => Input::Engine(Command::Countdown(timer_command(tail.first())?)),
    ("stopwatch", tail) => {
      Input::Engine(Command::Stopwatch(timer_command(tail.first())?))
    }

    ("subject", ["add", tail @ ..]) => {
      Mutation::AddSubject(rest(tail, "subject name")?).into()
    }
    ("subject", ["rm", tail @ ..]) => {
      Mutation::RemoveSubject(rest(tail, "subject name")?).into()
    }

    ("task", ["add", tail @ ..]) => Mutation::AddTask(NewTask {
      title:    rest(tail, "task title")?,
      priority: Default::default(),
      due:      None,
    })
    .into(),
    ("task", ["done", tail @ ..]) => Mutation::UpdateTask(
      number(tail.first(), "task id")?,
      TaskPatch { status: Some(TaskStatus::Completed), ..Default::default() },
    )
    .into(),
    ("task", ["rm", tail @ ..]) => {
      Mutation::DeleteTask(number(tail.first(), "task id")?).into()
    }

    ("note", ["add", tail @ ..]) => Mutation::AddNote(NewNote {
      title:   rest(tail, "note title")?,
      content: String::new(),
    })
    .into(),
    ("note", ["rm", tail @ ..]) => {
      Mutation::DeleteNote(number(tail.first(), "note id")?).into()
    }

    ("study", ["start", tail @ ..]) => {
      Mutation::StartStudy { subject: rest(tail, "subject")? }.into()
    }
    ("study", ["stop"]) => Mutation::StopStudy { save: true }.into(),
    ("study", ["stop", "discard"]) => Mutation::StopStudy { save: false }.into(),

    ("alarm", ["add", date, time, tail @ ..]) => {
      let raw = format!("{date} {time}");
      let time = NaiveDateTime::parse_from_str(&raw, MINUTES_FORMAT)
        .with_context(|| format!("invalid alarm time {raw:?}"))?;
      Mutation::AddAlarm(NewAlarm {
        name: rest(tail, "alarm name")?,
        time,
        repeat: false,
      })
      .into()
    }
    ("alarm", ["rm", id]) => Mutation::DeleteAlarm(id.to_string()).into(),
    ("alarm", ["on", id]) => {
      Mutation::ToggleAlarm { id: id.to_string(), enabled: true }.into()
    }
    ("alarm", ["off", id]) => {
      Mutation::ToggleAlarm { id: id.to_string(), enabled: false }.into()
    }

    _ => bail!("unrecognised command {line:?}; try `help`"),
  };
  Ok(Some(input))
}
