//! The engine: one tokio task that owns the dashboard state and everything
//! that changes it.
//!
//! The loop takes one input at a time from the UI commands, the transport
//! signals, the tick schedulers, the backend replies, and the retry and
//! staleness deadlines. Nothing it owns is shared, so nothing is locked. All
//! I/O runs in spawned tasks that report back on a channel, which keeps the
//! loop responsive while a request is in flight.
//!
//! State leaves the engine through `watch` channels (dashboard, connection,
//! clocks, presented alarm) and a `broadcast` channel of one-shot
//! [`Notice`]s.

use std::time::Duration;

use chrono::{Local, Utc};
use nari_core::{
  ChangeEvent, DashboardState, Snapshot, SyncStore,
  alarm::AlarmScheduler,
  arena::TimerArena,
  entity::{Alarm, AlarmId, AlarmState, StudySession},
  reconcile::Effect,
  supervisor::{
    ConnectionStatus, ConnectionSupervisor, Retry, SupervisorConfig,
  },
  timer::{self, Countdown, CountdownTick, Domain, StudyClock, Stopwatch},
};
use tokio::{
  sync::{broadcast, mpsc, watch},
  task::JoinHandle,
  time::{self, Instant},
};
use tracing::{debug, info, trace, warn};

use crate::{
  Error, Result,
  backend::{Backend, Mutation},
  channel::{EventChannel, RawEvent},
  ticker::{self, Tick, Ticker},
  transport::{Signal, Transport},
};

// ─── Public types ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerCommand {
  Start,
  Pause,
  Reset,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
  /// Acknowledge the presented alarm.
  Dismiss,
  /// Dismiss the presented alarm and schedule a copy five minutes out.
  Snooze,
  /// Reconnect now, resetting the attempt counter.
  Retry,
  SetCountdown { minutes: u32, seconds: u32 },
  Countdown(TimerCommand),
  Stopwatch(TimerCommand),
  Mutate(Mutation),
  Shutdown,
}

/// One-shot happenings, for surfaces that react rather than render.
#[derive(Debug, Clone, PartialEq)]
pub enum Notice {
  /// A snapshot was bootstrapped; `resync` after an interruption.
  Synced { resync: bool },
  AlarmPresented(Alarm),
  CountdownFinished,
}

/// Current value of every timer display.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Clocks {
  pub study:             Duration,
  pub countdown:         Countdown,
  pub stopwatch:         Duration,
  pub stopwatch_running: bool,
  /// `HH:MM:SS`, local time.
  pub wall:              String,
}

impl Clocks {
  pub fn study_display(&self) -> String { timer::format_elapsed(self.study) }

  pub fn stopwatch_display(&self) -> String {
    timer::format_stopwatch(self.stopwatch)
  }
}

// ─── Handle ──────────────────────────────────────────────────────────────────

/// Talks to a running engine. Dropping the handle stops the engine.
#[derive(Debug)]
pub struct EngineHandle {
  commands:   mpsc::Sender<Command>,
  state:      watch::Receiver<DashboardState>,
  connection: watch::Receiver<ConnectionStatus>,
  clocks:     watch::Receiver<Clocks>,
  alarm:      watch::Receiver<Option<Alarm>>,
  notices:    broadcast::Sender<Notice>,
  task:       JoinHandle<()>,
}

impl EngineHandle {
  pub async fn send(&self, command: Command) -> Result<()> {
    self
      .commands
      .send(command)
      .await
      .map_err(|_| Error::ChannelClosed)
  }

  pub async fn dismiss(&self) -> Result<()> { self.send(Command::Dismiss).await }

  pub async fn snooze(&self) -> Result<()> { self.send(Command::Snooze).await }

  pub async fn retry(&self) -> Result<()> { self.send(Command::Retry).await }

  pub async fn mutate(&self, mutation: Mutation) -> Result<()> {
    self.send(Command::Mutate(mutation)).await
  }

  pub fn state(&self) -> watch::Receiver<DashboardState> { self.state.clone() }

  pub fn connection(&self) -> watch::Receiver<ConnectionStatus> {
    self.connection.clone()
  }

  pub fn clocks(&self) -> watch::Receiver<Clocks> { self.clocks.clone() }

  pub fn presented_alarm(&self) -> watch::Receiver<Option<Alarm>> {
    self.alarm.clone()
  }

  pub fn notices(&self) -> broadcast::Receiver<Notice> {
    self.notices.subscribe()
  }

  /// Stop the engine: close the channel, cancel every timer, and wait.
  pub async fn shutdown(self) {
    let _ = self.commands.send(Command::Shutdown).await;
    if let Err(error) = self.task.await {
      warn!(%error, "engine task panicked");
    }
  }
}

// ─── Engine ──────────────────────────────────────────────────────────────────

/// Results of spawned backend calls.
#[derive(Debug)]
enum Reply {
  Snapshot { fetch: u64, snapshot: Snapshot },
  Mutated(Result<Option<ChangeEvent>>),
  Acked { id: AlarmId, result: Result<()> },
}

pub struct Engine<B: Backend> {
  backend:    B,
  store:      SyncStore,
  supervisor: ConnectionSupervisor,
  scheduler:  AlarmScheduler,
  arena:      TimerArena<Ticker>,
  study:      StudyClock,
  session:    Option<StudySession>,
  countdown:  Countdown,
  stopwatch:  Stopwatch,
  wall:       String,

  transport:  Transport,
  signals:    mpsc::Receiver<Signal>,
  commands:   mpsc::Receiver<Command>,
  ticks_tx:   mpsc::Sender<Tick>,
  ticks:      mpsc::Receiver<Tick>,
  replies_tx: mpsc::Sender<Reply>,
  replies:    mpsc::Receiver<Reply>,

  retry_at:   Option<Instant>,
  synced:     bool,
  /// Number of the latest snapshot fetch; replies from older ones are dropped.
  fetch:      u64,
  /// Events seen while a snapshot fetch is in flight, replayed on top of it.
  replay:     Option<Vec<ChangeEvent>>,

  connection: watch::Sender<ConnectionStatus>,
  clocks:     watch::Sender<Clocks>,
  alarm:      watch::Sender<Option<Alarm>>,
  notices:    broadcast::Sender<Notice>,
}

/// The supervisor works in `std` instants; take them from tokio's clock so
/// paused-time tests see the same time as the timers.
fn now() -> std::time::Instant { Instant::now().into_std() }

async fn sleep_until(deadline: Option<Instant>) {
  match deadline {
    Some(deadline) => time::sleep_until(deadline).await,
    None => std::future::pending().await,
  }
}

impl<B: Backend> Engine<B> {
  /// Start an engine on the current runtime. It bootstraps from `backend`,
  /// opens `channel`, and runs until [`EngineHandle::shutdown`].
  pub fn spawn<C: EventChannel>(
    backend: B,
    channel: C,
    config: SupervisorConfig,
  ) -> EngineHandle {
    let (command_tx, commands) = mpsc::channel(32);
    let (ticks_tx, ticks) = mpsc::channel(64);
    let (replies_tx, replies) = mpsc::channel(16);
    let (transport, signals) = Transport::spawn(channel);

    let (state_tx, state_rx) = watch::channel(DashboardState::default());
    let (connection, connection_rx) = watch::channel(ConnectionStatus::default());
    let (clocks, clocks_rx) = watch::channel(Clocks::default());
    let (alarm, alarm_rx) = watch::channel(None);
    let (notices, _) = broadcast::channel(32);

    let mut store = SyncStore::new();
    store.subscribe(move |state| {
      state_tx.send_replace(state.clone());
    });

    let engine = Engine {
      backend,
      store,
      supervisor: ConnectionSupervisor::new(config),
      scheduler: AlarmScheduler::new(),
      arena: TimerArena::new(),
      study: StudyClock::default(),
      session: None,
      countdown: Countdown::new(),
      stopwatch: Stopwatch::new(),
      wall: String::new(),
      transport,
      signals,
      commands,
      ticks_tx,
      ticks,
      replies_tx,
      replies,
      retry_at: None,
      synced: false,
      fetch: 0,
      replay: None,
      connection,
      clocks,
      alarm,
      notices: notices.clone(),
    };
    let task = tokio::spawn(engine.run());

    EngineHandle {
      commands: command_tx,
      state: state_rx,
      connection: connection_rx,
      clocks: clocks_rx,
      alarm: alarm_rx,
      notices,
      task,
    }
  }

  async fn run(mut self) {
    self.supervisor.init(now());
    self.publish_connection();
    self.request_snapshot();
    self.connect();
    self.start_timer(Domain::WallClock);
    self.refresh_wall_clock();
    self.publish_clocks();

    loop {
      let retry_at = self.retry_at;
      let stale_at = self.supervisor.stale_deadline().map(Instant::from_std);

      tokio::select! {
        command = self.commands.recv() => match command {
          Some(Command::Shutdown) | None => break,
          Some(command) => self.on_command(command),
        },
        Some(signal) = self.signals.recv() => self.on_signal(signal),
        Some(tick) = self.ticks.recv() => self.on_tick(tick),
        Some(reply) = self.replies.recv() => self.on_reply(reply),
        _ = sleep_until(retry_at) => {
          self.retry_at = None;
          self.connect();
        }
        _ = sleep_until(stale_at) => {
          if self.supervisor.poll_staleness(now()) {
            self.publish_connection();
          }
        }
      }
    }

    self.shutdown().await;
  }

  async fn shutdown(mut self) {
    info!("engine shutting down");
    self.supervisor.shutdown(now());
    self.retry_at = None;
    self.arena.shutdown();
    self.publish_connection();
    self.transport.shutdown().await;
  }

  // ── Connection ────────────────────────────────────────────────────────────

  fn connect(&mut self) {
    if self.supervisor.begin_connect() {
      debug!(attempt = self.supervisor.status().attempts, "connecting");
      self.transport.connect();
      self.publish_connection();
    }
  }

  fn schedule(&mut self, retry: Retry) {
    self.retry_at = match retry {
      Retry::After(delay) => Some(Instant::now() + delay),
      Retry::GiveUp => None,
    };
    self.publish_connection();
  }

  fn on_signal(&mut self, signal: Signal) {
    match signal {
      Signal::Connected => {
        let outcome = self.supervisor.connected();
        self.retry_at = None;
        self.publish_connection();
        if outcome.resync {
          self.request_snapshot();
        }
      }
      Signal::ConnectFailed(reason) => {
        debug!(%reason, "connect failed");
        let retry = self.supervisor.connect_failed(now());
        self.schedule(retry);
      }
      Signal::Lost(reason) => {
        debug!(%reason, "transport lost");
        let retry = self.supervisor.transport_lost(now());
        self.schedule(retry);
      }
      Signal::Event(raw) => self.on_raw_event(raw),
    }
  }

  fn publish_connection(&self) {
    self.connection.send_replace(self.supervisor.status());
  }

  // ── State ─────────────────────────────────────────────────────────────────

  /// Start a snapshot fetch. One already in flight was read before whatever
  /// prompted this call, so it is superseded rather than waited on.
  fn request_snapshot(&mut self) {
    if self.replay.is_some() {
      debug!(fetch = self.fetch, "superseding in-flight snapshot fetch");
    }
    self.fetch += 1;
    self.replay = Some(Vec::new());
    let fetch = self.fetch;
    let backend = self.backend.clone();
    let replies = self.replies_tx.clone();
    tokio::spawn(async move {
      let snapshot = backend.fetch_snapshot().await;
      let _ = replies.send(Reply::Snapshot { fetch, snapshot }).await;
    });
  }

  fn on_raw_event(&mut self, raw: RawEvent) {
    match ChangeEvent::decode(&raw.name, raw.payload) {
      Ok(event) => {
        if let Some(replay) = self.replay.as_mut() {
          replay.push(event.clone());
        }
        self.apply(event);
      }
      Err(error) => warn!(event = %raw.name, %error, "dropping event"),
    }
  }

  fn apply(&mut self, event: ChangeEvent) {
    let applied = self.store.apply(event, Utc::now());
    if let Some(effect) = applied.effect {
      self.on_effect(effect);
    }
  }

  fn bootstrap(&mut self, snapshot: Snapshot) {
    let resync = self.synced;
    self.synced = true;
    self.store.bootstrap(snapshot);

    // Events that raced the fetch; already-reflected ones are no-ops.
    for event in self.replay.take().unwrap_or_default() {
      self.apply(event);
    }

    let session = self.store.snapshot().study.clone();
    self.sync_study(session);
    let _ = self.notices.send(Notice::Synced { resync });
  }

  fn on_effect(&mut self, effect: Effect) {
    match effect {
      Effect::StudyRestarted(session) => self.sync_study(Some(session)),
      Effect::StudyStopped => self.sync_study(None),
      Effect::PresentAlarm(alarm) => {
        self.scheduler.enqueue(alarm);
        self.publish_alarm();
      }
      Effect::WithdrawAlarm(id) => {
        if self.scheduler.withdraw(&id) {
          self.publish_alarm();
        }
      }
    }
  }

  fn on_reply(&mut self, reply: Reply) {
    match reply {
      Reply::Snapshot { fetch, snapshot } if fetch == self.fetch => {
        self.bootstrap(snapshot);
      }
      Reply::Snapshot { fetch, .. } => {
        debug!(fetch, latest = self.fetch, "dropping superseded snapshot");
      }
      Reply::Mutated(Ok(Some(event))) => {
        if let Some(replay) = self.replay.as_mut() {
          replay.push(event.clone());
        }
        self.apply(event);
      }
      Reply::Mutated(Ok(None)) => {}
      Reply::Mutated(Err(error)) => warn!(%error, "mutation failed"),
      Reply::Acked { id, result: Err(error) } => {
        warn!(alarm = %id, %error, "alarm acknowledgement failed");
      }
      Reply::Acked { .. } => {}
    }
  }

  // ── Alarms ────────────────────────────────────────────────────────────────

  fn publish_alarm(&mut self) {
    let current = self.scheduler.current().cloned();
    let changed = self.alarm.send_if_modified(|shown| {
      let same = shown.as_ref().map(|a| &a.id) == current.as_ref().map(|a| &a.id);
      if !same {
        shown.clone_from(&current);
      }
      !same
    });
    if changed && let Some(alarm) = current {
      info!(alarm = %alarm.id, name = %alarm.name, "alarm presented");
      let _ = self.notices.send(Notice::AlarmPresented(alarm));
    }
  }

  fn mark_alarm(&mut self, id: &str, to: AlarmState) {
    if let Err(error) = self.store.set_alarm_state(id, to) {
      debug!(alarm = %id, %error, "local alarm state unchanged");
    }
  }

  fn dismiss(&mut self) {
    let Some(resolution) = self.scheduler.dismiss() else {
      debug!("dismiss with no alarm presented");
      return;
    };
    let id = resolution.resolved.id;
    self.mark_alarm(&id, AlarmState::Dismissed);
    self.publish_alarm();

    let backend = self.backend.clone();
    let replies = self.replies_tx.clone();
    tokio::spawn(async move {
      let result = backend.dismiss_alarm(&id).await;
      let _ = replies.send(Reply::Acked { id, result }).await;
    });
  }

  fn snooze(&mut self) {
    let Some((resolution, request)) =
      self.scheduler.snooze(Local::now().naive_local())
    else {
      debug!("snooze with no alarm presented");
      return;
    };
    self.mark_alarm(&resolution.resolved.id, AlarmState::Snoozed);
    self.publish_alarm();
    info!(name = %request.name, time = %request.time, "alarm snoozed");
    self.mutate(Mutation::AddAlarm(request));
  }

  fn mutate(&mut self, mutation: Mutation) {
    let backend = self.backend.clone();
    let replies = self.replies_tx.clone();
    tokio::spawn(async move {
      let result = backend.mutate(mutation).await;
      let _ = replies.send(Reply::Mutated(result)).await;
    });
  }

  // ── Timers ────────────────────────────────────────────────────────────────

  fn start_timer(&mut self, domain: Domain) {
    let generation = self.arena.next_generation();
    let handle = ticker::spawn(domain, generation, self.ticks_tx.clone());
    self.arena.start(domain, generation, handle);
  }

  fn sync_study(&mut self, session: Option<StudySession>) {
    if self.session == session {
      return;
    }
    match &session {
      Some(s) => {
        info!(subject = %s.subject, start = %s.start, "study clock started");
        self.study.restart(s.start);
        self.study.tick(Utc::now());
        self.start_timer(Domain::Study);
      }
      None => {
        info!("study clock stopped");
        self.study.stop();
        self.arena.stop(Domain::Study);
      }
    }
    self.session = session;
    self.publish_clocks();
  }

  fn refresh_wall_clock(&mut self) {
    self.wall = timer::format_wall_clock(&Local::now());
  }

  fn on_tick(&mut self, tick: Tick) {
    if !self.arena.is_current(tick.domain, tick.generation) {
      trace!(domain = %tick.domain, "stale tick ignored");
      return;
    }
    match tick.domain {
      Domain::Study => {
        self.study.tick(Utc::now());
      }
      Domain::Countdown => match self.countdown.tick() {
        CountdownTick::Completed => {
          self.arena.stop(Domain::Countdown);
          info!("countdown finished");
          let _ = self.notices.send(Notice::CountdownFinished);
        }
        CountdownTick::Running(_) => {}
        CountdownTick::Ignored => {
          self.arena.stop(Domain::Countdown);
        }
      },
      Domain::Stopwatch => {
        self.stopwatch.tick(now());
      }
      Domain::WallClock => self.refresh_wall_clock(),
    }
    self.publish_clocks();
  }

  fn publish_clocks(&self) {
    self.clocks.send_replace(Clocks {
      study:             self.study.value(),
      countdown:         self.countdown,
      stopwatch:         self.stopwatch.value(),
      stopwatch_running: self.stopwatch.is_running(),
      wall:              self.wall.clone(),
    });
  }

  // ── Commands ──────────────────────────────────────────────────────────────

  fn on_command(&mut self, command: Command) {
    match command {
      Command::Dismiss => self.dismiss(),
      Command::Snooze => self.snooze(),
      Command::Retry => {
        if self.supervisor.retrigger() {
          self.retry_at = None;
          self.connect();
        }
      }
      Command::SetCountdown { minutes, seconds } => {
        if let Err(error) = self.countdown.set(minutes, seconds) {
          warn!(%error, "countdown not set");
        }
      }
      Command::Countdown(TimerCommand::Start) => match self.countdown.start() {
        Ok(true) => self.start_timer(Domain::Countdown),
        Ok(false) => {}
        Err(error) => warn!(%error, "countdown not started"),
      },
      Command::Countdown(TimerCommand::Pause) => {
        if self.countdown.pause() {
          self.arena.stop(Domain::Countdown);
        }
      }
      Command::Countdown(TimerCommand::Reset) => {
        self.countdown.reset();
        self.arena.stop(Domain::Countdown);
      }
      Command::Stopwatch(TimerCommand::Start) => {
        if self.stopwatch.start(now()) {
          self.start_timer(Domain::Stopwatch);
        }
      }
      Command::Stopwatch(TimerCommand::Pause) => {
        if self.stopwatch.pause(now()) {
          self.arena.stop(Domain::Stopwatch);
        }
      }
      Command::Stopwatch(TimerCommand::Reset) => {
        self.stopwatch.reset();
        self.arena.stop(Domain::Stopwatch);
      }
      Command::Mutate(mutation) => self.mutate(mutation),
      Command::Shutdown => {}
    }
    self.publish_clocks();
  }
}
