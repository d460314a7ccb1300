//! Client tests: the REST client against an axum mock, and the engine against
//! a scripted channel and backend under paused time.

use std::{
  future::Future,
  sync::{
    Arc, Mutex,
    atomic::{AtomicBool, AtomicUsize, Ordering},
  },
  time::Duration,
};

use axum::{
  Json, Router,
  extract::State,
  http::StatusCode,
  routing::{get, post},
};
use chrono::Utc;
use nari_core::{
  ChangeEvent, Snapshot,
  entity::{Alarm, AlarmState, Task},
  supervisor::{
    BackoffStrategy, ConnectionState, ReconnectPolicy, SupervisorConfig,
  },
  timer::CountdownPhase,
};
use serde_json::{Value, json};
use tokio::{
  sync::{Notify, broadcast, mpsc},
  time::{self, Instant},
};

use crate::{
  ApiClient, Backend, Command, Engine, Error, EventChannel, Mutation, Notice,
  RawEvent, Result, TimerCommand,
  api::NewTask,
};

/// Serve `router` on an ephemeral local port. Returns the base URL.
pub(crate) async fn serve(router: Router) -> String {
  let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
  let addr = listener.local_addr().unwrap();
  tokio::spawn(async move { axum::serve(listener, router).await.unwrap() });
  format!("http://{addr}")
}

// ─── ApiClient ───────────────────────────────────────────────────────────────

async fn client_for(router: Router) -> ApiClient {
  let base = serve(router).await;
  ApiClient::with_timeout(&base, Duration::from_secs(5)).unwrap()
}

#[tokio::test]
async fn snapshot_keeps_the_collections_that_loaded() {
  let router = Router::new()
    .route("/api/subjects", get(|| async { Json(json!(["Math", "Physics"])) }))
    .route(
      "/api/tasks",
      get(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "boom") }),
    )
    .route(
      "/api/clock/alarms",
      get(|| async {
        Json(json!([{ "id": "a", "name": "Wake", "time": "2025-03-14 07:30" }]))
      }),
    )
    .route("/api/study/status", get(|| async { Json(Value::Null) }));
  let client = client_for(router).await;

  let snapshot = client.fetch_snapshot().await;
  assert_eq!(snapshot.subjects, vec!["Math", "Physics"]);
  assert!(snapshot.tasks.is_empty());
  assert!(snapshot.notes.is_empty());
  assert_eq!(snapshot.alarms.len(), 1);
  assert_eq!(snapshot.alarms[0].trigger, AlarmState::Scheduled);
  assert!(snapshot.study.is_none());
}

#[tokio::test]
async fn dismiss_posts_the_alarm_id() {
  let seen: Arc<Mutex<Vec<Value>>> = Arc::default();
  let router = Router::new()
    .route(
      "/api/clock/alarms/dismiss",
      post(
        |State(seen): State<Arc<Mutex<Vec<Value>>>>, Json(body): Json<Value>| async move {
          seen.lock().unwrap().push(body);
          Json(json!({ "success": true }))
        },
      ),
    )
    .with_state(seen.clone());
  let client = client_for(router).await;

  client.dismiss_alarm("a1").await.unwrap();
  assert_eq!(*seen.lock().unwrap(), vec![json!({ "id": "a1" })]);
}

#[tokio::test]
async fn created_task_is_returned() {
  let router = Router::new().route(
    "/api/tasks",
    post(|Json(body): Json<Value>| async move {
      (
        StatusCode::CREATED,
        Json(json!({ "id": 3, "title": body["title"], "priority": body["priority"] })),
      )
    }),
  );
  let client = client_for(router).await;

  let task = client
    .create_task(&NewTask {
      title:    "Revise".into(),
      priority: Default::default(),
      due:      None,
    })
    .await
    .unwrap();
  assert_eq!(task.id, 3);
  assert_eq!(task.title, "Revise");
}

#[tokio::test]
async fn rejected_request_reports_status() {
  let router = Router::new().route(
    "/api/study/start",
    post(|| async {
      (StatusCode::CONFLICT, Json(json!({ "error": "session already running" })))
    }),
  );
  let client = client_for(router).await;

  let err = client.start_study("Math").await.unwrap_err();
  assert!(matches!(
    err,
    Error::Status { status, ref path, .. }
      if status == StatusCode::CONFLICT && path == "/api/study/start"
  ));
}

// ─── Engine fakes ────────────────────────────────────────────────────────────

#[derive(Clone, Default)]
struct FakeBackend {
  snapshot:   Arc<Mutex<Snapshot>>,
  fetches:    Arc<AtomicUsize>,
  dismissals: Arc<Mutex<Vec<String>>>,
  mutations:  Arc<Mutex<Vec<Mutation>>>,
  /// Holds the first fetch until notified. Its snapshot is still the one
  /// the server had when the request arrived.
  hold_first: Option<Arc<Notify>>,
}

impl FakeBackend {
  fn with_alarms(alarms: Vec<Alarm>) -> Self {
    let backend = Self::default();
    backend.snapshot.lock().unwrap().alarms = alarms;
    backend
  }

  fn with_slow_first_fetch(tasks: Vec<Task>) -> (Self, Arc<Notify>) {
    let gate = Arc::new(Notify::new());
    let backend = Self { hold_first: Some(gate.clone()), ..Self::default() };
    backend.snapshot.lock().unwrap().tasks = tasks;
    (backend, gate)
  }

  fn fetches(&self) -> usize { self.fetches.load(Ordering::SeqCst) }
}

impl Backend for FakeBackend {
  fn fetch_snapshot(&self) -> impl Future<Output = Snapshot> + Send + '_ {
    async move {
      let n = self.fetches.fetch_add(1, Ordering::SeqCst);
      let snapshot = self.snapshot.lock().unwrap().clone();
      if n == 0
        && let Some(gate) = &self.hold_first
      {
        gate.notified().await;
      }
      snapshot
    }
  }

  fn dismiss_alarm<'a>(
    &'a self,
    id: &'a str,
  ) -> impl Future<Output = Result<()>> + Send + 'a {
    async move {
      self.dismissals.lock().unwrap().push(id.to_string());
      Ok(())
    }
  }

  fn mutate(
    &self,
    mutation: Mutation,
  ) -> impl Future<Output = Result<Option<ChangeEvent>>> + Send + '_ {
    async move {
      self.mutations.lock().unwrap().push(mutation.clone());
      Ok(match mutation {
        Mutation::AddTask(new) => Some(ChangeEvent::TaskAdded(task(9, &new.title))),
        _ => None,
      })
    }
  }
}

/// A channel whose events come from the test. Sending `None` drops the
/// connection; `up` decides whether the next connect succeeds.
struct FakeChannel {
  up:     Arc<AtomicBool>,
  events: mpsc::UnboundedReceiver<Option<RawEvent>>,
}

struct Script {
  up:     Arc<AtomicBool>,
  events: mpsc::UnboundedSender<Option<RawEvent>>,
}

impl Script {
  fn push(&self, name: &str, payload: Value) {
    self.events.send(Some(RawEvent::new(name, payload))).unwrap();
  }

  fn drop_connection(&self) { self.events.send(None).unwrap(); }

  fn set_up(&self, up: bool) { self.up.store(up, Ordering::SeqCst); }
}

fn fake_channel() -> (FakeChannel, Script) {
  let up = Arc::new(AtomicBool::new(true));
  let (tx, rx) = mpsc::unbounded_channel();
  (FakeChannel { up: up.clone(), events: rx }, Script { up, events: tx })
}

impl EventChannel for FakeChannel {
  fn connect(&mut self) -> impl Future<Output = Result<()>> + Send + '_ {
    let up = self.up.load(Ordering::SeqCst);
    async move {
      if up { Ok(()) } else { Err(Error::Protocol("backend unreachable".into())) }
    }
  }

  fn next_event(&mut self) -> impl Future<Output = Result<RawEvent>> + Send + '_ {
    async move {
      match self.events.recv().await {
        Some(Some(event)) => Ok(event),
        Some(None) => Err(Error::ChannelClosed),
        None => std::future::pending().await,
      }
    }
  }

  fn close(&mut self) -> impl Future<Output = ()> + Send + '_ { async {} }
}

fn config(retry_every: u64) -> SupervisorConfig {
  SupervisorConfig {
    stale_after: Duration::from_secs(30),
    reconnect:   ReconnectPolicy {
      strategy:      BackoffStrategy::Fixed,
      initial_delay: Duration::from_secs(retry_every),
      max_delay:     Duration::from_secs(60),
      max_attempts:  10,
    },
  }
}

async fn until(notices: &mut broadcast::Receiver<Notice>, want: Notice) {
  loop {
    match notices.recv().await {
      Ok(notice) if notice == want => return,
      Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => {}
      Err(broadcast::error::RecvError::Closed) => panic!("engine stopped"),
    }
  }
}

fn drain(notices: &mut broadcast::Receiver<Notice>) -> Vec<Notice> {
  let mut out = Vec::new();
  while let Ok(notice) = notices.try_recv() {
    out.push(notice);
  }
  out
}

// ─── Engine ──────────────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn outage_turns_stale_then_resyncs_on_reconnect() {
  let backend = FakeBackend::default();
  let (channel, script) = fake_channel();
  let engine = Engine::spawn(backend.clone(), channel, config(7));
  let mut notices = engine.notices();
  let mut connection = engine.connection();

  connection
    .wait_for(|s| s.state == ConnectionState::Connected)
    .await
    .unwrap();
  until(&mut notices, Notice::Synced { resync: false }).await;
  assert_eq!(backend.fetches(), 1);

  let t0 = Instant::now();
  script.set_up(false);
  script.drop_connection();

  time::sleep_until(t0 + Duration::from_secs(29)).await;
  assert_eq!(connection.borrow().state, ConnectionState::Disconnected);

  time::sleep_until(t0 + Duration::from_secs(31)).await;
  assert_eq!(connection.borrow().state, ConnectionState::Stale);

  // Retries land every 7s; the one at T0+35 finds the backend back.
  script.set_up(true);
  time::sleep_until(t0 + Duration::from_secs(36)).await;
  let status = *connection.borrow();
  assert_eq!(status.state, ConnectionState::Connected);
  assert_eq!(status.disconnected_since, None);
  assert_eq!(backend.fetches(), 2);
  assert!(drain(&mut notices).contains(&Notice::Synced { resync: true }));

  engine.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn reconnect_during_a_slow_fetch_fetches_again() {
  let (backend, gate) = FakeBackend::with_slow_first_fetch(Vec::new());
  let (channel, script) = fake_channel();
  let engine = Engine::spawn(backend.clone(), channel, config(1));
  let mut connection = engine.connection();
  let mut state = engine.state();

  connection
    .wait_for(|s| s.state == ConnectionState::Connected)
    .await
    .unwrap();
  time::sleep(Duration::from_millis(50)).await;
  assert_eq!(backend.fetches(), 1);

  script.drop_connection();
  connection
    .wait_for(|s| s.state == ConnectionState::Disconnected)
    .await
    .unwrap();
  // Created on the server while we were offline.
  backend.snapshot.lock().unwrap().tasks = vec![task(1, "Missed")];
  connection
    .wait_for(|s| s.state == ConnectionState::Connected)
    .await
    .unwrap();

  state.wait_for(|s| s.tasks.len() == 1).await.unwrap();
  assert_eq!(backend.fetches(), 2);

  // The first fetch finally answers with what the server had before the
  // outage; it must not wipe the fresher state.
  gate.notify_one();
  time::sleep(Duration::from_secs(5)).await;
  assert_eq!(backend.fetches(), 2);
  assert_eq!(engine.state().borrow().tasks, vec![task(1, "Missed")]);

  engine.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn changes_racing_the_fetch_survive_bootstrap() {
  let (backend, gate) =
    FakeBackend::with_slow_first_fetch(vec![task(1, "Old"), task(2, "Kept")]);
  let (channel, script) = fake_channel();
  let engine = Engine::spawn(backend.clone(), channel, config(1));
  let mut notices = engine.notices();
  let mut state = engine.state();

  engine
    .connection()
    .wait_for(|s| s.state == ConnectionState::Connected)
    .await
    .unwrap();
  script.push("task_deleted", json!({ "id": 1 }));
  script.push("task_added", json!({ "id": 3, "title": "New" }));
  state.wait_for(|s| s.task(3).is_some()).await.unwrap();

  // The snapshot was read before both changes.
  gate.notify_one();
  until(&mut notices, Notice::Synced { resync: false }).await;

  let state = engine.state().borrow().clone();
  let ids: Vec<u64> = state.tasks.iter().map(|t| t.id).collect();
  assert_eq!(ids, vec![3, 2]);
  assert_eq!(backend.fetches(), 1);

  engine.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn bad_channel_events_change_nothing() {
  let backend = FakeBackend::default();
  let (channel, script) = fake_channel();
  let engine = Engine::spawn(backend.clone(), channel, config(1));
  let mut notices = engine.notices();
  let mut state = engine.state();
  until(&mut notices, Notice::Synced { resync: false }).await;
  let before = state.borrow().clone();

  script.push("task_deleted", json!({ "title": "no id" }));
  script.push("task_archived", json!({ "id": 1 }));
  script.push("alarm_triggered", json!({ "id": "a" }));
  // A good event afterwards shows the bad ones were already handled.
  script.push("task_added", json!({ "id": 4, "title": "After" }));
  state.wait_for(|s| s.task(4).is_some()).await.unwrap();

  let after = state.borrow().clone();
  assert_eq!(after.tasks, vec![task(4, "After")]);
  assert_eq!(after.alarms, before.alarms);
  assert_eq!(after.activity.len(), before.activity.len() + 1);
  assert!(engine.presented_alarm().borrow().is_none());
  assert_eq!(engine.connection().borrow().state, ConnectionState::Connected);

  engine.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn rest_response_and_channel_echo_apply_once() {
  let backend = FakeBackend::default();
  let (channel, script) = fake_channel();
  let engine = Engine::spawn(backend.clone(), channel, config(1));
  let mut notices = engine.notices();
  let mut state = engine.state();
  until(&mut notices, Notice::Synced { resync: false }).await;

  engine
    .mutate(Mutation::AddTask(NewTask {
      title:    "Read".into(),
      priority: Default::default(),
      due:      None,
    }))
    .await
    .unwrap();
  state.wait_for(|s| s.tasks.len() == 1).await.unwrap();

  script.push("task_added", json!({ "id": 9, "title": "Read" }));
  time::sleep(Duration::from_millis(50)).await;

  let state = engine.state().borrow().clone();
  assert_eq!(state.tasks, vec![task(9, "Read")]);
  let added = state
    .activity
    .iter()
    .filter(|e| e.text.starts_with("Task added"))
    .count();
  assert_eq!(added, 1);

  engine.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn alarms_are_presented_in_turn() {
  let backend = FakeBackend::with_alarms(vec![alarm("a"), alarm("b")]);
  let (channel, script) = fake_channel();
  let engine = Engine::spawn(backend.clone(), channel, config(1));
  let mut notices = engine.notices();
  let mut presented = engine.presented_alarm();
  until(&mut notices, Notice::Synced { resync: false }).await;

  script.push("alarm_triggered", alarm_json("a"));
  script.push("alarm_triggered", alarm_json("b"));
  presented
    .wait_for(|a| a.as_ref().is_some_and(|a| a.id == "a"))
    .await
    .unwrap();
  time::sleep(Duration::from_millis(50)).await;
  assert_eq!(presented.borrow().as_ref().map(|a| a.id.clone()), Some("a".into()));

  engine.dismiss().await.unwrap();
  presented
    .wait_for(|a| a.as_ref().is_some_and(|a| a.id == "b"))
    .await
    .unwrap();
  time::sleep(Duration::from_millis(50)).await;
  assert_eq!(*backend.dismissals.lock().unwrap(), vec!["a".to_string()]);

  let state = engine.state().borrow().clone();
  assert_eq!(state.alarm("a").unwrap().trigger, AlarmState::Dismissed);
  assert_eq!(state.alarm("b").unwrap().trigger, AlarmState::Triggered);

  // The backend's broadcast of our own dismissal changes nothing.
  script.push("alarm_dismissed", json!({ "id": "a" }));
  time::sleep(Duration::from_millis(50)).await;
  assert_eq!(presented.borrow().as_ref().map(|a| a.id.clone()), Some("b".into()));

  engine.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn snooze_creates_a_follow_up_alarm() {
  let backend = FakeBackend::with_alarms(vec![alarm("a")]);
  let (channel, script) = fake_channel();
  let engine = Engine::spawn(backend.clone(), channel, config(1));
  let mut notices = engine.notices();
  let mut presented = engine.presented_alarm();
  until(&mut notices, Notice::Synced { resync: false }).await;

  script.push("alarm_triggered", alarm_json("a"));
  presented.wait_for(Option::is_some).await.unwrap();
  engine.snooze().await.unwrap();
  presented.wait_for(Option::is_none).await.unwrap();
  time::sleep(Duration::from_millis(50)).await;

  let mutations = backend.mutations.lock().unwrap().clone();
  assert!(matches!(
    mutations.as_slice(),
    [Mutation::AddAlarm(new)] if new.name == "A (Snoozed)" && !new.repeat
  ));
  assert!(backend.dismissals.lock().unwrap().is_empty());
  let state = engine.state().borrow().clone();
  assert_eq!(state.alarm("a").unwrap().trigger, AlarmState::Snoozed);

  engine.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn countdown_finishes_once() {
  let (channel, _script) = fake_channel();
  let engine = Engine::spawn(FakeBackend::default(), channel, config(1));
  let mut notices = engine.notices();

  engine
    .send(Command::SetCountdown { minutes: 0, seconds: 3 })
    .await
    .unwrap();
  engine.send(Command::Countdown(TimerCommand::Start)).await.unwrap();
  until(&mut notices, Notice::CountdownFinished).await;

  time::sleep(Duration::from_secs(5)).await;
  assert!(!drain(&mut notices).contains(&Notice::CountdownFinished));
  let clocks = engine.clocks().borrow().clone();
  assert_eq!(clocks.countdown.phase(), CountdownPhase::Finished);
  assert!(clocks.countdown.remaining().is_zero());

  engine.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn stopwatch_holds_its_value_while_paused() {
  let (channel, _script) = fake_channel();
  let engine = Engine::spawn(FakeBackend::default(), channel, config(1));

  engine.send(Command::Stopwatch(TimerCommand::Start)).await.unwrap();
  time::sleep(Duration::from_millis(1500)).await;
  engine.send(Command::Stopwatch(TimerCommand::Pause)).await.unwrap();
  time::sleep(Duration::from_millis(10)).await;

  let paused = engine.clocks().borrow().stopwatch;
  assert!(paused >= Duration::from_millis(1490));
  time::sleep(Duration::from_secs(3)).await;
  let clocks = engine.clocks().borrow().clone();
  assert_eq!(clocks.stopwatch, paused);
  assert!(!clocks.stopwatch_running);

  engine.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn study_clock_follows_the_session() {
  let (channel, script) = fake_channel();
  let engine = Engine::spawn(FakeBackend::default(), channel, config(1));
  let mut notices = engine.notices();
  let mut clocks = engine.clocks();
  until(&mut notices, Notice::Synced { resync: false }).await;

  let start = Utc::now() - chrono::Duration::seconds(65);
  script.push(
    "study_started",
    json!({ "subject": "Physics", "start": start.to_rfc3339() }),
  );
  clocks
    .wait_for(|c| c.study >= Duration::from_secs(65))
    .await
    .unwrap();
  assert!(clocks.borrow().study_display().starts_with("1m "));

  script.push("study_stopped", json!({ "subject": "Physics" }));
  clocks.wait_for(|c| c.study.is_zero()).await.unwrap();

  engine.shutdown().await;
}

// ─── Fixtures ────────────────────────────────────────────────────────────────

fn task(id: u64, title: &str) -> Task {
  serde_json::from_value(json!({ "id": id, "title": title })).unwrap()
}

fn alarm_json(id: &str) -> Value {
  json!({
    "id": id,
    "name": id.to_uppercase(),
    "time": "2025-03-14 07:30",
    "repeat": false,
    "enabled": true,
  })
}

fn alarm(id: &str) -> Alarm { serde_json::from_value(alarm_json(id)).unwrap() }
