//! Async HTTP client wrapping the Nari JSON API.

use std::time::Duration;

use nari_core::{
  Snapshot,
  alarm::NewAlarm,
  entity::{
    ActivityEntry, Alarm, Note, NoteId, Priority, StudySession,
    StudySummary, Task, TaskId, TaskStatus,
  },
  event::SubjectRef,
};
use reqwest::{Client, Method, Url};
use serde::{Deserialize, Serialize, de::DeserializeOwned, de::IgnoredAny};
use serde_json::{Value, json};
use tracing::{debug, warn};

use crate::{Error, Result, config::ClientConfig};

// ─── Request bodies ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewTask {
  pub title:    String,
  pub priority: Priority,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub due:      Option<String>,
}

/// Fields to change on a task. Absent fields are left alone by the backend.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TaskPatch {
  #[serde(skip_serializing_if = "Option::is_none")]
  pub title:    Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub priority: Option<Priority>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub due:      Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub status:   Option<TaskStatus>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewNote {
  pub title:   String,
  pub content: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct NotePatch {
  #[serde(skip_serializing_if = "Option::is_none")]
  pub title:   Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub content: Option<String>,
}

#[derive(Deserialize)]
struct Health {
  ok: bool,
}

// ─── Client ──────────────────────────────────────────────────────────────────

/// Async HTTP client for the Nari REST API.
///
/// Cheap to clone; the inner [`reqwest::Client`] is `Arc`-based.
#[derive(Debug, Clone)]
pub struct ApiClient {
  client: Client,
  base:   Url,
}

impl ApiClient {
  pub fn new(config: &ClientConfig) -> Result<Self> {
    Self::with_timeout(&config.base_url, config.request_timeout())
  }

  pub fn with_timeout(base_url: &str, timeout: Duration) -> Result<Self> {
    let base = Url::parse(base_url)
      .ok()
      .filter(|url| !url.cannot_be_a_base())
      .ok_or_else(|| Error::InvalidBaseUrl(base_url.to_string()))?;
    let client = Client::builder().timeout(timeout).build()?;
    Ok(Self { client, base })
  }

  /// The backend root this client talks to.
  pub fn base_url(&self) -> &Url { &self.base }

  /// `{base}/api/{segments...}`, percent-encoding each segment.
  fn url(&self, segments: &[&str]) -> Url {
    let mut url = self.base.clone();
    if let Ok(mut path) = url.path_segments_mut() {
      path.pop_if_empty().push("api").extend(segments);
    }
    url
  }

  async fn send<T: DeserializeOwned>(
    &self,
    method: Method,
    segments: &[&str],
    body: Option<Value>,
  ) -> Result<T> {
    let path = format!("/api/{}", segments.join("/"));
    debug!(%method, %path, "api request");

    let mut req = self.client.request(method.clone(), self.url(segments));
    if let Some(body) = body {
      req = req.json(&body);
    }
    let resp = req.send().await?;

    let status = resp.status();
    if !status.is_success() {
      return Err(Error::Status { method, path, status });
    }
    Ok(resp.json().await?)
  }

  async fn get<T: DeserializeOwned>(&self, segments: &[&str]) -> Result<T> {
    self.send(Method::GET, segments, None).await
  }

  async fn post<T: DeserializeOwned>(
    &self,
    segments: &[&str],
    body: Value,
  ) -> Result<T> {
    self.send(Method::POST, segments, Some(body)).await
  }

  async fn put<T: DeserializeOwned>(
    &self,
    segments: &[&str],
    body: Value,
  ) -> Result<T> {
    self.send(Method::PUT, segments, Some(body)).await
  }

  async fn delete(&self, segments: &[&str]) -> Result<()> {
    self
      .send::<IgnoredAny>(Method::DELETE, segments, None)
      .await
      .map(drop)
  }

  // ── Health ────────────────────────────────────────────────────────────────

  /// `GET /api/health`
  pub async fn health(&self) -> Result<bool> {
    Ok(self.get::<Health>(&["health"]).await?.ok)
  }

  // ── Subjects ──────────────────────────────────────────────────────────────

  /// `GET /api/subjects`
  pub async fn list_subjects(&self) -> Result<Vec<String>> {
    self.get(&["subjects"]).await
  }

  /// `POST /api/subjects`
  pub async fn add_subject(&self, name: &str) -> Result<SubjectRef> {
    self.post(&["subjects"], json!({ "name": name })).await
  }

  /// `DELETE /api/subjects/{name}`
  pub async fn remove_subject(&self, name: &str) -> Result<()> {
    self.delete(&["subjects", name]).await
  }

  // ── Tasks ─────────────────────────────────────────────────────────────────

  /// `GET /api/tasks`
  pub async fn list_tasks(&self) -> Result<Vec<Task>> {
    self.get(&["tasks"]).await
  }

  /// `POST /api/tasks`
  pub async fn create_task(&self, task: &NewTask) -> Result<Task> {
    self.post(&["tasks"], serde_json::to_value(task)?).await
  }

  /// `PUT /api/tasks/{id}`
  pub async fn update_task(&self, id: TaskId, patch: &TaskPatch) -> Result<Task> {
    let id = id.to_string();
    self.put(&["tasks", &id], serde_json::to_value(patch)?).await
  }

  /// `DELETE /api/tasks/{id}`
  pub async fn delete_task(&self, id: TaskId) -> Result<()> {
    self.delete(&["tasks", &id.to_string()]).await
  }

  // ── Notes ─────────────────────────────────────────────────────────────────

  /// `GET /api/notes`
  pub async fn list_notes(&self) -> Result<Vec<Note>> {
    self.get(&["notes"]).await
  }

  /// `POST /api/notes`
  pub async fn create_note(&self, note: &NewNote) -> Result<Note> {
    self.post(&["notes"], serde_json::to_value(note)?).await
  }

  /// `PUT /api/notes/{id}`
  pub async fn update_note(&self, id: NoteId, patch: &NotePatch) -> Result<Note> {
    let id = id.to_string();
    self.put(&["notes", &id], serde_json::to_value(patch)?).await
  }

  /// `DELETE /api/notes/{id}`
  pub async fn delete_note(&self, id: NoteId) -> Result<()> {
    self.delete(&["notes", &id.to_string()]).await
  }

  // ── Study ─────────────────────────────────────────────────────────────────

  /// `GET /api/study/status`. `None` when no session is running.
  pub async fn study_status(&self) -> Result<Option<StudySession>> {
    self.get(&["study", "status"]).await
  }

  /// `POST /api/study/start`
  pub async fn start_study(&self, subject: &str) -> Result<StudySession> {
    self.post(&["study", "start"], json!({ "subject": subject })).await
  }

  /// `POST /api/study/stop`
  pub async fn stop_study(&self, save: bool) -> Result<StudySummary> {
    self.post(&["study", "stop"], json!({ "save": save })).await
  }

  // ── Activity ──────────────────────────────────────────────────────────────

  /// `GET /api/activity`, newest first.
  pub async fn activity(&self) -> Result<Vec<ActivityEntry>> {
    self.get(&["activity"]).await
  }

  // ── Alarms ────────────────────────────────────────────────────────────────

  /// `GET /api/clock/alarms`
  pub async fn list_alarms(&self) -> Result<Vec<Alarm>> {
    self.get(&["clock", "alarms"]).await
  }

  /// `POST /api/clock/alarms`
  pub async fn create_alarm(&self, alarm: &NewAlarm) -> Result<Alarm> {
    self.post(&["clock", "alarms"], serde_json::to_value(alarm)?).await
  }

  /// `DELETE /api/clock/alarms/{id}`
  pub async fn delete_alarm(&self, id: &str) -> Result<()> {
    self.delete(&["clock", "alarms", id]).await
  }

  /// `POST /api/clock/alarms/{id}/toggle`
  pub async fn toggle_alarm(&self, id: &str, enabled: bool) -> Result<()> {
    self
      .post::<IgnoredAny>(
        &["clock", "alarms", id, "toggle"],
        json!({ "enabled": enabled }),
      )
      .await
      .map(drop)
  }

  /// `POST /api/clock/alarms/dismiss`. The backend broadcasts
  /// `alarm_dismissed` to every client.
  pub async fn dismiss_alarm(&self, id: &str) -> Result<()> {
    self
      .post::<IgnoredAny>(&["clock", "alarms", "dismiss"], json!({ "id": id }))
      .await
      .map(drop)
  }

  // ── Snapshot ──────────────────────────────────────────────────────────────

  /// Fetch every collection concurrently. A collection whose request fails
  /// is logged and left empty; the others are still used.
  pub async fn fetch_snapshot(&self) -> Snapshot {
    let (subjects, tasks, notes, alarms, study, activity) = tokio::join!(
      self.list_subjects(),
      self.list_tasks(),
      self.list_notes(),
      self.list_alarms(),
      self.study_status(),
      self.activity(),
    );
    Snapshot {
      subjects: or_empty("subjects", subjects),
      tasks:    or_empty("tasks", tasks),
      notes:    or_empty("notes", notes),
      alarms:   or_empty("alarms", alarms),
      study:    or_empty("study", study),
      activity: or_empty("activity", activity),
    }
  }
}

fn or_empty<T: Default>(collection: &'static str, result: Result<T>) -> T {
  result.unwrap_or_else(|error| {
    warn!(collection, %error, "snapshot fetch failed; using empty");
    T::default()
  })
}
