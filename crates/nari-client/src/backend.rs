//! The [`Backend`] trait: what the engine needs from the REST API.
//!
//! Every mutation answers with the change it caused, expressed as the same
//! [`ChangeEvent`] the event channel will later broadcast. The engine applies
//! both; the reconciler makes the second arrival a no-op.

use std::future::Future;

use nari_core::{
  ChangeEvent, Snapshot,
  alarm::NewAlarm,
  entity::{AlarmId, NoteId, TaskId},
  event::{IdRef, SubjectRef},
};

use crate::{
  Result,
  api::{ApiClient, NewNote, NewTask, NotePatch, TaskPatch},
};

/// A user-initiated change, sent to the backend over REST.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation {
  AddSubject(String),
  RemoveSubject(String),
  AddTask(NewTask),
  UpdateTask(TaskId, TaskPatch),
  DeleteTask(TaskId),
  AddNote(NewNote),
  UpdateNote(NoteId, NotePatch),
  DeleteNote(NoteId),
  StartStudy { subject: String },
  StopStudy { save: bool },
  AddAlarm(NewAlarm),
  DeleteAlarm(AlarmId),
  ToggleAlarm { id: AlarmId, enabled: bool },
}

/// Abstraction over the Nari REST API.
///
/// All methods return `Send` futures so calls can be spawned onto the tokio
/// runtime.
pub trait Backend: Clone + Send + Sync + 'static {
  /// Fetch every collection. Never fails as a whole: a collection that cannot
  /// be fetched comes back empty.
  fn fetch_snapshot(&self) -> impl Future<Output = Snapshot> + Send + '_;

  /// Best-effort acknowledgement of a dismissed alarm.
  fn dismiss_alarm<'a>(
    &'a self,
    id: &'a str,
  ) -> impl Future<Output = Result<()>> + Send + 'a;

  /// Perform `mutation`. `Ok(None)` when the response carries nothing to
  /// reconcile (the channel event will).
  fn mutate(
    &self,
    mutation: Mutation,
  ) -> impl Future<Output = Result<Option<ChangeEvent>>> + Send + '_;
}

impl Backend for ApiClient {
  fn fetch_snapshot(&self) -> impl Future<Output = Snapshot> + Send + '_ {
    ApiClient::fetch_snapshot(self)
  }

  fn dismiss_alarm<'a>(
    &'a self,
    id: &'a str,
  ) -> impl Future<Output = Result<()>> + Send + 'a {
    ApiClient::dismiss_alarm(self, id)
  }

  fn mutate(
    &self,
    mutation: Mutation,
  ) -> impl Future<Output = Result<Option<ChangeEvent>>> + Send + '_ {
    async move {
      use Mutation::*;

      let event = match mutation {
        AddSubject(name) => ChangeEvent::SubjectAdded(self.add_subject(&name).await?),
        RemoveSubject(name) => {
          self.remove_subject(&name).await?;
          ChangeEvent::SubjectRemoved(SubjectRef { name })
        }
        AddTask(task) => ChangeEvent::TaskAdded(self.create_task(&task).await?),
        UpdateTask(id, patch) => {
          ChangeEvent::TaskUpdated(self.update_task(id, &patch).await?)
        }
        DeleteTask(id) => {
          self.delete_task(id).await?;
          ChangeEvent::TaskDeleted(IdRef { id })
        }
        AddNote(note) => ChangeEvent::NoteAdded(self.create_note(&note).await?),
        UpdateNote(id, patch) => {
          ChangeEvent::NoteUpdated(self.update_note(id, &patch).await?)
        }
        DeleteNote(id) => {
          self.delete_note(id).await?;
          ChangeEvent::NoteDeleted(IdRef { id })
        }
        StartStudy { subject } => {
          ChangeEvent::StudyStarted(self.start_study(&subject).await?)
        }
        StopStudy { save } => ChangeEvent::StudyStopped(self.stop_study(save).await?),
        AddAlarm(alarm) => ChangeEvent::AlarmAdded(self.create_alarm(&alarm).await?),
        DeleteAlarm(id) => {
          self.delete_alarm(&id).await?;
          ChangeEvent::AlarmDeleted(IdRef { id })
        }
        ToggleAlarm { id, enabled } => {
          self.toggle_alarm(&id, enabled).await?;
          return Ok(None);
        }
      };
      Ok(Some(event))
    }
  }
}
