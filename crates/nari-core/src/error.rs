//! Error types for `nari-core`.

use thiserror::Error;

use crate::entity::{AlarmId, AlarmState};

#[derive(Debug, Error)]
pub enum Error {
  #[error("unknown event: {0:?}")]
  UnknownEvent(String),

  #[error("malformed {name} event: {source}")]
  MalformedEvent {
    name:   String,
    #[source]
    source: serde_json::Error,
  },

  #[error("alarm {id} cannot move from {from} to {to}")]
  InvalidAlarmTransition {
    id:   AlarmId,
    from: AlarmState,
    to:   AlarmState,
  },

  #[error("alarm not found: {0}")]
  AlarmNotFound(AlarmId),

  #[error("invalid countdown: {0}")]
  InvalidCountdown(String),

  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
