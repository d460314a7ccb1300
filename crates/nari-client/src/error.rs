//! Error types for `nari-client`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("http error: {0}")]
  Http(#[from] reqwest::Error),

  #[error("{method} {path} returned {status}")]
  Status {
    method: reqwest::Method,
    path:   String,
    status: reqwest::StatusCode,
  },

  #[error("json error: {0}")]
  Json(#[from] serde_json::Error),

  #[error("invalid base url {0:?}")]
  InvalidBaseUrl(String),

  #[error("protocol error: {0}")]
  Protocol(String),

  #[error("namespace {namespace} refused the connection: {reason}")]
  ConnectRefused { namespace: String, reason: String },

  #[error("event channel closed")]
  ChannelClosed,

  #[error(transparent)]
  Core(#[from] nari_core::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
