//! Client configuration.

use std::time::Duration;

use nari_core::supervisor::{BackoffStrategy, ReconnectPolicy, SupervisorConfig};
use serde::Deserialize;

/// Settings for the REST client, the event channel and the supervisor.
/// Every field has a default, so an empty source deserialises.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
  /// Backend root, without the `/api` suffix.
  pub base_url:             String,
  /// Socket.IO namespace of the event channel.
  pub namespace:            String,
  pub request_timeout_secs: u64,
  pub stale_after_secs:     u64,
  pub reconnect:            ReconnectConfig,
}

impl Default for ClientConfig {
  fn default() -> Self {
    Self {
      base_url:             "http://localhost:5000".to_string(),
      namespace:            "/nari".to_string(),
      request_timeout_secs: 10,
      stale_after_secs:     30,
      reconnect:            ReconnectConfig::default(),
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ReconnectConfig {
  pub strategy:         BackoffStrategy,
  pub initial_delay_ms: u64,
  pub max_delay_ms:     u64,
  pub max_attempts:     u32,
}

impl Default for ReconnectConfig {
  fn default() -> Self {
    Self {
      strategy:         BackoffStrategy::Fixed,
      initial_delay_ms: 1000,
      max_delay_ms:     30_000,
      max_attempts:     10,
    }
  }
}

impl ClientConfig {
  pub fn request_timeout(&self) -> Duration {
    Duration::from_secs(self.request_timeout_secs)
  }

  pub fn supervisor(&self) -> SupervisorConfig {
    SupervisorConfig {
      stale_after: Duration::from_secs(self.stale_after_secs),
      reconnect:   ReconnectPolicy {
        strategy:      self.reconnect.strategy,
        initial_delay: Duration::from_millis(self.reconnect.initial_delay_ms),
        max_delay:     Duration::from_millis(self.reconnect.max_delay_ms),
        max_attempts:  self.reconnect.max_attempts,
      },
    }
  }
}
