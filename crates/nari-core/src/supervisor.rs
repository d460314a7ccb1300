//! Connection health state machine.
//!
//! [`ConnectionSupervisor`] does no I/O. The engine reports transport events
//! to it (`begin_connect`, `connected`, `transport_lost`, `connect_failed`)
//! together with the current [`Instant`], and it answers with what to do
//! next: whether to resynchronise, and how long to wait before retrying.

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

// ─── Configuration ───────────────────────────────────────────────────────────

#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum BackoffStrategy {
  #[default]
  Fixed,
  Exponential,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectPolicy {
  pub strategy:      BackoffStrategy,
  pub initial_delay: Duration,
  /// Upper bound for exponential delays.
  pub max_delay:     Duration,
  pub max_attempts:  u32,
}

impl Default for ReconnectPolicy {
  fn default() -> Self {
    Self {
      strategy:      BackoffStrategy::Fixed,
      initial_delay: Duration::from_secs(1),
      max_delay:     Duration::from_secs(30),
      max_attempts:  10,
    }
  }
}

impl ReconnectPolicy {
  /// Delay before the `attempt`-th reconnect attempt (1-based).
  pub fn delay_for(&self, attempt: u32) -> Duration {
    match self.strategy {
      BackoffStrategy::Fixed => self.initial_delay,
      BackoffStrategy::Exponential => {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.initial_delay.saturating_mul(factor).min(self.max_delay)
      }
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SupervisorConfig {
  /// Continuous disconnection after which the connection is `Stale`.
  pub stale_after: Duration,
  pub reconnect:   ReconnectPolicy,
}

impl Default for SupervisorConfig {
  fn default() -> Self {
    Self {
      stale_after: Duration::from_secs(30),
      reconnect:   ReconnectPolicy::default(),
    }
  }
}

// ─── Status ──────────────────────────────────────────────────────────────────

#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, strum::Display,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ConnectionState {
  #[default]
  Disconnected,
  Connecting,
  Connected,
  Stale,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ConnectionStatus {
  pub state:              ConnectionState,
  /// Set whenever the channel is not connected.
  pub disconnected_since: Option<Instant>,
  /// Attempts made since the last successful connect or retrigger.
  pub attempts:           u32,
  /// Retries are exhausted; only a retrigger reconnects.
  pub exhausted:          bool,
}

/// What the engine should do after a failed or lost connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Retry {
  After(Duration),
  GiveUp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectOutcome {
  /// The connection was re-established after an interruption: fetch a fresh
  /// snapshot and bootstrap it.
  pub resync: bool,
}

// ─── Supervisor ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct ConnectionSupervisor {
  config:         SupervisorConfig,
  status:         ConnectionStatus,
  ever_connected: bool,
  running:        bool,
  /// A connect attempt is in flight.
  attempting:     bool,
  /// The current disconnection has already turned stale.
  stale:          bool,
}

impl ConnectionSupervisor {
  pub fn new(config: SupervisorConfig) -> Self {
    Self {
      config,
      status: ConnectionStatus::default(),
      ever_connected: false,
      running: false,
      attempting: false,
      stale: false,
    }
  }

  pub fn config(&self) -> &SupervisorConfig { &self.config }

  pub fn status(&self) -> ConnectionStatus { self.status }

  pub fn state(&self) -> ConnectionState { self.status.state }

  pub fn is_running(&self) -> bool { self.running }

  /// Start supervising. The staleness clock starts now, so a backend that is
  /// never reachable still turns `Stale`.
  pub fn init(&mut self, now: Instant) {
    self.running = true;
    self.attempting = false;
    self.stale = false;
    self.status = ConnectionStatus {
      state: ConnectionState::Disconnected,
      disconnected_since: Some(now),
      attempts: 0,
      exhausted: false,
    };
  }

  /// Record the start of a connect attempt. Returns `false` (and changes
  /// nothing) if the supervisor is shut down, already connected, or waiting
  /// on an attempt.
  pub fn begin_connect(&mut self) -> bool {
    if !self.can_connect() {
      return false;
    }
    self.status.state = ConnectionState::Connecting;
    self.status.attempts += 1;
    self.attempting = true;
    true
  }

  fn can_connect(&self) -> bool {
    self.running
      && !self.attempting
      && self.status.state != ConnectionState::Connected
  }

  pub fn connected(&mut self) -> ConnectOutcome {
    let resync = self.ever_connected;
    self.ever_connected = true;
    self.attempting = false;
    self.stale = false;
    self.status = ConnectionStatus {
      state: ConnectionState::Connected,
      disconnected_since: None,
      attempts: 0,
      exhausted: false,
    };
    info!(resync, "event channel connected");
    ConnectOutcome { resync }
  }

  /// The live channel dropped. Reconnection starts from attempt one.
  pub fn transport_lost(&mut self, now: Instant) -> Retry {
    if self.status.state != ConnectionState::Connected {
      return self.connect_failed(now);
    }
    warn!("event channel lost");
    self.attempting = false;
    self.stale = false;
    self.status = ConnectionStatus {
      state: ConnectionState::Disconnected,
      disconnected_since: Some(now),
      attempts: 0,
      exhausted: false,
    };
    Retry::After(self.config.reconnect.delay_for(1))
  }

  /// A connect attempt failed.
  pub fn connect_failed(&mut self, now: Instant) -> Retry {
    self.attempting = false;
    let since = *self.status.disconnected_since.get_or_insert(now);
    if now.saturating_duration_since(since) >= self.config.stale_after {
      self.stale = true;
    }
    self.status.state = if self.stale {
      ConnectionState::Stale
    } else {
      ConnectionState::Disconnected
    };

    let attempts = self.status.attempts;
    if attempts >= self.config.reconnect.max_attempts {
      warn!(attempts, "reconnect attempts exhausted");
      self.status.exhausted = true;
      return Retry::GiveUp;
    }
    let delay = self.config.reconnect.delay_for(attempts + 1);
    warn!(attempts, ?delay, "connect attempt failed; retrying");
    Retry::After(delay)
  }

  /// When the current disconnection turns stale, if it has not already.
  /// Counts while an attempt is in flight too.
  pub fn stale_deadline(&self) -> Option<Instant> {
    if !self.running
      || self.stale
      || self.status.state == ConnectionState::Connected
    {
      return None;
    }
    self
      .status
      .disconnected_since
      .map(|since| since + self.config.stale_after)
  }

  /// Move to `Stale` once the deadline has passed, whether idle or mid
  /// attempt. Returns whether the state changed.
  pub fn poll_staleness(&mut self, now: Instant) -> bool {
    match self.stale_deadline() {
      Some(deadline) if now >= deadline => {
        warn!(
          after = ?self.config.stale_after,
          "event channel stale"
        );
        self.stale = true;
        self.status.state = ConnectionState::Stale;
        true
      }
      _ => false,
    }
  }

  /// Manual retry: reset the attempt counter. Returns whether the engine
  /// should connect now.
  pub fn retrigger(&mut self) -> bool {
    if !self.can_connect() {
      return false;
    }
    info!("reconnect retriggered");
    self.status.attempts = 0;
    self.status.exhausted = false;
    true
  }

  pub fn shutdown(&mut self, now: Instant) {
    self.running = false;
    self.attempting = false;
    self.status.state = ConnectionState::Disconnected;
    self.status.disconnected_since.get_or_insert(now);
  }
}
