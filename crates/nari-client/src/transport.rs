//! The transport task: the only place an [`EventChannel`] is opened, read or
//! closed.
//!
//! The engine drives it with [`TransportCommand`]s and hears back through
//! [`Signal`]s. Reconnect policy lives in the engine; the task only does
//! what it is told and reports how it went.

use tokio::{sync::mpsc, task::JoinHandle};
use tracing::{debug, warn};

use crate::channel::{EventChannel, RawEvent};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportCommand {
  Connect,
  Shutdown,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Signal {
  Connected,
  ConnectFailed(String),
  Event(RawEvent),
  /// An established connection dropped.
  Lost(String),
}

#[derive(Debug)]
pub struct Transport {
  commands: mpsc::Sender<TransportCommand>,
  task:     JoinHandle<()>,
}

impl Transport {
  pub fn spawn<C: EventChannel>(channel: C) -> (Self, mpsc::Receiver<Signal>) {
    let (commands, command_rx) = mpsc::channel(8);
    let (signal_tx, signals) = mpsc::channel(64);
    let task = tokio::spawn(run(channel, command_rx, signal_tx));
    (Self { commands, task }, signals)
  }

  /// Ask for a connect attempt. Ignored while a connection is up.
  pub fn connect(&self) {
    if let Err(error) = self.commands.try_send(TransportCommand::Connect) {
      warn!(%error, "transport command queue unavailable");
    }
  }

  /// Close the channel and wait for the task to finish.
  pub async fn shutdown(self) {
    // A send error means the task is already gone.
    let _ = self.commands.send(TransportCommand::Shutdown).await;
    if let Err(error) = self.task.await {
      warn!(%error, "transport task panicked");
    }
  }
}

/// Resolves on `Shutdown` or when the engine drops its sender.
async fn shutdown_requested(commands: &mut mpsc::Receiver<TransportCommand>) {
  while let Some(command) = commands.recv().await {
    if command == TransportCommand::Shutdown {
      return;
    }
  }
}

async fn run<C: EventChannel>(
  mut channel: C,
  mut commands: mpsc::Receiver<TransportCommand>,
  signals: mpsc::Sender<Signal>,
) {
  'idle: while let Some(command) = commands.recv().await {
    if command == TransportCommand::Shutdown {
      break;
    }

    let connected = tokio::select! {
      result = channel.connect() => result,
      _ = shutdown_requested(&mut commands) => break 'idle,
    };
    let signal = match connected {
      Ok(()) => Signal::Connected,
      Err(error) => Signal::ConnectFailed(error.to_string()),
    };
    let up = signal == Signal::Connected;
    if signals.send(signal).await.is_err() {
      break;
    }
    if !up {
      continue;
    }

    loop {
      tokio::select! {
        _ = shutdown_requested(&mut commands) => break 'idle,
        event = channel.next_event() => {
          let signal = match event {
            Ok(event) => Signal::Event(event),
            Err(error) => Signal::Lost(error.to_string()),
          };
          let lost = matches!(signal, Signal::Lost(_));
          if signals.send(signal).await.is_err() {
            break 'idle;
          }
          if lost {
            continue 'idle;
          }
        }
      }
    }
  }

  debug!("closing event channel");
  channel.close().await;
}
