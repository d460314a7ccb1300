//! The backend's push-event channel.

pub mod packet;
pub mod polling;

use std::future::Future;

use serde_json::Value;

use crate::Result;

pub use polling::PollingChannel;

/// An undecoded event as delivered by the channel.
#[derive(Debug, Clone, PartialEq)]
pub struct RawEvent {
  pub name:    String,
  pub payload: Value,
}

impl RawEvent {
  pub fn new(name: impl Into<String>, payload: Value) -> Self {
    Self { name: name.into(), payload }
  }
}

/// A connection to the backend's event stream.
///
/// Only the transport task drives a channel, one call at a time.
pub trait EventChannel: Send + 'static {
  /// Open (or reopen) the channel. Resolves once the backend confirms it.
  fn connect(&mut self) -> impl Future<Output = Result<()>> + Send + '_;

  /// The next event. An error means the connection is gone; call
  /// [`Self::connect`] again to reopen it.
  fn next_event(&mut self) -> impl Future<Output = Result<RawEvent>> + Send + '_;

  /// Close the channel, best effort.
  fn close(&mut self) -> impl Future<Output = ()> + Send + '_;
}
