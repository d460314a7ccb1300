//! Async client for the Nari study dashboard.
//!
//! Keeps a local [`nari_core::DashboardState`] in sync with the backend:
//! bootstrap over REST ([`api::ApiClient`]), then follow the push-event
//! channel ([`channel::PollingChannel`]). The [`engine`] drives the timers,
//! the alarm queue and reconnection on top of that.
//!
//! # Example
//!
//! ```rust,ignore
//! let config = ClientConfig::default();
//! let engine = Engine::spawn(
//!   ApiClient::new(&config)?,
//!   PollingChannel::new(&config)?,
//!   config.supervisor(),
//! );
//! let mut state = engine.state();
//! while state.changed().await.is_ok() {
//!   println!("{} tasks", state.borrow().tasks.len());
//! }
//! ```

pub mod api;
pub mod backend;
pub mod channel;
pub mod config;
pub mod engine;
pub mod error;
pub mod ticker;
pub mod transport;

pub use api::ApiClient;
pub use backend::{Backend, Mutation};
pub use channel::{EventChannel, PollingChannel, RawEvent};
pub use config::ClientConfig;
pub use engine::{Clocks, Command, Engine, EngineHandle, Notice, TimerCommand};
pub use error::{Error, Result};

#[cfg(test)]
mod tests;
