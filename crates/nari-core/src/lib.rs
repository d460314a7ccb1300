//! Core state model for the Nari study dashboard.
//!
//! Everything here is synchronous and free of I/O: the entities mirrored from
//! the backend, the change events that update them, the reconciler and store
//! that hold them, plus the connection, timer and alarm state machines. The
//! `nari-client` crate drives these from a tokio event loop.

pub mod activity;
pub mod alarm;
pub mod arena;
pub mod entity;
pub mod error;
pub mod event;
pub mod reconcile;
pub mod state;
pub mod store;
pub mod supervisor;
pub mod timer;
pub mod wire;

pub use error::{Error, Result};
pub use event::ChangeEvent;
pub use state::{DashboardState, Snapshot};
pub use store::SyncStore;
