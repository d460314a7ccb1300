//! One tick scheduler per timer domain.
//!
//! The arena is generic over the handle type so the core stays free of any
//! async runtime; the client plugs in a tokio `AbortHandle`.

use std::collections::HashMap;

use tracing::trace;

use crate::timer::Domain;

/// A running tick scheduler that can be cancelled.
pub trait TickHandle {
  fn cancel(self);
}

/// Distinguishes successive schedulers of the same domain. A tick carries the
/// generation of the scheduler that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Generation(u64);

#[derive(Debug)]
struct Slot<H> {
  generation: Generation,
  handle:     H,
}

#[derive(Debug)]
pub struct TimerArena<H: TickHandle> {
  slots: HashMap<Domain, Slot<H>>,
  next:  u64,
}

impl<H: TickHandle> Default for TimerArena<H> {
  fn default() -> Self { Self { slots: HashMap::new(), next: 0 } }
}

impl<H: TickHandle> TimerArena<H> {
  pub fn new() -> Self { Self::default() }

  /// Reserve the generation for the next scheduler of `domain`. Pass it to
  /// the scheduler so its ticks can be matched with [`Self::is_current`].
  pub fn next_generation(&mut self) -> Generation {
    self.next += 1;
    Generation(self.next)
  }

  /// Install `handle` as the scheduler of `domain`, cancelling any previous
  /// one first.
  pub fn start(&mut self, domain: Domain, generation: Generation, handle: H) {
    self.stop(domain);
    trace!(%domain, ?generation, "timer started");
    self.slots.insert(domain, Slot { generation, handle });
  }

  /// Cancel the scheduler of `domain`. Returns whether one was running.
  pub fn stop(&mut self, domain: Domain) -> bool {
    match self.slots.remove(&domain) {
      Some(slot) => {
        trace!(%domain, generation = ?slot.generation, "timer cancelled");
        slot.handle.cancel();
        true
      }
      None => false,
    }
  }

  pub fn is_active(&self, domain: Domain) -> bool {
    self.slots.contains_key(&domain)
  }

  /// Whether a tick stamped with `generation` comes from the live scheduler
  /// of `domain`. Ticks that fail this check are stale and must be ignored.
  pub fn is_current(&self, domain: Domain, generation: Generation) -> bool {
    self
      .slots
      .get(&domain)
      .is_some_and(|slot| slot.generation == generation)
  }

  /// Cancel every scheduler.
  pub fn shutdown(&mut self) {
    for (_, slot) in self.slots.drain() {
      slot.handle.cancel();
    }
  }
}

impl<H: TickHandle> Drop for TimerArena<H> {
  fn drop(&mut self) { self.shutdown(); }
}
