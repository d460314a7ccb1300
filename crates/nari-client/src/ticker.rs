//! Tick schedulers for the timer domains.

use nari_core::{
  arena::{Generation, TickHandle},
  timer::Domain,
};
use tokio::{
  sync::mpsc,
  task::AbortHandle,
  time::{self, Instant, MissedTickBehavior},
};

/// One tick of a domain's scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tick {
  pub domain:     Domain,
  pub generation: Generation,
}

/// Handle to a running scheduler; cancelling aborts its task.
#[derive(Debug)]
pub struct Ticker(AbortHandle);

impl TickHandle for Ticker {
  fn cancel(self) { self.0.abort(); }
}

/// Spawn a scheduler that sends a [`Tick`] every `domain.period()`, first one
/// period from now. Late ticks are skipped, not bunched.
pub fn spawn(
  domain: Domain,
  generation: Generation,
  ticks: mpsc::Sender<Tick>,
) -> Ticker {
  let period = domain.period();
  let task = tokio::spawn(async move {
    let mut interval = time::interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    loop {
      interval.tick().await;
      if ticks.send(Tick { domain, generation }).await.is_err() {
        break;
      }
    }
  });
  Ticker(task.abort_handle())
}

#[cfg(test)]
mod tests {
  use std::time::Duration;

  use nari_core::arena::TimerArena;

  use super::*;

  #[tokio::test(start_paused = true)]
  async fn ticks_at_the_domain_period_until_cancelled() {
    let (tx, mut rx) = mpsc::channel(16);
    let mut arena = TimerArena::new();
    let generation = arena.next_generation();
    arena.start(Domain::Countdown, generation, spawn(Domain::Countdown, generation, tx));

    let start = Instant::now();
    let tick = rx.recv().await.unwrap();
    assert_eq!(tick.domain, Domain::Countdown);
    assert_eq!(tick.generation, generation);
    assert_eq!(start.elapsed(), Duration::from_secs(1));

    arena.stop(Domain::Countdown);
    tokio::time::sleep(Duration::from_secs(5)).await;
    // At most one tick may have been in flight when the task was aborted.
    let mut late = 0;
    while rx.try_recv().is_ok() {
      late += 1;
    }
    assert!(late <= 1);
  }
}
