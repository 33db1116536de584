//! Debounced rotation scheduling.
//!
//! Ingestion asks for a rotation after every write. Requests for a site with
//! a run still waiting are folded into that run, and each one pushes it back
//! to local midnight plus [`STAGGER`] for every trigger already queued for
//! the site.

use std::{
  collections::HashMap,
  future::Future,
  sync::{
    Arc, Mutex, PoisonError,
    atomic::{AtomicBool, Ordering},
  },
  time::Duration,
};

use chrono::{Days, NaiveDateTime};
use sediment_core::{SiteId, period::midnight};
use tokio::{sync::watch, task::JoinHandle, time::Instant};

pub const STAGGER: Duration = Duration::from_secs(5 * 60);

/// Delay from `now` until the next local midnight plus `STAGGER x queued`.
pub fn debounce_delay(now: NaiveDateTime, queued: usize) -> Duration {
  let next_midnight = now
    .date()
    .checked_add_days(Days::new(1))
    .map(midnight)
    .unwrap_or(now);
  let base = (next_midnight - now).to_std().unwrap_or_default();
  base + STAGGER * u32::try_from(queued).unwrap_or(u32::MAX)
}

/// Outcome of [`RotationScheduler::schedule`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Scheduled {
  pub delay:  Duration,
  /// Triggers already queued for the site; `0` when a fresh run was spawned.
  pub queued: usize,
}

impl Scheduled {
  pub fn coalesced(&self) -> bool { self.queued > 0 }
}

struct Pending {
  deadline: watch::Sender<Instant>,
  started:  Arc<AtomicBool>,
  triggers: usize,
  handle:   JoinHandle<()>,
}

#[derive(Default)]
pub struct RotationScheduler {
  pending: Mutex<HashMap<SiteId, Pending>>,
}

impl RotationScheduler {
  pub fn new() -> Self { Self::default() }

  /// Queue `run` for `site`, or fold the request into the run already
  /// waiting for it. A folded request drops `run` and moves the waiting
  /// run's deadline.
  pub fn schedule<F>(&self, site: SiteId, now: NaiveDateTime, run: F) -> Scheduled
  where
    F: Future<Output = ()> + Send + 'static,
  {
    let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
    pending.retain(|_, p| !p.handle.is_finished());

    if let Some(waiting) = pending.get_mut(&site) {
      if !waiting.started.load(Ordering::Acquire) {
        let queued = waiting.triggers;
        let delay = debounce_delay(now, queued);
        waiting.triggers += 1;
        waiting.deadline.send_replace(Instant::now() + delay);
        return Scheduled { delay, queued };
      }
    }

    let delay = debounce_delay(now, 0);
    let (deadline, mut rx) = watch::channel(Instant::now() + delay);
    let started = Arc::new(AtomicBool::new(false));
    let flag = started.clone();
    let handle = tokio::spawn(async move {
      loop {
        let at = *rx.borrow_and_update();
        tokio::select! {
          () = tokio::time::sleep_until(at) => break,
          changed = rx.changed() => if changed.is_err() {
            tokio::time::sleep_until(at).await;
            break;
          },
        }
      }
      flag.store(true, Ordering::Release);
      run.await;
    });
    pending.insert(site, Pending { deadline, started, triggers: 1, handle });
    Scheduled { delay, queued: 0 }
  }

  /// Number of runs still waiting or in progress.
  pub fn pending(&self) -> usize {
    let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
    pending.retain(|_, p| !p.handle.is_finished());
    pending.len()
  }
}

impl Drop for RotationScheduler {
  fn drop(&mut self) {
    let pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
    for waiting in pending.values() {
      waiting.handle.abort();
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn dt(s: &str) -> NaiveDateTime {
    NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").unwrap()
  }

  #[test]
  fn delay_runs_to_midnight_plus_stagger() {
    let now = dt("2024-05-01 23:00:00");
    assert_eq!(debounce_delay(now, 0), Duration::from_secs(3600));
    assert_eq!(debounce_delay(now, 2), Duration::from_secs(3600 + 600));
  }

  #[tokio::test]
  async fn repeated_triggers_coalesce_and_stagger_per_site() {
    let scheduler = RotationScheduler::new();
    let now = dt("2024-05-01 12:00:00");
    let a = SiteId::new("a").unwrap();
    let b = SiteId::new("b").unwrap();
    let half_day = Duration::from_secs(12 * 3600);

    let first = scheduler.schedule(a.clone(), now, async {});
    assert_eq!(first, Scheduled { delay: half_day, queued: 0 });
    let second = scheduler.schedule(a.clone(), now, async {});
    assert_eq!(second, Scheduled { delay: half_day + STAGGER, queued: 1 });
    let third = scheduler.schedule(a, now, async {});
    assert_eq!(third, Scheduled { delay: half_day + STAGGER * 2, queued: 2 });

    // Other sites do not count against this one.
    let other = scheduler.schedule(b, now, async {});
    assert_eq!(other, Scheduled { delay: half_day, queued: 0 });
    assert_eq!(scheduler.pending(), 2);
  }
}
