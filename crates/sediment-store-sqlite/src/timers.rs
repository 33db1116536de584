//! Rollback-timer registry: one pending countdown per site/kind.
//!
//! Arming resets the countdown (the previous timer is aborted), it never
//! stacks. A timer that has started its expiry work removes itself first, so
//! a re-arm racing with an in-flight rollback does not cancel it halfway.

use std::{
  collections::HashMap,
  future::Future,
  sync::{
    Arc, PoisonError, RwLock,
    atomic::{AtomicU64, Ordering},
  },
  time::Duration,
};

use sediment_core::{DataKind, SiteId};
use tokio::task::JoinHandle;

type Key = (SiteId, DataKind);
type Handles = RwLock<HashMap<Key, (u64, JoinHandle<()>)>>;

#[derive(Default)]
pub struct RollbackTimers {
  handles:    Arc<Handles>,
  generation: AtomicU64,
}

impl RollbackTimers {
  pub fn new() -> Self { Self::default() }

  /// Run `on_expiry` after `after`, replacing any timer armed for the same
  /// site/kind. Must be called from within a tokio runtime.
  pub fn arm<F>(&self, site: SiteId, kind: DataKind, after: Duration, on_expiry: F)
  where
    F: Future<Output = ()> + Send + 'static,
  {
    let key = (site, kind);
    let generation = self.generation.fetch_add(1, Ordering::Relaxed);
    let handles = Arc::clone(&self.handles);
    let own_key = key.clone();

    let handle = tokio::spawn(async move {
      tokio::time::sleep(after).await;
      {
        let mut map = handles.write().unwrap_or_else(PoisonError::into_inner);
        if map.get(&own_key).is_some_and(|(g, _)| *g == generation) {
          map.remove(&own_key);
        }
      }
      on_expiry.await;
    });

    let previous = self
      .handles
      .write()
      .unwrap_or_else(PoisonError::into_inner)
      .insert(key, (generation, handle));
    if let Some((_, previous)) = previous {
      previous.abort();
    }
  }

  /// Cancel the countdown for `(site, kind)`. Returns whether one was armed.
  pub fn disarm(&self, site: &SiteId, kind: DataKind) -> bool {
    let removed = self
      .handles
      .write()
      .unwrap_or_else(PoisonError::into_inner)
      .remove(&(site.clone(), kind));
    match removed {
      Some((_, handle)) => {
        handle.abort();
        true
      }
      None => false,
    }
  }

  pub fn is_armed(&self, site: &SiteId, kind: DataKind) -> bool {
    self
      .handles
      .read()
      .unwrap_or_else(PoisonError::into_inner)
      .get(&(site.clone(), kind))
      .is_some_and(|(_, h)| !h.is_finished())
  }
}

impl Drop for RollbackTimers {
  fn drop(&mut self) {
    let map = self.handles.write().unwrap_or_else(PoisonError::into_inner);
    for (_, handle) in map.values() {
      handle.abort();
    }
  }
}

#[cfg(test)]
mod tests {
  use std::sync::atomic::AtomicUsize;

  use super::*;

  fn site() -> SiteId { SiteId::new("s1").unwrap() }

  #[tokio::test]
  async fn rearming_resets_instead_of_stacking() {
    let timers = RollbackTimers::new();
    let fired = Arc::new(AtomicUsize::new(0));

    for _ in 0..3 {
      let fired = fired.clone();
      timers.arm(site(), DataKind::Hourly, Duration::from_millis(50), async move {
        fired.fetch_add(1, Ordering::SeqCst);
      });
      tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(timers.is_armed(&site(), DataKind::Hourly));

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(fired.load(Ordering::SeqCst), 1);
    assert!(!timers.is_armed(&site(), DataKind::Hourly));
  }

  #[tokio::test]
  async fn disarm_cancels() {
    let timers = RollbackTimers::new();
    let fired = Arc::new(AtomicUsize::new(0));
    let f = fired.clone();
    timers.arm(site(), DataKind::Daily, Duration::from_millis(30), async move {
      f.fetch_add(1, Ordering::SeqCst);
    });

    assert!(timers.disarm(&site(), DataKind::Daily));
    assert!(!timers.disarm(&site(), DataKind::Daily));
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(fired.load(Ordering::SeqCst), 0);
  }
}
