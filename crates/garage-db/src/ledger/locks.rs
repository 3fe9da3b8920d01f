//! # Per-Part Ledger Locks
//!
//! In-process registry of one async mutex per part.
//!
//! ```text
//! allocate(part 7) ──► acquire(7, 5s) ──► guard ──► BEGIN … COMMIT ──► drop guard
//! receive(part 7)  ──► acquire(7, 5s) ──► waits ────────────────────────► guard …
//! allocate(part 9) ──► acquire(9, 5s) ──► guard (no contention with part 7)
//!
//! wait > timeout   ──► CoreError::LockTimeout (retryable)
//! ```
//! The lock is taken before a pooled connection, never the reverse, so a
//! waiting operation never holds a connection another operation needs.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::{debug, warn};

use garage_core::CoreError;

/// Above this many registered parts, unused entries are pruned on acquire.
const PRUNE_THRESHOLD: usize = 1024;

/// Registry of per-part locks.
#[derive(Debug, Default)]
pub struct PartLocks {
    inner: Mutex<HashMap<i64, Arc<AsyncMutex<()>>>>,
}

/// Held for the duration of one ledger unit of work.
#[derive(Debug)]
pub struct PartGuard {
    part_id: i64,
    _guard: OwnedMutexGuard<()>,
}

impl PartGuard {
    pub fn part_id(&self) -> i64 {
        self.part_id
    }
}

impl PartLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits up to `timeout` for the part's lock.
    pub async fn acquire(&self, part_id: i64, timeout: Duration) -> Result<PartGuard, CoreError> {
        let lock = self.lock_for(part_id);
        let started = Instant::now();

        match tokio::time::timeout(timeout, lock.lock_owned()).await {
            Ok(guard) => {
                debug!(part_id, waited_ms = started.elapsed().as_millis() as u64, "Part lock acquired");
                Ok(PartGuard {
                    part_id,
                    _guard: guard,
                })
            }
            Err(_) => {
                let waited_ms = started.elapsed().as_millis() as u64;
                warn!(part_id, waited_ms, "Timed out waiting for part lock");
                Err(CoreError::LockTimeout { part_id, waited_ms })
            }
        }
    }

    /// Number of parts with a registered lock.
    pub fn len(&self) -> usize {
        self.registry().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock_for(&self, part_id: i64) -> Arc<AsyncMutex<()>> {
        let mut map = self.registry();
        if map.len() > PRUNE_THRESHOLD {
            // Only the registry holds these: nobody is waiting or working.
            map.retain(|_, lock| Arc::strong_count(lock) > 1);
        }
        Arc::clone(map.entry(part_id).or_default())
    }

    fn registry(&self) -> std::sync::MutexGuard<'_, HashMap<i64, Arc<AsyncMutex<()>>>> {
        // The map holds no invariants a panicking holder could break.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_same_part_times_out() {
        let locks = PartLocks::new();
        let held = locks.acquire(7, Duration::from_millis(50)).await.unwrap();
        assert_eq!(held.part_id(), 7);

        let err = locks.acquire(7, Duration::from_millis(30)).await.unwrap_err();
        assert!(matches!(err, CoreError::LockTimeout { part_id: 7, .. }));
        assert!(err.is_retryable());

        drop(held);
        assert!(locks.acquire(7, Duration::from_millis(30)).await.is_ok());
    }

    #[tokio::test]
    async fn test_different_parts_do_not_contend() {
        let locks = PartLocks::new();
        let _a = locks.acquire(1, Duration::from_millis(10)).await.unwrap();
        let _b = locks.acquire(2, Duration::from_millis(10)).await.unwrap();
        assert_eq!(locks.len(), 2);
    }

    #[tokio::test]
    async fn test_waiter_gets_lock_after_release() {
        let locks = Arc::new(PartLocks::new());
        let held = locks.acquire(3, Duration::from_secs(1)).await.unwrap();

        let waiter = {
            let locks = Arc::clone(&locks);
            tokio::spawn(async move { locks.acquire(3, Duration::from_secs(5)).await.map(|g| g.part_id()) })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        drop(held);

        assert_eq!(waiter.await.unwrap().unwrap(), 3);
    }

    #[tokio::test]
    async fn test_prune_keeps_held_locks() {
        let locks = PartLocks::new();
        let held = locks.acquire(0, Duration::from_millis(10)).await.unwrap();
        for part_id in 1..=PRUNE_THRESHOLD as i64 {
            drop(locks.acquire(part_id, Duration::from_millis(10)).await.unwrap());
        }
        // Triggers a prune: only the held lock and the new one survive.
        let _next = locks.acquire(5000, Duration::from_millis(10)).await.unwrap();
        assert_eq!(locks.len(), 2);

        let err = locks.acquire(0, Duration::from_millis(10)).await.unwrap_err();
        assert!(matches!(err, CoreError::LockTimeout { .. }));
        drop(held);
    }
}
