// src/pool/gate.rs

//! Admission control for the pool.
//!
//! A counting gate bounded at `max_total`. A permit is taken before a
//! connection is lent and returned when that connection comes back or is
//! destroyed, so `outstanding()` always tracks the lent ledger. The gate is
//! synchronised on its own and never touches the pool core lock.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::{Semaphore, SemaphorePermit, TryAcquireError};
use tokio::time::timeout;
use tracing::warn;

/// Outcome of waiting on the gate.
pub enum Admission<'a> {
    /// A permit was granted. It returns itself on drop unless committed.
    Granted(GatePermit<'a>),
    /// No permit became available in time. Nothing was taken.
    TimedOut,
    /// The gate has been closed by shutdown.
    Closed,
}

/// A permit that has not yet been handed to the lent ledger.
pub struct GatePermit<'a> {
    permit: SemaphorePermit<'a>,
}

impl GatePermit<'_> {
    /// Keep the permit held after this guard goes away. It must later be
    /// given back with `AdmissionGate::release_permit`.
    pub fn commit(self) {
        self.permit.forget();
    }
}

/// Counting permit gate.
pub struct AdmissionGate {
    semaphore: Semaphore,
    capacity: usize,
    waiting: AtomicUsize,
}

impl AdmissionGate {
    pub fn new(capacity: usize) -> Self {
        Self {
            semaphore: Semaphore::new(capacity),
            capacity,
            waiting: AtomicUsize::new(0),
        }
    }

    /// Wait up to `wait` for a permit. Never retries on its own.
    pub async fn acquire_permit(&self, wait: Duration) -> Admission<'_> {
        match self.semaphore.try_acquire() {
            Ok(permit) => return Admission::Granted(GatePermit { permit }),
            Err(TryAcquireError::Closed) => return Admission::Closed,
            Err(TryAcquireError::NoPermits) => {}
        }

        let _waiting = WaitingGuard::enter(&self.waiting);
        match timeout(wait, self.semaphore.acquire()).await {
            Ok(Ok(permit)) => Admission::Granted(GatePermit { permit }),
            Ok(Err(_)) => Admission::Closed,
            Err(_) => Admission::TimedOut,
        }
    }

    /// Give back one committed permit.
    pub fn release_permit(&self) {
        if self.semaphore.available_permits() >= self.capacity {
            warn!("Permit released with none outstanding; ignoring");
            return;
        }
        self.semaphore.add_permits(1);
    }

    /// Permits currently held (committed or in flight).
    pub fn outstanding(&self) -> usize {
        self.capacity.saturating_sub(self.semaphore.available_permits())
    }

    /// Tasks currently suspended waiting for a permit.
    pub fn waiting(&self) -> usize {
        self.waiting.load(Ordering::Acquire)
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Wake every waiter with `Admission::Closed` and refuse new ones.
    pub fn close(&self) {
        self.semaphore.close();
    }

    pub fn is_closed(&self) -> bool {
        self.semaphore.is_closed()
    }
}

struct WaitingGuard<'a>(&'a AtomicUsize);

impl<'a> WaitingGuard<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::AcqRel);
        Self(counter)
    }
}

impl Drop for WaitingGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    const SHORT: Duration = Duration::from_millis(20);

    #[tokio::test]
    async fn test_committed_permit_stays_outstanding() {
        let gate = AdmissionGate::new(2);
        match gate.acquire_permit(SHORT).await {
            Admission::Granted(permit) => permit.commit(),
            _ => panic!("expected a permit"),
        }
        assert_eq!(gate.outstanding(), 1);

        gate.release_permit();
        assert_eq!(gate.outstanding(), 0);
    }

    #[tokio::test]
    async fn test_uncommitted_permit_returns_on_drop() {
        let gate = AdmissionGate::new(1);
        if let Admission::Granted(permit) = gate.acquire_permit(SHORT).await {
            assert_eq!(gate.outstanding(), 1);
            drop(permit);
        } else {
            panic!("expected a permit");
        }
        assert_eq!(gate.outstanding(), 0);
    }

    #[tokio::test]
    async fn test_timeout_takes_nothing() {
        let gate = AdmissionGate::new(1);
        if let Admission::Granted(permit) = gate.acquire_permit(SHORT).await {
            permit.commit();
        }
        assert!(matches!(gate.acquire_permit(SHORT).await, Admission::TimedOut));
        assert_eq!(gate.outstanding(), 1);
        assert_eq!(gate.waiting(), 0);
    }

    #[tokio::test]
    async fn test_release_without_outstanding_is_ignored() {
        let gate = AdmissionGate::new(2);
        gate.release_permit();
        assert_eq!(gate.outstanding(), 0);
        assert_eq!(gate.semaphore.available_permits(), 2);
    }

    #[tokio::test]
    async fn test_close_wakes_waiters() {
        let gate = Arc::new(AdmissionGate::new(1));
        if let Admission::Granted(permit) = gate.acquire_permit(SHORT).await {
            permit.commit();
        }

        let waiter = {
            let gate = Arc::clone(&gate);
            tokio::spawn(async move {
                matches!(gate.acquire_permit(Duration::from_secs(10)).await, Admission::Closed)
            })
        };
        while gate.waiting() == 0 {
            tokio::task::yield_now().await;
        }

        gate.close();
        assert!(waiter.await.unwrap());
        assert!(matches!(gate.acquire_permit(SHORT).await, Admission::Closed));
    }

    #[tokio::test]
    async fn test_release_wakes_waiter() {
        let gate = Arc::new(AdmissionGate::new(1));
        if let Admission::Granted(permit) = gate.acquire_permit(SHORT).await {
            permit.commit();
        }

        let waiter = {
            let gate = Arc::clone(&gate);
            tokio::spawn(async move {
                match gate.acquire_permit(Duration::from_secs(10)).await {
                    Admission::Granted(permit) => {
                        permit.commit();
                        true
                    }
                    _ => false,
                }
            })
        };
        while gate.waiting() == 0 {
            tokio::task::yield_now().await;
        }

        gate.release_permit();
        assert!(waiter.await.unwrap());
        assert_eq!(gate.outstanding(), 1);
    }
}
