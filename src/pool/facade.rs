// src/pool/facade.rs

//! The caller-facing connection pool.
//!
//! Wires a factory, the pool core, the admission gate and the reclamation
//! task together. Every path that takes a permit gives exactly one back:
//! permits and reservations taken during `acquire` are guards that return
//! themselves unless the acquire completes, so a factory failure or a
//! dropped future leaves the pool as it was.

use crate::common::error::{PoolError, Result};
use crate::config::PoolConfig;
use crate::pool::connection::{Connection, ConnectionFactory};
use crate::pool::core::{Checkout, PoolCore, Returned};
use crate::pool::gate::{Admission, AdmissionGate};
use crate::pool::guard::PooledConnection;
use crate::pool::reclaim::{Reclaim, Reclaimer};
use crate::pool::stats::{PoolCounters, PoolStats};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

type Conn<F> = <F as ConnectionFactory>::Connection;

pub(crate) struct PoolShared<F: ConnectionFactory> {
    config: PoolConfig,
    factory: F,
    core: PoolCore<Conn<F>>,
    gate: AdmissionGate,
    counters: PoolCounters,
    reclaimer: Mutex<Option<Reclaimer>>,
}

/// A bounded pool of backend connections.
///
/// Cloning is cheap and every clone refers to the same pool.
pub struct ConnectionPool<F: ConnectionFactory> {
    shared: Arc<PoolShared<F>>,
}

impl<F: ConnectionFactory> Clone for ConnectionPool<F> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<F: ConnectionFactory> ConnectionPool<F> {
    /// Validate `config` and wire the pool. Opens no connections and starts
    /// no tasks; see `start`.
    pub fn new(config: PoolConfig, factory: F) -> Result<Self> {
        config.validate()?;

        let shared = PoolShared {
            core: PoolCore::new(config.max_total),
            gate: AdmissionGate::new(config.max_total),
            counters: PoolCounters::default(),
            reclaimer: Mutex::new(None),
            config,
            factory,
        };

        Ok(Self {
            shared: Arc::new(shared),
        })
    }

    pub fn config(&self) -> &PoolConfig {
        &self.shared.config
    }

    /// Pre-create the idle floor and start the reclamation task. Calling it
    /// again while running does nothing.
    ///
    /// A factory failure while pre-creating is logged; the pool then fills
    /// lazily on acquire.
    pub async fn start(&self) -> Result<()> {
        let mut reclaimer = self.shared.reclaimer.lock().await;
        if self.shared.core.is_closed() {
            return Err(PoolError::PoolClosed);
        }
        if reclaimer.is_some() {
            return Ok(());
        }

        for _ in 0..self.shared.config.min_idle {
            match self.shared.replenish().await {
                Ok(true) => {}
                Ok(false) => break,
                Err(e) => {
                    warn!("Failed to pre-create idle connections: {}", e);
                    break;
                }
            }
        }

        *reclaimer = Some(Reclaimer::start(
            Arc::downgrade(&self.shared),
            self.shared.config.reclaim_interval,
        ));

        let (lent, idle) = self.shared.core.counts();
        info!(
            "Connection pool started: {} idle, {} lent, floor {}, ceiling {}",
            idle, lent, self.shared.config.min_idle, self.shared.config.max_total
        );
        Ok(())
    }

    /// Borrow a connection, waiting up to the configured acquire timeout.
    pub async fn acquire(&self) -> Result<Conn<F>> {
        self.acquire_timeout(self.shared.config.acquire_timeout).await
    }

    /// Borrow a connection, waiting up to `wait` for admission.
    ///
    /// Fails with `PoolExhausted` on timeout, `BackendUnavailable` when a new
    /// connection cannot be created and `PoolClosed` after shutdown. A failed
    /// or cancelled acquire holds no permit and leaves no connection behind.
    pub async fn acquire_timeout(&self, wait: Duration) -> Result<Conn<F>> {
        let shared = &self.shared;
        if shared.core.is_closed() {
            return Err(PoolError::PoolClosed);
        }

        let permit = match shared.gate.acquire_permit(wait).await {
            Admission::Granted(permit) => permit,
            Admission::TimedOut => {
                shared.counters.record_exhausted();
                debug!("No connection available within {:?}", wait);
                return Err(PoolError::PoolExhausted { timeout: wait });
            }
            Admission::Closed => return Err(PoolError::PoolClosed),
        };

        let (checkout, dead) = shared.core.take_idle_or_reserve();
        if !dead.is_empty() {
            shared.destroy_detached(dead);
        }

        match checkout {
            Checkout::Idle(conn) => {
                permit.commit();
                shared.counters.record_acquired();
                debug!("Lent idle connection {}", conn.id());
                Ok(conn)
            }
            Checkout::Reserved => {
                let reservation = Reservation::new(&shared.core);
                match shared.factory.create().await {
                    Ok(conn) => {
                        reservation.confirm(&conn);
                        permit.commit();
                        shared.counters.record_created();
                        shared.counters.record_acquired();
                        debug!("Lent new connection {}", conn.id());
                        Ok(conn)
                    }
                    Err(e) => {
                        drop(reservation);
                        drop(permit);
                        shared.counters.record_creation_failure();
                        warn!("Failed to create connection: {}", e);
                        Err(e)
                    }
                }
            }
            Checkout::Closed => Err(PoolError::PoolClosed),
        }
    }

    /// Borrow a connection wrapped in a guard that releases it on drop.
    pub async fn get(&self) -> Result<PooledConnection<F>> {
        let conn = self.acquire().await?;
        Ok(PooledConnection::new(conn, self.clone()))
    }

    /// Like `get`, waiting up to `wait` for admission.
    pub async fn get_timeout(&self, wait: Duration) -> Result<PooledConnection<F>> {
        let conn = self.acquire_timeout(wait).await?;
        Ok(PooledConnection::new(conn, self.clone()))
    }

    /// Hand a healthy connection back. Never fails: a closed connection is
    /// discarded, and one this pool did not lend is destroyed without
    /// touching the ledger.
    pub async fn release(&self, conn: Conn<F>) {
        if let Some(conn) = self.shared.release_inner(conn) {
            self.shared.destroy(conn).await;
        }
    }

    /// Release from a synchronous context, such as a guard's `Drop`. Any
    /// destruction runs on a spawned task.
    pub(crate) fn release_detached(&self, conn: Conn<F>) {
        if let Some(conn) = self.shared.release_inner(conn) {
            self.shared.destroy_detached(vec![conn]);
        }
    }

    /// Report a misbehaving connection: destroy it, return its permit and
    /// try to create one replacement for the idle set.
    pub async fn invalidate(&self, conn: Conn<F>) {
        let shared = &self.shared;
        let id = conn.id();

        let was_lent = shared.core.record_invalidated(id);
        if was_lent {
            shared.gate.release_permit();
            shared.counters.record_invalidated();
            debug!("Invalidated connection {}", id);
        } else {
            warn!("Invalidated connection {} was not lent by this pool", id);
        }

        shared.destroy(conn).await;

        if was_lent {
            if let Err(e) = shared.replenish().await {
                warn!("Failed to replace invalidated connection {}: {}", id, e);
            }
        }
    }

    /// Run one reclamation pass now. Returns how many idle connections were
    /// destroyed.
    pub async fn reclaim_now(&self) -> usize {
        self.shared.reclaim().await
    }

    /// Point-in-time snapshot. Holds the core lock only to read two counts.
    pub fn stats(&self) -> PoolStats {
        let shared = &self.shared;
        let (lent, idle) = shared.core.counts();
        let mut stats = PoolStats {
            lent,
            idle,
            total: lent + idle,
            waiting: shared.gate.waiting(),
            max_total: shared.config.max_total,
            min_idle: shared.config.min_idle,
            ..PoolStats::default()
        };
        shared.counters.fill(&mut stats);
        stats
    }

    /// Permits currently held by callers.
    pub fn outstanding_permits(&self) -> usize {
        self.shared.gate.outstanding()
    }

    pub fn is_closed(&self) -> bool {
        self.shared.core.is_closed()
    }

    /// Stop the reclamation task and destroy every idle connection. Later
    /// acquires fail with `PoolClosed`; connections still lent are destroyed
    /// when they come back.
    pub async fn shutdown(&self) {
        let shared = &self.shared;
        if let Some(reclaimer) = shared.reclaimer.lock().await.take() {
            reclaimer.stop().await;
        }

        let idle = shared.core.drain_all();
        shared.gate.close();

        let (lent, _) = shared.core.counts();
        info!(
            "Connection pool shutting down: destroying {} idle connections, {} still lent",
            idle.len(),
            lent
        );
        shared.destroy_all(idle).await;
    }
}

impl<F: ConnectionFactory> PoolShared<F> {
    fn release_inner(&self, conn: Conn<F>) -> Option<Conn<F>> {
        let id = conn.id();
        match self.core.record_returned(conn) {
            Returned::Pooled => {
                self.gate.release_permit();
                self.counters.record_released();
                debug!("Connection {} returned to idle", id);
                None
            }
            Returned::Discarded(conn) => {
                self.gate.release_permit();
                self.counters.record_released();
                if conn.is_closed() {
                    warn!("Released connection {} is closed; discarding", id);
                } else {
                    debug!("Discarding released connection {}", id);
                }
                Some(conn)
            }
            Returned::NotLent(conn) => {
                warn!("Connection {} was not lent by this pool; ignoring release", id);
                Some(conn)
            }
        }
    }

    /// Create one connection for the idle set if there is room. `Ok(false)`
    /// means there was no room.
    async fn replenish(&self) -> Result<bool> {
        if !self.core.reserve_refill() {
            return Ok(false);
        }

        let refill = Refill::new(&self.core);
        let conn = match self.factory.create().await {
            Ok(conn) => conn,
            Err(e) => {
                self.counters.record_creation_failure();
                return Err(e);
            }
        };
        self.counters.record_created();

        match refill.finish(conn) {
            None => Ok(true),
            Some(surplus) => {
                self.destroy(surplus).await;
                Ok(false)
            }
        }
    }

    /// Best-effort destruction; failures are logged only.
    async fn destroy(&self, conn: Conn<F>) {
        let id = conn.id();
        if let Err(e) = self.factory.destroy(conn).await {
            warn!("Failed to destroy connection {}: {}", id, e);
        }
        self.counters.record_destroyed();
    }

    async fn destroy_all(&self, conns: Vec<Conn<F>>) {
        for conn in conns {
            self.destroy(conn).await;
        }
    }

    fn destroy_detached(self: &Arc<Self>, conns: Vec<Conn<F>>) {
        match Handle::try_current() {
            Ok(handle) => {
                let shared = Arc::clone(self);
                handle.spawn(async move {
                    shared.destroy_all(conns).await;
                });
            }
            Err(_) => {
                warn!(
                    "No runtime available; dropping {} connections without closing them",
                    conns.len()
                );
            }
        }
    }
}

#[async_trait]
impl<F: ConnectionFactory> Reclaim for PoolShared<F> {
    async fn reclaim(&self) -> usize {
        let surplus = self.core.trim_idle_to(self.config.min_idle);
        let count = surplus.len();
        self.destroy_all(surplus).await;
        count
    }
}

/// A reserved lent slot, cancelled unless confirmed.
struct Reservation<'a, C: Connection> {
    core: &'a PoolCore<C>,
    armed: bool,
}

impl<'a, C: Connection> Reservation<'a, C> {
    fn new(core: &'a PoolCore<C>) -> Self {
        Self { core, armed: true }
    }

    fn confirm(mut self, conn: &C) {
        self.core.confirm_reserved(conn.id());
        self.armed = false;
    }
}

impl<C: Connection> Drop for Reservation<'_, C> {
    fn drop(&mut self) {
        if self.armed {
            self.core.cancel_reserved();
        }
    }
}

/// A claimed refill slot, released unless finished.
struct Refill<'a, C: Connection> {
    core: &'a PoolCore<C>,
    armed: bool,
}

impl<'a, C: Connection> Refill<'a, C> {
    fn new(core: &'a PoolCore<C>) -> Self {
        Self { core, armed: true }
    }

    fn finish(mut self, conn: C) -> Option<C> {
        self.armed = false;
        self.core.finish_refill(conn)
    }
}

impl<C: Connection> Drop for Refill<'_, C> {
    fn drop(&mut self) {
        if self.armed {
            self.core.cancel_refill();
        }
    }
}
