// src/pool/core.rs

//! Pool bookkeeping: the idle free list and the lent ledger.
//!
//! Every method takes the state lock for a few pointer and counter updates
//! and, when popping idle entries, a non-blocking liveness check. Connections
//! that must be destroyed are handed back to the caller so the factory runs
//! after the lock is gone.
//!
//! Invariant: `lent + idle <= max_total`, where `lent` counts both confirmed
//! connections and reserved slots whose connection is still being created.

use crate::pool::connection::{Connection, ConnectionId};
use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{debug, warn};

/// Result of trying to lend a connection.
pub enum Checkout<C> {
    /// A warm idle connection, already recorded as lent.
    Idle(C),
    /// No idle connection; a lent slot is reserved for one about to be created.
    Reserved,
    /// The pool has been drained.
    Closed,
}

/// Result of handing a connection back.
pub enum Returned<C> {
    /// Back on the idle list.
    Pooled,
    /// Un-lent but not kept (closed, pool drained or no room); destroy it.
    Discarded(C),
    /// Not on the lent ledger; nothing was changed.
    NotLent(C),
}

struct CoreState<C> {
    /// LIFO free list: the back is the most recently returned.
    idle: Vec<C>,
    lent: HashSet<ConnectionId>,
    reserved: usize,
    pending_refills: usize,
    closed: bool,
}

impl<C> CoreState<C> {
    fn lent_count(&self) -> usize {
        self.lent.len() + self.reserved
    }

    fn occupied(&self) -> usize {
        self.idle.len() + self.lent_count()
    }
}

/// Idle set plus lent ledger behind a single lock.
pub struct PoolCore<C> {
    state: Mutex<CoreState<C>>,
    max_total: usize,
}

impl<C: Connection> PoolCore<C> {
    pub fn new(max_total: usize) -> Self {
        Self {
            state: Mutex::new(CoreState {
                idle: Vec::with_capacity(max_total),
                lent: HashSet::with_capacity(max_total),
                reserved: 0,
                pending_refills: 0,
                closed: false,
            }),
            max_total,
        }
    }

    fn state(&self) -> MutexGuard<'_, CoreState<C>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Lend the most recently returned live connection, or reserve a slot for
    /// a new one. Idle connections found closed on the way are returned in
    /// the second element for destruction.
    pub fn take_idle_or_reserve(&self) -> (Checkout<C>, Vec<C>) {
        let mut state = self.state();
        let mut dead = Vec::new();
        if state.closed {
            return (Checkout::Closed, dead);
        }

        while let Some(conn) = state.idle.pop() {
            if conn.is_closed() {
                debug!("Dropping closed idle connection {}", conn.id());
                dead.push(conn);
                continue;
            }
            state.lent.insert(conn.id());
            return (Checkout::Idle(conn), dead);
        }

        state.reserved += 1;
        (Checkout::Reserved, dead)
    }

    /// A reserved slot now holds a created connection.
    pub fn confirm_reserved(&self, id: ConnectionId) {
        let mut state = self.state();
        state.reserved = state.reserved.saturating_sub(1);
        state.lent.insert(id);
    }

    /// Creation for a reserved slot failed or was abandoned.
    pub fn cancel_reserved(&self) {
        let mut state = self.state();
        if state.reserved == 0 {
            warn!("Cancelled a reservation that was never made");
            return;
        }
        state.reserved -= 1;
    }

    /// Take a connection off the lent ledger and keep it idle if possible.
    pub fn record_returned(&self, conn: C) -> Returned<C> {
        let live = !conn.is_closed();
        let mut state = self.state();

        if !state.lent.remove(&conn.id()) {
            return Returned::NotLent(conn);
        }
        if !live || state.closed || state.occupied() >= self.max_total {
            return Returned::Discarded(conn);
        }

        state.idle.push(conn);
        Returned::Pooled
    }

    /// Take a broken connection off the lent ledger. Returns false if it was
    /// never lent.
    pub fn record_invalidated(&self, id: ConnectionId) -> bool {
        self.state().lent.remove(&id)
    }

    /// Claim room for one replacement connection.
    pub fn reserve_refill(&self) -> bool {
        let mut state = self.state();
        if state.closed || state.occupied() + state.pending_refills >= self.max_total {
            return false;
        }
        state.pending_refills += 1;
        true
    }

    /// Place a replacement on the idle list. Hands it back if there is no
    /// longer room for it.
    pub fn finish_refill(&self, conn: C) -> Option<C> {
        let mut state = self.state();
        state.pending_refills = state.pending_refills.saturating_sub(1);
        if state.closed || state.occupied() >= self.max_total {
            return Some(conn);
        }
        state.idle.push(conn);
        None
    }

    pub fn cancel_refill(&self) {
        let mut state = self.state();
        state.pending_refills = state.pending_refills.saturating_sub(1);
    }

    /// Remove idle connections above `floor`, oldest first.
    pub fn trim_idle_to(&self, floor: usize) -> Vec<C> {
        let mut state = self.state();
        let excess = state.idle.len().saturating_sub(floor);
        state.idle.drain(..excess).collect()
    }

    /// Close the pool to further lending and hand back every idle connection.
    pub fn drain_all(&self) -> Vec<C> {
        let mut state = self.state();
        state.closed = true;
        state.idle.drain(..).collect()
    }

    pub fn is_closed(&self) -> bool {
        self.state().closed
    }

    /// `(lent, idle)` at this instant.
    pub fn counts(&self) -> (usize, usize) {
        let state = self.state();
        (state.lent_count(), state.idle.len())
    }
}
