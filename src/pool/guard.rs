// src/pool/guard.rs

//! Scoped acquisition.

use crate::pool::connection::ConnectionFactory;
use crate::pool::facade::ConnectionPool;
use std::ops::{Deref, DerefMut};

/// A connection borrowed from the pool.
///
/// Finish with `release` or `invalidate`. Dropping the guard without either
/// releases the connection, so exactly one of the two happens on every exit
/// path.
pub struct PooledConnection<F: ConnectionFactory> {
    conn: Option<F::Connection>,
    pool: ConnectionPool<F>,
}

impl<F: ConnectionFactory> PooledConnection<F> {
    pub(crate) fn new(conn: F::Connection, pool: ConnectionPool<F>) -> Self {
        Self {
            conn: Some(conn),
            pool,
        }
    }

    /// Return the connection to the pool.
    pub async fn release(mut self) {
        if let Some(conn) = self.conn.take() {
            self.pool.release(conn).await;
        }
    }

    /// Report the connection broken.
    pub async fn invalidate(mut self) {
        if let Some(conn) = self.conn.take() {
            self.pool.invalidate(conn).await;
        }
    }

    /// Take the connection out of the guard. The caller becomes responsible
    /// for calling `release` or `invalidate` on the pool.
    pub fn detach(mut self) -> F::Connection {
        self.conn.take().expect("connection already returned")
    }
}

impl<F: ConnectionFactory> Deref for PooledConnection<F> {
    type Target = F::Connection;

    fn deref(&self) -> &Self::Target {
        self.conn.as_ref().expect("connection already returned")
    }
}

impl<F: ConnectionFactory> DerefMut for PooledConnection<F> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.conn.as_mut().expect("connection already returned")
    }
}

impl<F: ConnectionFactory> Drop for PooledConnection<F> {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            self.pool.release_detached(conn);
        }
    }
}
