// src/lib.rs

//! connpool: a bounded, task-safe pool of backend connections.
//!
//! Admission is bounded by a counting gate sized to the ceiling, the idle
//! set is a LIFO free list trimmed toward a floor by a background task, and
//! every path that takes a permit gives exactly one back.

pub mod common;
pub mod config;
pub mod logging;
pub mod pool;

pub use common::error::{PoolError, Result};
pub use config::{BackendConfig, PoolConfig, Settings};
pub use pool::{
    Connection, ConnectionFactory, ConnectionId, ConnectionPool, PoolStats, PooledConnection,
    TcpConnection, TcpConnectionFactory,
};
