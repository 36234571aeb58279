// src/pool/mod.rs

//! Bounded connection pooling.
//!
//! Callers go through `ConnectionPool`: a permit from the admission gate
//! first, then an idle connection or a fresh one from the factory. A
//! background task trims idle inventory back to the floor.

mod connection;
mod core;
mod facade;
mod gate;
mod guard;
mod reclaim;
mod stats;

pub use connection::{Connection, ConnectionFactory, ConnectionId, TcpConnection, TcpConnectionFactory};
pub use facade::ConnectionPool;
pub use gate::{Admission, AdmissionGate, GatePermit};
pub use guard::PooledConnection;
pub use reclaim::{Reclaim, Reclaimer};
pub use stats::PoolStats;
