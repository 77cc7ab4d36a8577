//! # warden-store
//!
//! `SQLite` plumbing shared by the durable adapters: an `r2d2` connection
//! pool with WAL pragmas and the schema migration runner. The rate-limit
//! and conversation adapters live next to their ports in `warden-ratelimit`
//! and `warden-memory`.

#![deny(unsafe_code)]

pub mod connection;
pub mod errors;
pub mod migrations;

pub use connection::{ConnectionConfig, ConnectionPool, PooledConnection, open_pool};
pub use errors::{Result, StoreError};
pub use migrations::run_migrations;
pub use r2d2::Error as PoolError;
