//! `SQLite` backend for the event store.
//!
//! - **[`connection`]**: `r2d2` pool with WAL mode, foreign keys and
//!   performance pragmas applied to every connection.
//! - **[`migrations`]**: version-tracked schema, embedded at compile time.
//! - **[`row_types`]**: the event row and JSON column helpers.
//! - **[`repositories`]**: stateless repositories, one per table.

pub mod connection;
pub mod migrations;
pub mod repositories;
pub mod row_types;

pub use connection::{
    ConnectionConfig, ConnectionPool, PooledConnection, PragmaState, new_file, new_in_memory,
    verify_pragmas,
};
pub use migrations::{current_version, latest_version, run_migrations};
