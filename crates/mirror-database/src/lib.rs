//! SQLite storage layer for the chain mirror.
//!
//! This crate provides:
//! - The mirror schema and its migrations
//! - [`schema::TableSpec`] descriptors naming each table's key columns
//! - Keyed mutation primitives (insert, upsert, update-by-key,
//!   delete-by-key) over flat JSON rows
//! - Flusher bookkeeping (last committed block height)
//! - An async executor with a dedicated SQLite thread
//!
//! # Architecture
//!
//! Every mutation function takes a `&rusqlite::Connection`, so the same code
//! runs against a [`Database`] in tests and inside [`AsyncDatabase::call`]
//! in the binary. Transactions are opened by the caller; nothing in this
//! crate commits on its own.

mod db;
mod error;
mod executor;
mod migrations;
pub mod mutations;
pub mod queries;
pub mod schema;

pub use db::Database;
pub use error::{DatabaseError, DatabaseResult};
pub use executor::{from_tokio_rusqlite, AsyncDatabase};
pub use migrations::{run_migrations, schema_version, CURRENT_VERSION};
pub use mutations::Row;
pub use schema::TableSpec;
