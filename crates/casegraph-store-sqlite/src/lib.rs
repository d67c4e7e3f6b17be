//! SQLite backend for the casegraph evidence store.
//!
//! Wraps [`tokio_rusqlite`] so all database access runs on a dedicated
//! thread without blocking the async runtime. The bundle writer executes
//! as a single transaction; retry-queue and run-tracking operations are
//! individual statements.

mod encode;
mod query;
mod schema;
mod store;
mod writer;

pub mod error;

pub use error::{Error, Result};
pub use store::SqliteStore;
