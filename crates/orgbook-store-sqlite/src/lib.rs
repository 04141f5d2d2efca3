//! SQLite backend for the OrgBook credential registry.
//!
//! Wraps [`tokio_rusqlite`] so all database access runs on a dedicated thread
//! without blocking the async runtime. Every ingest runs in one `IMMEDIATE`
//! transaction on that thread.

mod encode;
mod schema;
mod store;
mod upsert;

pub mod error;

pub use error::{Error, Result};
pub use store::SqliteStore;
