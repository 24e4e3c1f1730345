//! SQLite backend for the Trustify certification store.
//!
//! Wraps [`tokio_rusqlite`] so all database access runs on a dedicated
//! thread without blocking the async runtime. Live subscriptions are fed from
//! an in-process broadcast channel written after every committed change.

mod encode;
mod schema;
mod store;

pub mod error;

pub use error::{Error, Result};
pub use store::{SqliteStore, SqliteSubscription};

#[cfg(test)]
mod tests;
