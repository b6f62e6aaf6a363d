//! Sync wiring for the CLI.
//!
//! The local table lives in SQLite; change tokens live in the `settings`
//! table of the same database.

mod auto_sync;
pub mod client;
mod local_store;
mod token_store;

pub use auto_sync::try_auto_sync;
pub use client::SyncClientError;
pub use local_store::SqliteLocalStore;
pub use token_store::SqliteTokenStore;
