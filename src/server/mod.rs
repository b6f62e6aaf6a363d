//! Server-side modules for the tablesync record store.

pub mod auth;
pub mod routes;
pub mod storage;

pub use auth::ApiKeyStore;
pub use routes::{router, AppState};
pub use storage::JournalStore;
