//! SQLite persistence for subscribers and announcements.
//!
//! [`SqliteStore`] implements the `ntb-core` store ports on top of
//! [`Database`], which owns the connection and runs migrations on open.

pub mod announcements;
pub mod database;
pub mod error;
pub mod migrations;
mod rows;
pub mod store;
pub mod subscribers;

pub use database::Database;
pub use error::StoreError;
pub use store::SqliteStore;
