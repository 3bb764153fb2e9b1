//! SQLite persistence for conversation sessions and rate-limit windows.

pub mod connection;
pub mod migrations;
pub mod store;

pub use connection::{connect, connect_from_config, connect_with_settings, DbPool};
pub use store::SqliteStore;
