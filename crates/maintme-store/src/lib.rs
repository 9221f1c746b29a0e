//! SQLite persistence for maintme subscribers, filters and conditions.

mod sqlite;

pub use sqlite::SqliteStore;
