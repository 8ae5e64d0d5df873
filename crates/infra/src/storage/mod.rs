//! Persistent cache tier backed by SQLite

pub mod sqlite_tier;

pub use sqlite_tier::SqliteTier;
