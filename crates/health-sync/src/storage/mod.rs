//! Storage traits and implementations
//!
//! This module defines the persistence layer for sync jobs. The trait-based
//! design allows swapping between in-memory and SQLite storage.

mod memory;
mod sqlite;
mod traits;

pub use memory::InMemoryJobStore;
pub use sqlite::SqliteJobStore;
pub use traits::JobStore;
