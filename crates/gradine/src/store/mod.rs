//! Record store backends
//!
//! The record store persists which migrations have been applied and
//! hands out the scoped transaction each unit executes in. Two
//! implementations: PostgreSQL (sqlx) and in-memory.

pub mod core;
pub mod memory;
pub mod postgres;

pub use core::{RecordStore, UnitTransaction};
pub use memory::MemoryStore;
pub use postgres::PostgresStore;
