//! # gradine: Schema Migration Runner
//!
//! Applies and reverts ordered, reversible schema changes against a
//! relational store. Migrations are registered as code units, each with
//! an up and a down operation; the executor runs them in strict
//! identifier order, one scoped transaction per unit, under an advisory
//! lock so concurrent runners cannot race on the same record store.

pub mod definitions;
pub mod error;
pub mod loader;
pub mod runner;
pub mod schema;
pub mod store;

// Re-export core traits and types
pub use definitions::*;
pub use error::*;
pub use loader::*;
pub use runner::*;
pub use schema::*;
pub use store::*;
