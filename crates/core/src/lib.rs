//! # strata-core: Versioned Schema Migrations
//!
//! Migrations are plain structs registered in code. The registry knows what
//! exists, the history ledger knows what ran, the migrator executes one unit
//! at a time, and the runners sequence whole passes. The service ties the
//! pieces together for embedding applications; the CLI in `strata-cli` is
//! one such embedder.
//!
//! Database access goes through the object-safe traits in [`database`]; the
//! bundled SQLite backend (feature `sqlite`, on by default) keeps tests and
//! small deployments self-contained.

pub mod database;
pub mod definitions;
pub mod error;
pub mod events;
pub mod history;
pub mod migrator;
pub mod registry;
pub mod runner;
pub mod schema;
pub mod service;

#[cfg(feature = "sqlite")]
pub mod sqlite;

// Re-export the working surface
pub use database::*;
pub use definitions::*;
pub use error::*;
pub use events::*;
pub use history::*;
pub use migrator::*;
pub use registry::*;
pub use runner::*;
pub use schema::*;
pub use service::*;

#[cfg(feature = "sqlite")]
pub use sqlite::*;
