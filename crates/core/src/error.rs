//! Error types shared across the migration system

use thiserror::Error;

/// Convenience alias used throughout the crate
pub type MigrateResult<T> = Result<T, MigrateError>;

#[derive(Debug, Error)]
pub enum MigrateError {
    /// The caller wired the system together incorrectly
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// No registered root knows the identifier
    #[error("Migration {identifier} is not registered under any root")]
    MigrationNotFound { identifier: String },

    /// The migration was registered as irreversible
    #[error("Migration {identifier} cannot be reverted")]
    NotRevertible { identifier: String },

    /// The ledger already holds a row for this identifier
    #[error("Migration {identifier} is already recorded as applied")]
    AlreadyApplied { identifier: String },

    /// The ledger holds no row for this identifier
    #[error("Migration {identifier} is not recorded as applied")]
    NotApplied { identifier: String },

    /// A non-transactional migration failed partway, in either direction;
    /// the database needs manual inspection before migrating further
    #[error("Migration {identifier} failed outside a transaction and may have been partially executed: {source}")]
    PartialApply {
        identifier: String,
        source: Box<MigrateError>,
    },

    /// A migration body reported a failure of its own
    #[error("Migration error: {0}")]
    Migration(String),

    /// The underlying connection reported a failure
    #[error("Database error: {0}")]
    Database(String),

    /// Filesystem failure while scaffolding migration sources
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
