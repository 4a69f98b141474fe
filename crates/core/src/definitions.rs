//! Migration Definitions - the trait migrations implement and the records
//! the system hands back
//!
//! A migration is a plain struct implementing [`Migration`]. Everything it
//! may touch during execution comes in through a [`MigrationContext`], which
//! deliberately exposes no transaction control: the migrator decides whether
//! the unit runs inside a transaction, the body only issues statements.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::database::{DatabaseConnection, DatabaseValue, SqlDialect};
use crate::error::{MigrateError, MigrateResult};
use crate::schema::SchemaBuilder;

/// Direction a migration is executed in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MigrationDirection {
    /// Apply the migration
    Up,
    /// Revert the migration
    Down,
}

impl MigrationDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            MigrationDirection::Up => "up",
            MigrationDirection::Down => "down",
        }
    }
}

/// A single versioned schema change
///
/// `up` is mandatory. `down` has a default body that fails, so a migration
/// whose registry entry is marked irreversible never needs to mention it;
/// the migrator refuses such reverts before the body would run anyway.
#[async_trait]
pub trait Migration: Send + Sync {
    /// Apply the schema change
    async fn up(&self, ctx: &mut MigrationContext<'_>) -> MigrateResult<()>;

    /// Revert the schema change
    async fn down(&self, ctx: &mut MigrationContext<'_>) -> MigrateResult<()> {
        let _ = ctx;
        Err(MigrateError::Migration(
            "down is not implemented for this migration".to_string(),
        ))
    }
}

/// Execution context handed to a migration body
///
/// Wraps the connection the operation runs on for exactly the duration of
/// one `up` or `down` call.
pub struct MigrationContext<'a> {
    conn: &'a mut dyn DatabaseConnection,
}

impl<'a> MigrationContext<'a> {
    pub(crate) fn new(conn: &'a mut dyn DatabaseConnection) -> Self {
        Self { conn }
    }

    /// Execute a statement, returning the affected row count
    pub async fn execute(&mut self, sql: &str, params: &[DatabaseValue]) -> MigrateResult<u64> {
        self.conn.execute(sql, params).await
    }

    /// Run a query, returning positional result rows
    pub async fn query(
        &mut self,
        sql: &str,
        params: &[DatabaseValue],
    ) -> MigrateResult<Vec<Vec<DatabaseValue>>> {
        self.conn.query(sql, params).await
    }

    /// The dialect of the underlying connection
    pub fn dialect(&self) -> SqlDialect {
        self.conn.dialect()
    }

    /// Start a schema builder seeded with this connection's dialect
    pub fn schema(&self) -> SchemaBuilder {
        SchemaBuilder::new(self.dialect())
    }

    /// Execute every statement accumulated in a schema builder, in order
    pub async fn run_schema(&mut self, schema: SchemaBuilder) -> MigrateResult<()> {
        for statement in schema.to_sql() {
            self.conn.execute(&statement, &[]).await?;
        }
        Ok(())
    }
}

/// Ledger row for a migration that has been applied
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AppliedMigration {
    /// Migration identifier
    pub identifier: String,
    /// When the migration was recorded as applied
    pub applied_at: DateTime<Utc>,
}

/// One migration that completed during a runner pass
#[derive(Debug, Clone, Serialize)]
pub struct MigrationRun {
    /// Migration identifier
    pub identifier: String,
    /// Direction it was executed in
    pub direction: MigrationDirection,
    /// Execution time in milliseconds
    pub elapsed_ms: u128,
}

/// The failure that stopped a runner pass
#[derive(Debug)]
pub struct MigrationFailure {
    /// Identifier of the migration that failed
    pub identifier: String,
    /// What went wrong
    pub error: MigrateError,
}

/// Outcome of an update pass
#[derive(Debug)]
pub struct UpdateReport {
    /// Migrations applied before the pass ended
    pub applied: Vec<MigrationRun>,
    /// The failure that stopped the pass, if any
    pub failure: Option<MigrationFailure>,
    /// Total execution time in milliseconds
    pub elapsed_ms: u128,
}

impl UpdateReport {
    /// True when every selected migration was applied
    pub fn is_success(&self) -> bool {
        self.failure.is_none()
    }
}

/// Outcome of a rollback pass
#[derive(Debug)]
pub struct RollbackReport {
    /// Migrations reverted before the pass ended
    pub reverted: Vec<MigrationRun>,
    /// The failure that stopped the pass, if any
    pub failure: Option<MigrationFailure>,
    /// Total execution time in milliseconds
    pub elapsed_ms: u128,
}

impl RollbackReport {
    /// True when every selected migration was reverted
    pub fn is_success(&self) -> bool {
        self.failure.is_none()
    }
}
