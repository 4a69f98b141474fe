//! Migrator - executes exactly one migration in one direction
//!
//! The migrator owns the per-unit lifecycle: open a transaction when the
//! entry allows it, run the body, write the ledger, commit. A failure inside
//! the transaction rolls back both the schema change and the ledger row, so
//! the two can never drift apart. Non-transactional failures are wrapped as
//! partial applies because nothing was undone.

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::database::DatabaseConnection;
use crate::definitions::{MigrationContext, MigrationDirection};
use crate::error::{MigrateError, MigrateResult};
use crate::events::{NullObserver, ProgressObserver};
use crate::history::HistoryStore;
use crate::registry::ResolvedMigration;

/// Single-unit migration executor
pub struct Migrator {
    history: Arc<HistoryStore>,
    observer: Arc<dyn ProgressObserver>,
}

impl Migrator {
    /// Create a migrator over the given ledger; events are dropped until an
    /// observer is attached
    pub fn new(history: Arc<HistoryStore>) -> Self {
        Self {
            history,
            observer: Arc::new(NullObserver),
        }
    }

    /// Attach a progress observer
    pub fn with_observer(mut self, observer: Arc<dyn ProgressObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Apply a migration and record it in the ledger
    pub async fn apply(
        &self,
        migration: &ResolvedMigration,
        conn: &mut dyn DatabaseConnection,
    ) -> MigrateResult<Duration> {
        self.run(migration, MigrationDirection::Up, conn).await
    }

    /// Revert a migration and delete its ledger row
    ///
    /// Fails fast with [`MigrateError::NotRevertible`] before any database
    /// contact when the entry was registered as irreversible.
    pub async fn revert(
        &self,
        migration: &ResolvedMigration,
        conn: &mut dyn DatabaseConnection,
    ) -> MigrateResult<Duration> {
        if !migration.revertible {
            return Err(MigrateError::NotRevertible {
                identifier: migration.identifier.clone(),
            });
        }
        self.run(migration, MigrationDirection::Down, conn).await
    }

    async fn run(
        &self,
        migration: &ResolvedMigration,
        direction: MigrationDirection,
        conn: &mut dyn DatabaseConnection,
    ) -> MigrateResult<Duration> {
        // table creation must not end up inside the unit's transaction
        self.history.ensure_table(conn).await?;

        self.observer
            .migration_started(&migration.identifier, direction);
        let started = Instant::now();

        let outcome = self.execute(migration, direction, conn).await;
        let elapsed = started.elapsed();

        self.observer.migration_finished(
            &migration.identifier,
            direction,
            elapsed,
            outcome.is_ok(),
        );

        match outcome {
            Ok(()) => {
                tracing::info!(
                    "migration {} {} in {} ms",
                    migration.identifier,
                    match direction {
                        MigrationDirection::Up => "applied",
                        MigrationDirection::Down => "reverted",
                    },
                    elapsed.as_millis()
                );
                Ok(elapsed)
            }
            Err(err) => {
                tracing::warn!(
                    "migration {} failed {} after {} ms: {}",
                    migration.identifier,
                    direction.as_str(),
                    elapsed.as_millis(),
                    err
                );
                Err(err)
            }
        }
    }

    async fn execute(
        &self,
        migration: &ResolvedMigration,
        direction: MigrationDirection,
        conn: &mut dyn DatabaseConnection,
    ) -> MigrateResult<()> {
        if migration.transactional {
            conn.begin().await?;
            match self.execute_inner(migration, direction, conn).await {
                Ok(()) => conn.commit().await,
                Err(err) => {
                    if let Err(rollback_err) = conn.rollback().await {
                        tracing::warn!(
                            "rollback after failed migration {} also failed: {}",
                            migration.identifier,
                            rollback_err
                        );
                    }
                    Err(err)
                }
            }
        } else {
            match self.execute_inner(migration, direction, conn).await {
                Ok(()) => Ok(()),
                // ledger desync keeps its own error shape so operators can
                // tell it apart from a half-finished schema change
                Err(err @ MigrateError::AlreadyApplied { .. })
                | Err(err @ MigrateError::NotApplied { .. }) => Err(err),
                Err(err) => Err(MigrateError::PartialApply {
                    identifier: migration.identifier.clone(),
                    source: Box::new(err),
                }),
            }
        }
    }

    async fn execute_inner(
        &self,
        migration: &ResolvedMigration,
        direction: MigrationDirection,
        conn: &mut dyn DatabaseConnection,
    ) -> MigrateResult<()> {
        match direction {
            MigrationDirection::Up => {
                {
                    let mut ctx = MigrationContext::new(&mut *conn);
                    migration.instance.up(&mut ctx).await?;
                }
                self.history
                    .record_applied(conn, &migration.identifier)
                    .await
            }
            MigrationDirection::Down => {
                {
                    let mut ctx = MigrationContext::new(&mut *conn);
                    migration.instance.down(&mut ctx).await?;
                }
                self.history
                    .record_reverted(conn, &migration.identifier)
                    .await
            }
        }
    }
}

#[cfg(all(test, feature = "sqlite"))]
mod tests {
    use super::*;
    use crate::database::ConnectionProvider;
    use crate::definitions::Migration;
    use crate::registry::{MigrationEntry, MigrationRegistry, MigrationRoot};
    use crate::sqlite::SqliteConnector;

    struct CreateGadgets;

    #[async_trait::async_trait]
    impl Migration for CreateGadgets {
        async fn up(&self, ctx: &mut MigrationContext<'_>) -> MigrateResult<()> {
            let mut schema = ctx.schema();
            schema.create_table("gadgets", |table| {
                table.id("id");
                table.string("name", Some(120));
            });
            ctx.run_schema(schema).await
        }

        async fn down(&self, ctx: &mut MigrationContext<'_>) -> MigrateResult<()> {
            let mut schema = ctx.schema();
            schema.drop_table("gadgets");
            ctx.run_schema(schema).await
        }
    }

    /// Up creates gizmos; down drops the table and then fails partway
    struct RevertsHalfway;

    #[async_trait::async_trait]
    impl Migration for RevertsHalfway {
        async fn up(&self, ctx: &mut MigrationContext<'_>) -> MigrateResult<()> {
            let mut schema = ctx.schema();
            schema.create_table("gizmos", |table| {
                table.id("id");
            });
            ctx.run_schema(schema).await
        }

        async fn down(&self, ctx: &mut MigrationContext<'_>) -> MigrateResult<()> {
            ctx.execute("DROP TABLE gizmos", &[]).await?;
            ctx.execute("THIS IS NOT SQL", &[]).await?;
            Ok(())
        }
    }

    fn registry() -> MigrationRegistry {
        MigrationRegistry::new(vec![MigrationRoot::new("app")
            .register(MigrationEntry::new("M240101120000CreateGadgets", || {
                Box::new(CreateGadgets)
            }))])
    }

    async fn connect() -> Box<dyn DatabaseConnection> {
        SqliteConnector::in_memory().connect().await.unwrap()
    }

    #[tokio::test]
    async fn test_apply_writes_schema_and_ledger_together() {
        let mut conn = connect().await;
        let history = Arc::new(HistoryStore::new());
        let migrator = Migrator::new(history.clone());
        let resolved = registry().resolve("M240101120000CreateGadgets").unwrap();

        migrator.apply(&resolved, conn.as_mut()).await.unwrap();

        let tables = conn.table_names().await.unwrap();
        assert!(tables.contains(&"gadgets".to_string()));
        assert!(history
            .is_applied(conn.as_mut(), "M240101120000CreateGadgets")
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_ledger_desync_surfaces_verbatim() {
        let mut conn = connect().await;
        let history = Arc::new(HistoryStore::new());
        let migrator = Migrator::new(history.clone());
        let resolved = registry().resolve("M240101120000CreateGadgets").unwrap();

        // someone recorded the identifier behind the migrator's back
        history
            .record_applied(conn.as_mut(), "M240101120000CreateGadgets")
            .await
            .unwrap();

        let err = migrator.apply(&resolved, conn.as_mut()).await.unwrap_err();
        assert!(matches!(err, MigrateError::AlreadyApplied { .. }));

        // the transaction rolled the schema change back
        let tables = conn.table_names().await.unwrap();
        assert!(!tables.contains(&"gadgets".to_string()));
    }

    #[tokio::test]
    async fn test_revert_checks_the_flag_before_touching_the_database() {
        let mut conn = connect().await;
        let history = Arc::new(HistoryStore::new());
        let migrator = Migrator::new(history);

        let registry = MigrationRegistry::new(vec![MigrationRoot::new("app").register(
            MigrationEntry::new("M240101120000CreateGadgets", || Box::new(CreateGadgets))
                .irreversible(),
        )]);
        let resolved = registry.resolve("M240101120000CreateGadgets").unwrap();

        let err = migrator.revert(&resolved, conn.as_mut()).await.unwrap_err();
        assert!(matches!(err, MigrateError::NotRevertible { .. }));

        // nothing was created on the connection, not even the ledger table
        assert!(conn.table_names().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_non_transactional_revert_failure_reports_partial_execution() {
        let mut conn = connect().await;
        let history = Arc::new(HistoryStore::new());
        let migrator = Migrator::new(history.clone());

        let registry = MigrationRegistry::new(vec![MigrationRoot::new("app").register(
            MigrationEntry::new("M240102120000CreateGizmos", || Box::new(RevertsHalfway))
                .no_transaction(),
        )]);
        let resolved = registry.resolve("M240102120000CreateGizmos").unwrap();
        migrator.apply(&resolved, conn.as_mut()).await.unwrap();

        let err = migrator.revert(&resolved, conn.as_mut()).await.unwrap_err();
        assert!(matches!(err, MigrateError::PartialApply { .. }));
        // the failed unit was a revert, so the wording stays direction-neutral
        assert!(err.to_string().contains("partially executed"));

        // the half-finished revert is visible: table gone, ledger row intact
        assert!(!conn.table_names().await.unwrap().contains(&"gizmos".to_string()));
        assert!(history
            .is_applied(conn.as_mut(), "M240102120000CreateGizmos")
            .await
            .unwrap());
    }
}
