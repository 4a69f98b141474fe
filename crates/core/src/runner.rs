//! Runners - sequence whole passes of migrations through the migrator
//!
//! Runners decide which migrations run and in what order; the migrator does
//! the per-unit work. A pass stops at the first failure and reports what
//! completed before it. There is no compensating rollback across units:
//! everything already committed stays committed.
//!
//! Both runners refuse to start without a progress observer. Schema changes
//! are too consequential to run with no output at all, so wiring a sink is
//! part of configuring a runner, not an optional nicety.

use std::sync::Arc;
use std::time::Instant;

use crate::database::DatabaseConnection;
use crate::definitions::{
    MigrationDirection, MigrationFailure, MigrationRun, RollbackReport, UpdateReport,
};
use crate::error::{MigrateError, MigrateResult};
use crate::events::ProgressObserver;
use crate::migrator::Migrator;
use crate::registry::ResolvedMigration;
use crate::service::MigrationService;

/// How many pending migrations an update pass may apply
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateLimit {
    /// Apply everything that is pending
    All,
    /// Apply at most this many, oldest first
    Count(usize),
}

/// Applies pending migrations in ascending identifier order
pub struct UpdateRunner {
    observer: Option<Arc<dyn ProgressObserver>>,
}

impl UpdateRunner {
    pub fn new() -> Self {
        Self { observer: None }
    }

    /// Attach the observer the pass reports through; mandatory before `run`
    pub fn with_observer(mut self, observer: Arc<dyn ProgressObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Apply pending migrations, stopping at the first failure
    pub async fn run(
        &self,
        service: &MigrationService,
        conn: &mut dyn DatabaseConnection,
        limit: UpdateLimit,
    ) -> MigrateResult<UpdateReport> {
        let observer = self.require_observer()?;
        let started = Instant::now();

        let mut pending = service.new_migrations(conn).await?;
        if let UpdateLimit::Count(count) = limit {
            pending.truncate(count);
        }
        let identifiers: Vec<String> = pending.into_iter().map(|unit| unit.identifier).collect();

        let (applied, failure) = self
            .apply_sequence(service, conn, &identifiers, observer)
            .await?;

        Ok(UpdateReport {
            applied,
            failure,
            elapsed_ms: started.elapsed().as_millis(),
        })
    }

    /// Apply an explicit identifier sequence in the given order
    ///
    /// Used by redo to re-apply what a rollback pass just reverted.
    pub async fn run_identifiers(
        &self,
        service: &MigrationService,
        conn: &mut dyn DatabaseConnection,
        identifiers: &[String],
    ) -> MigrateResult<UpdateReport> {
        let observer = self.require_observer()?;
        let started = Instant::now();

        let (applied, failure) = self
            .apply_sequence(service, conn, identifiers, observer)
            .await?;

        Ok(UpdateReport {
            applied,
            failure,
            elapsed_ms: started.elapsed().as_millis(),
        })
    }

    async fn apply_sequence(
        &self,
        service: &MigrationService,
        conn: &mut dyn DatabaseConnection,
        identifiers: &[String],
        observer: Arc<dyn ProgressObserver>,
    ) -> MigrateResult<(Vec<MigrationRun>, Option<MigrationFailure>)> {
        let migrator = Migrator::new(service.history()).with_observer(observer);
        let mut applied = Vec::new();

        for identifier in identifiers {
            let resolved = match service.registry().resolve(identifier) {
                Ok(resolved) => resolved,
                Err(error) => {
                    return Ok((
                        applied,
                        Some(MigrationFailure {
                            identifier: identifier.clone(),
                            error,
                        }),
                    ));
                }
            };

            match migrator.apply(&resolved, conn).await {
                Ok(elapsed) => applied.push(MigrationRun {
                    identifier: identifier.clone(),
                    direction: MigrationDirection::Up,
                    elapsed_ms: elapsed.as_millis(),
                }),
                Err(error) => {
                    return Ok((
                        applied,
                        Some(MigrationFailure {
                            identifier: identifier.clone(),
                            error,
                        }),
                    ));
                }
            }
        }

        Ok((applied, None))
    }

    fn require_observer(&self) -> MigrateResult<Arc<dyn ProgressObserver>> {
        self.observer.clone().ok_or_else(|| {
            MigrateError::Configuration(
                "update runner has no progress observer configured".to_string(),
            )
        })
    }
}

impl Default for UpdateRunner {
    fn default() -> Self {
        Self::new()
    }
}

/// Reverts the most recently applied migrations, newest first
pub struct DownRunner {
    observer: Option<Arc<dyn ProgressObserver>>,
}

impl DownRunner {
    pub fn new() -> Self {
        Self { observer: None }
    }

    /// Attach the observer the pass reports through; mandatory before `run`
    pub fn with_observer(mut self, observer: Arc<dyn ProgressObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Revert the `count` most recent ledger entries, stopping at the first
    /// failure
    ///
    /// Order comes from the ledger's insertion sequence, so migrations that
    /// were applied out of identifier order still unwind in reverse
    /// application order.
    pub async fn run(
        &self,
        service: &MigrationService,
        conn: &mut dyn DatabaseConnection,
        count: usize,
    ) -> MigrateResult<RollbackReport> {
        let observer = self.require_observer()?;
        let started = Instant::now();

        let recent = service.history().applied(conn, Some(count)).await?;
        let migrator = Migrator::new(service.history()).with_observer(observer);
        let mut reverted = Vec::new();
        let mut failure = None;

        for record in recent {
            let resolved: ResolvedMigration = match service.registry().resolve(&record.identifier)
            {
                Ok(resolved) => resolved,
                Err(error) => {
                    failure = Some(MigrationFailure {
                        identifier: record.identifier.clone(),
                        error,
                    });
                    break;
                }
            };

            match migrator.revert(&resolved, conn).await {
                Ok(elapsed) => reverted.push(MigrationRun {
                    identifier: record.identifier.clone(),
                    direction: MigrationDirection::Down,
                    elapsed_ms: elapsed.as_millis(),
                }),
                Err(error) => {
                    failure = Some(MigrationFailure {
                        identifier: record.identifier.clone(),
                        error,
                    });
                    break;
                }
            }
        }

        Ok(RollbackReport {
            reverted,
            failure,
            elapsed_ms: started.elapsed().as_millis(),
        })
    }

    fn require_observer(&self) -> MigrateResult<Arc<dyn ProgressObserver>> {
        self.observer.clone().ok_or_else(|| {
            MigrateError::Configuration(
                "down runner has no progress observer configured".to_string(),
            )
        })
    }
}

impl Default for DownRunner {
    fn default() -> Self {
        Self::new()
    }
}
