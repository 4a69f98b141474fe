//! Progress Events - observer hooks around each migration operation
//!
//! The migrator reports through this seam instead of printing. Library
//! embedders plug in their own sink; the CLI ships a console reporter.

use std::time::Duration;

use crate::definitions::MigrationDirection;

/// Receives begin and end notifications for every migration operation
///
/// Default method bodies drop the events, so implementors only override what
/// they care about. Observers must not assume success: `migration_finished`
/// fires for failed operations too, with `success` set accordingly.
pub trait ProgressObserver: Send + Sync {
    /// A migration operation is about to run
    fn migration_started(&self, identifier: &str, direction: MigrationDirection) {
        let _ = (identifier, direction);
    }

    /// A migration operation finished, successfully or not
    fn migration_finished(
        &self,
        identifier: &str,
        direction: MigrationDirection,
        elapsed: Duration,
        success: bool,
    ) {
        let _ = (identifier, direction, elapsed, success);
    }
}

/// Observer that discards every event
#[derive(Debug, Default, Clone, Copy)]
pub struct NullObserver;

impl ProgressObserver for NullObserver {}
