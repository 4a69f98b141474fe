//! Console progress reporting for migration passes

use std::time::Duration;

use strata_core::{MigrationDirection, ProgressObserver};

/// Prints migrator progress to stdout as each unit starts and finishes
pub struct ConsoleReporter;

impl ProgressObserver for ConsoleReporter {
    fn migration_started(&self, identifier: &str, direction: MigrationDirection) {
        match direction {
            MigrationDirection::Up => println!("🌱 Applying {}...", identifier),
            MigrationDirection::Down => println!("🔄 Reverting {}...", identifier),
        }
    }

    fn migration_finished(
        &self,
        identifier: &str,
        direction: MigrationDirection,
        elapsed: Duration,
        success: bool,
    ) {
        if success {
            let verb = match direction {
                MigrationDirection::Up => "applied",
                MigrationDirection::Down => "reverted",
            };
            println!("✅ {} {} ({} ms)", identifier, verb, elapsed.as_millis());
        } else {
            println!(
                "❌ {} failed {} ({} ms)",
                identifier,
                direction.as_str(),
                elapsed.as_millis()
            );
        }
    }
}
