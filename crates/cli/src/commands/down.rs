use std::sync::Arc;

use strata_core::{DatabaseConnection, DownRunner, MigrationService};

use crate::output::ConsoleReporter;

/// Revert the `count` most recently applied migrations
pub async fn run(
    service: &MigrationService,
    conn: &mut dyn DatabaseConnection,
    count: usize,
) -> i32 {
    let report = match DownRunner::new()
        .with_observer(Arc::new(ConsoleReporter))
        .run(service, conn, count)
        .await
    {
        Ok(report) => report,
        Err(e) => {
            eprintln!("❌ Rollback failed: {}", e);
            return 1;
        }
    };

    match report.failure {
        None => {
            if report.reverted.is_empty() {
                println!("✅ Nothing to revert.");
            } else {
                println!(
                    "✅ Reverted {} migration(s) in {} ms",
                    report.reverted.len(),
                    report.elapsed_ms
                );
            }
            0
        }
        Some(failure) => {
            eprintln!("❌ {} failed: {}", failure.identifier, failure.error);
            if !report.reverted.is_empty() {
                eprintln!(
                    "   {} migration(s) were reverted before the failure",
                    report.reverted.len()
                );
            }
            1
        }
    }
}
