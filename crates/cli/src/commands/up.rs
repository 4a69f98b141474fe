use std::sync::Arc;

use strata_core::{DatabaseConnection, MigrationService, UpdateLimit, UpdateRunner};

use crate::output::ConsoleReporter;

/// Apply pending migrations, optionally capped at `count`
pub async fn run(
    service: &MigrationService,
    conn: &mut dyn DatabaseConnection,
    count: Option<usize>,
) -> i32 {
    let limit = match count {
        Some(count) => UpdateLimit::Count(count),
        None => UpdateLimit::All,
    };

    let report = match UpdateRunner::new()
        .with_observer(Arc::new(ConsoleReporter))
        .run(service, conn, limit)
        .await
    {
        Ok(report) => report,
        Err(e) => {
            eprintln!("❌ Migration run failed: {}", e);
            return 1;
        }
    };

    match report.failure {
        None => {
            if report.applied.is_empty() {
                println!("✅ Nothing to apply. Your system is up-to-date.");
            } else {
                println!(
                    "✅ Applied {} migration(s) in {} ms",
                    report.applied.len(),
                    report.elapsed_ms
                );
            }
            0
        }
        Some(failure) => {
            eprintln!("❌ {} failed: {}", failure.identifier, failure.error);
            if !report.applied.is_empty() {
                eprintln!(
                    "   {} earlier migration(s) were applied and stay applied",
                    report.applied.len()
                );
            }
            1
        }
    }
}
