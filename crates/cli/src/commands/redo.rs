use std::sync::Arc;

use strata_core::{
    DatabaseConnection, DownRunner, MigrationService, ProgressObserver, UpdateRunner,
};

use crate::output::ConsoleReporter;

/// Revert the `count` most recent migrations, then re-apply them in
/// chronological order
///
/// A failed revert stops the whole command before anything is re-applied.
pub async fn run(
    service: &MigrationService,
    conn: &mut dyn DatabaseConnection,
    count: usize,
) -> i32 {
    let observer: Arc<dyn ProgressObserver> = Arc::new(ConsoleReporter);

    let down = match DownRunner::new()
        .with_observer(observer.clone())
        .run(service, conn, count)
        .await
    {
        Ok(report) => report,
        Err(e) => {
            eprintln!("❌ Redo failed: {}", e);
            return 1;
        }
    };

    if let Some(failure) = down.failure {
        eprintln!("❌ {} failed: {}", failure.identifier, failure.error);
        eprintln!("   Redo stopped before re-applying anything.");
        return 1;
    }

    if down.reverted.is_empty() {
        println!("✅ Nothing to redo.");
        return 0;
    }

    let mut identifiers: Vec<String> = down
        .reverted
        .iter()
        .map(|run| run.identifier.clone())
        .collect();
    identifiers.reverse();

    let up = match UpdateRunner::new()
        .with_observer(observer)
        .run_identifiers(service, conn, &identifiers)
        .await
    {
        Ok(report) => report,
        Err(e) => {
            eprintln!("❌ Redo failed while re-applying: {}", e);
            return 1;
        }
    };

    match up.failure {
        None => {
            println!("✅ Redid {} migration(s)", up.applied.len());
            0
        }
        Some(failure) => {
            eprintln!(
                "❌ {} failed while re-applying: {}",
                failure.identifier, failure.error
            );
            1
        }
    }
}
