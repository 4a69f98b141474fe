use strata_core::{DatabaseConnection, MigrationService};

/// Show applied migrations, oldest first
pub async fn run(
    service: &MigrationService,
    conn: &mut dyn DatabaseConnection,
    limit: Option<usize>,
    json: bool,
) -> i32 {
    let records = match service.migration_history(conn, limit).await {
        Ok(records) => records,
        Err(e) => {
            eprintln!("❌ Failed to read migration history: {}", e);
            return 1;
        }
    };

    if json {
        return match serde_json::to_string_pretty(&records) {
            Ok(body) => {
                println!("{}", body);
                0
            }
            Err(e) => {
                eprintln!("❌ Failed to encode history: {}", e);
                1
            }
        };
    }

    if records.is_empty() {
        println!("No migrations have been applied yet.");
        return 0;
    }

    println!("Migration History:");
    println!("==================");
    for record in &records {
        println!(
            "  ✅ {}  applied {}",
            record.identifier,
            record.applied_at.format("%Y-%m-%d %H:%M:%S UTC")
        );
    }
    0
}
