use strata_core::{DatabaseConnection, MigrationService};

/// List user tables on the configured database
pub async fn run(service: &MigrationService, conn: &mut dyn DatabaseConnection) -> i32 {
    let tables = match service.list_tables(conn).await {
        Ok(tables) => tables,
        Err(e) => {
            eprintln!("❌ Failed to list tables: {}", e);
            return 1;
        }
    };

    if tables.is_empty() {
        println!("No user tables found.");
        return 0;
    }

    println!("Found {} table(s):", tables.len());
    for table in &tables {
        println!("  {}", table);
    }
    0
}
