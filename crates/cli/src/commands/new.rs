use strata_core::{DatabaseConnection, MigrationService};

/// List migrations that are registered but not yet applied
pub async fn run(service: &MigrationService, conn: &mut dyn DatabaseConnection) -> i32 {
    let units = match service.new_migrations(conn).await {
        Ok(units) => units,
        Err(e) => {
            eprintln!("❌ Failed to list new migrations: {}", e);
            return 1;
        }
    };

    if units.is_empty() {
        println!("✅ No new migrations found. Your system is up-to-date.");
        return 0;
    }

    println!("Found {} new migration(s):", units.len());
    for unit in &units {
        println!("  ⏳ {} [{}]", unit.identifier, unit.namespace);
    }
    0
}
