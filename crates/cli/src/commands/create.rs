use strata_core::MigrationService;

/// Scaffold a new migration source file; works without a database
pub async fn run(service: &MigrationService, name: &str) -> i32 {
    match service.scaffold(name) {
        Ok(scaffolded) => {
            println!("✅ Created migration {}", scaffolded.identifier);
            println!("   {}", scaffolded.path.display());
            println!("   Register it under the matching root to make it runnable.");
            0
        }
        Err(e) => {
            eprintln!("❌ Failed to create migration: {}", e);
            1
        }
    }
}
