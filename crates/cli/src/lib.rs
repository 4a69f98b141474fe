//! # strata-cli: Embeddable Migration Command Line
//!
//! Migrations are registered in application code, so the CLI cannot be a
//! standalone binary: the embedding application builds a
//! [`MigrationService`] over its registered roots and hands control to
//! [`run_cli`]. A typical `main` is a few lines:
//!
//! ```no_run
//! use std::sync::Arc;
//! use strata_core::{HistoryStore, MigrationRoot, MigrationService, ServiceConfig, SqliteConnector};
//!
//! #[tokio::main]
//! async fn main() {
//!     let service = MigrationService::new(
//!         ServiceConfig {
//!             roots: vec![MigrationRoot::new("app").with_directory("migrations")],
//!             scaffold_namespace: "app".to_string(),
//!         },
//!         Arc::new(HistoryStore::new()),
//!     )
//!     .expect("valid migration config");
//!
//!     strata_cli::run_cli(service, Some(Box::new(SqliteConnector::at_path("app.db")))).await;
//! }
//! ```
//!
//! Commands that need a database fail with a dedicated exit code when no
//! connection provider was supplied; `create` works without one.

pub mod commands;
pub mod output;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use strata_core::{ConnectionProvider, DatabaseConnection, MigrationService};

pub use output::ConsoleReporter;

/// Exit code for any failed command
pub const EXIT_FAILURE: i32 = 1;
/// Exit code when a command needs a database and none is configured
pub const EXIT_NO_DATABASE: i32 = 3;

#[derive(Parser)]
#[command(name = "strata")]
#[command(about = "Versioned schema migrations", version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create a new migration source file
    Create {
        /// Human-readable migration name, e.g. "create post table"
        name: String,
    },

    /// Show migrations that have not been applied yet
    New,

    /// Apply pending migrations
    Up {
        /// Apply at most this many; all pending when omitted
        count: Option<usize>,
    },

    /// Revert the most recently applied migrations
    Down {
        /// How many migrations to revert
        #[arg(default_value_t = 1)]
        count: usize,
    },

    /// Revert recent migrations and immediately re-apply them
    Redo {
        /// How many migrations to redo
        #[arg(default_value_t = 1)]
        count: usize,
    },

    /// Show applied migrations
    History {
        /// Show only the most recent entries
        #[arg(long)]
        limit: Option<usize>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// List user tables on the configured database
    ListTables,
}

/// Parse process arguments, run the matching command, and exit
pub async fn run_cli(
    service: MigrationService,
    provider: Option<Box<dyn ConnectionProvider>>,
) -> ! {
    init_tracing();
    let cli = Cli::parse();
    let code = execute(cli, &service, provider.as_deref()).await;
    std::process::exit(code);
}

/// Run a parsed command and return the process exit code
pub async fn execute(
    cli: Cli,
    service: &MigrationService,
    provider: Option<&dyn ConnectionProvider>,
) -> i32 {
    match cli.command {
        Commands::Create { name } => commands::create::run(service, &name).await,
        Commands::New => {
            let mut conn = match open_connection(provider).await {
                Ok(conn) => conn,
                Err(code) => return code,
            };
            commands::new::run(service, conn.as_mut()).await
        }
        Commands::Up { count } => {
            let mut conn = match open_connection(provider).await {
                Ok(conn) => conn,
                Err(code) => return code,
            };
            commands::up::run(service, conn.as_mut(), count).await
        }
        Commands::Down { count } => {
            let mut conn = match open_connection(provider).await {
                Ok(conn) => conn,
                Err(code) => return code,
            };
            commands::down::run(service, conn.as_mut(), count).await
        }
        Commands::Redo { count } => {
            let mut conn = match open_connection(provider).await {
                Ok(conn) => conn,
                Err(code) => return code,
            };
            commands::redo::run(service, conn.as_mut(), count).await
        }
        Commands::History { limit, json } => {
            let mut conn = match open_connection(provider).await {
                Ok(conn) => conn,
                Err(code) => return code,
            };
            commands::history::run(service, conn.as_mut(), limit, json).await
        }
        Commands::ListTables => {
            let mut conn = match open_connection(provider).await {
                Ok(conn) => conn,
                Err(code) => return code,
            };
            commands::tables::run(service, conn.as_mut()).await
        }
    }
}

/// Install a fmt subscriber honoring RUST_LOG; a no-op when the embedding
/// application already installed one
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .try_init();
}

async fn open_connection(
    provider: Option<&dyn ConnectionProvider>,
) -> Result<Box<dyn DatabaseConnection>, i32> {
    let provider = match provider {
        Some(provider) => provider,
        None => {
            eprintln!("⚠️  No database configured. This command needs a connection provider.");
            return Err(EXIT_NO_DATABASE);
        }
    };

    match provider.connect().await {
        Ok(conn) => {
            tracing::debug!("database connection established");
            Ok(conn)
        }
        Err(e) => {
            eprintln!("❌ Failed to connect to the database: {}", e);
            Err(EXIT_FAILURE)
        }
    }
}
