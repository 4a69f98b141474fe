//! Migration Service - the facade embedding applications talk to
//!
//! Combines the registry and the history ledger into the question-answering
//! surface: what is pending, what ran, where does a new migration go. The
//! service never executes migrations; that stays with the migrator and the
//! runners.

use std::collections::HashSet;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use crate::database::DatabaseConnection;
use crate::definitions::AppliedMigration;
use crate::error::{MigrateError, MigrateResult};
use crate::history::HistoryStore;
use crate::registry::{
    snake_identifier, IdentifierGenerator, MigrationRegistry, MigrationRoot, MigrationUnit,
    ResolvedMigration,
};

/// Configuration for the migration service
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Discovery roots, in registration order
    pub roots: Vec<MigrationRoot>,
    /// Namespace of the root that receives scaffolded migrations
    pub scaffold_namespace: String,
}

/// Outcome of scaffolding a new migration source file
#[derive(Debug, Clone)]
pub struct ScaffoldedMigration {
    /// The generated identifier; also the struct name in the source file
    pub identifier: String,
    /// Where the source file was written
    pub path: PathBuf,
}

/// Facade over registry and ledger
pub struct MigrationService {
    registry: MigrationRegistry,
    history: Arc<HistoryStore>,
    scaffold_namespace: String,
    generator: IdentifierGenerator,
}

impl MigrationService {
    /// Create a service; fails when the scaffold namespace names no root
    pub fn new(config: ServiceConfig, history: Arc<HistoryStore>) -> MigrateResult<Self> {
        validate_scaffold_namespace(&config.roots, &config.scaffold_namespace)?;
        Ok(Self {
            registry: MigrationRegistry::new(config.roots),
            history,
            scaffold_namespace: config.scaffold_namespace,
            generator: IdentifierGenerator::new(),
        })
    }

    /// The underlying registry
    pub fn registry(&self) -> &MigrationRegistry {
        &self.registry
    }

    /// The history ledger
    pub fn history(&self) -> Arc<HistoryStore> {
        self.history.clone()
    }

    /// Replace every discovery root
    pub fn set_roots(&mut self, roots: Vec<MigrationRoot>) -> MigrateResult<()> {
        validate_scaffold_namespace(&roots, &self.scaffold_namespace)?;
        self.registry.set_roots(roots);
        Ok(())
    }

    /// Append a discovery root
    pub fn add_root(&mut self, root: MigrationRoot) {
        self.registry.add_root(root);
    }

    /// Point scaffolding at a different root
    pub fn set_scaffold_namespace(&mut self, namespace: impl Into<String>) -> MigrateResult<()> {
        let namespace = namespace.into();
        validate_scaffold_namespace(self.registry.roots(), &namespace)?;
        self.scaffold_namespace = namespace;
        Ok(())
    }

    /// Registered migrations not yet recorded as applied, in ascending
    /// discovery order
    pub async fn new_migrations(
        &self,
        conn: &mut dyn DatabaseConnection,
    ) -> MigrateResult<Vec<MigrationUnit>> {
        let applied: HashSet<String> = self
            .history
            .applied(conn, None)
            .await?
            .into_iter()
            .map(|record| record.identifier)
            .collect();

        let units = self.registry.discover()?;
        Ok(units
            .into_iter()
            .filter(|unit| !applied.contains(&unit.identifier))
            .collect())
    }

    /// The most recent `limit` ledger entries, oldest first
    pub async fn migration_history(
        &self,
        conn: &mut dyn DatabaseConnection,
        limit: Option<usize>,
    ) -> MigrateResult<Vec<AppliedMigration>> {
        let mut records = self.history.applied(conn, limit).await?;
        records.reverse();
        Ok(records)
    }

    /// Look up a registered migration
    ///
    /// Returns `None` when the identifier is unknown; every other failure
    /// propagates unchanged.
    pub fn find_migration(&self, identifier: &str) -> MigrateResult<Option<ResolvedMigration>> {
        match self.registry.resolve(identifier) {
            Ok(resolved) => Ok(Some(resolved)),
            Err(MigrateError::MigrationNotFound { .. }) => Ok(None),
            Err(err) => Err(err),
        }
    }

    /// Generate an identifier for `name` and write a migration source
    /// skeleton into the scaffold root's directory
    pub fn scaffold(&self, name: &str) -> MigrateResult<ScaffoldedMigration> {
        let root = self
            .registry
            .roots()
            .iter()
            .find(|root| root.namespace() == self.scaffold_namespace)
            .ok_or_else(|| {
                MigrateError::Configuration(format!(
                    "scaffold namespace {} names no registered root",
                    self.scaffold_namespace
                ))
            })?;
        let directory = root.directory().ok_or_else(|| {
            MigrateError::Configuration(format!(
                "root {} has no directory to scaffold into",
                root.namespace()
            ))
        })?;

        let identifier = self.generator.generate(name)?;
        let max_length = self.history.config().identifier_length as usize;
        if identifier.len() > max_length {
            return Err(MigrateError::Configuration(format!(
                "identifier {} exceeds the maximum length of {} characters",
                identifier, max_length
            )));
        }

        fs::create_dir_all(directory)?;
        let path = directory.join(format!("{}.rs", snake_identifier(&identifier)));
        fs::write(&path, migration_template(&identifier, name))?;

        tracing::info!("scaffolded migration {} at {}", identifier, path.display());
        Ok(ScaffoldedMigration { identifier, path })
    }

    /// User tables on the connection, without the history ledger table
    pub async fn list_tables(
        &self,
        conn: &mut dyn DatabaseConnection,
    ) -> MigrateResult<Vec<String>> {
        let history_table = self.history.config().table_name.clone();
        let mut tables: Vec<String> = conn
            .table_names()
            .await?
            .into_iter()
            .filter(|table| table != &history_table)
            .collect();
        tables.sort();
        Ok(tables)
    }
}

fn validate_scaffold_namespace(roots: &[MigrationRoot], namespace: &str) -> MigrateResult<()> {
    if roots.iter().any(|root| root.namespace() == namespace) {
        Ok(())
    } else {
        Err(MigrateError::Configuration(format!(
            "scaffold namespace {} is not among the registered roots",
            namespace
        )))
    }
}

/// Source skeleton for a scaffolded migration
fn migration_template(identifier: &str, name: &str) -> String {
    format!(
        "use async_trait::async_trait;\n\
         use strata_core::{{MigrateResult, Migration, MigrationContext}};\n\
         \n\
         /// {name}\n\
         pub struct {identifier};\n\
         \n\
         #[async_trait]\n\
         impl Migration for {identifier} {{\n\
         \x20   async fn up(&self, ctx: &mut MigrationContext<'_>) -> MigrateResult<()> {{\n\
         \x20       let mut schema = ctx.schema();\n\
         \x20       // schema.create_table(\"...\", |table| {{ ... }});\n\
         \x20       ctx.run_schema(schema).await\n\
         \x20   }}\n\
         \n\
         \x20   async fn down(&self, ctx: &mut MigrationContext<'_>) -> MigrateResult<()> {{\n\
         \x20       let mut schema = ctx.schema();\n\
         \x20       // schema.drop_table(\"...\");\n\
         \x20       ctx.run_schema(schema).await\n\
         \x20   }}\n\
         }}\n",
        name = name,
        identifier = identifier
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definitions::{Migration, MigrationContext};
    use crate::registry::MigrationEntry;

    struct Noop;

    #[async_trait::async_trait]
    impl Migration for Noop {
        async fn up(&self, _ctx: &mut MigrationContext<'_>) -> MigrateResult<()> {
            Ok(())
        }
    }

    fn root_with(namespace: &str, identifiers: &[&str]) -> MigrationRoot {
        identifiers.iter().fold(
            MigrationRoot::new(namespace),
            |root, identifier| root.register(MigrationEntry::new(*identifier, || Box::new(Noop))),
        )
    }

    fn service_over(roots: Vec<MigrationRoot>, scaffold_namespace: &str) -> MigrationService {
        MigrationService::new(
            ServiceConfig {
                roots,
                scaffold_namespace: scaffold_namespace.to_string(),
            },
            Arc::new(HistoryStore::new()),
        )
        .unwrap()
    }

    #[test]
    fn test_scaffold_namespace_must_be_a_root() {
        let result = MigrationService::new(
            ServiceConfig {
                roots: vec![root_with("app", &[])],
                scaffold_namespace: "nothere".to_string(),
            },
            Arc::new(HistoryStore::new()),
        );
        assert!(matches!(result, Err(MigrateError::Configuration(_))));
    }

    #[test]
    fn test_set_roots_revalidates_scaffold_namespace() {
        let mut service = service_over(vec![root_with("app", &[])], "app");

        let err = service
            .set_roots(vec![root_with("other", &[])])
            .unwrap_err();
        assert!(matches!(err, MigrateError::Configuration(_)));

        // the old roots survive a rejected replacement
        assert_eq!(service.registry().roots()[0].namespace(), "app");
    }

    #[test]
    fn test_find_migration_translates_not_found_to_none() {
        let service = service_over(vec![root_with("app", &["M240101000000First"])], "app");

        assert!(service
            .find_migration("M240101000000First")
            .unwrap()
            .is_some());
        assert!(service
            .find_migration("M249912312359Nothing")
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_scaffold_writes_a_compilable_skeleton() {
        let dir = tempfile::tempdir().unwrap();
        let root = MigrationRoot::new("app").with_directory(dir.path());
        let service = service_over(vec![root], "app");

        let scaffolded = service.scaffold("create post").unwrap();
        assert!(scaffolded.identifier.starts_with('M'));
        assert!(scaffolded.identifier.ends_with("CreatePost"));
        assert!(scaffolded.path.exists());

        let source = fs::read_to_string(&scaffolded.path).unwrap();
        assert!(source.contains(&format!("pub struct {};", scaffolded.identifier)));
        assert!(source.contains(&format!("impl Migration for {}", scaffolded.identifier)));
        assert!(source.contains("async fn up"));
        assert!(source.contains("async fn down"));

        let file_name = scaffolded.path.file_name().unwrap().to_string_lossy();
        assert!(file_name.starts_with('m'));
        assert!(file_name.ends_with("_create_post.rs"));
    }

    #[test]
    fn test_scaffold_without_directory_is_a_configuration_error() {
        let service = service_over(vec![root_with("app", &[])], "app");
        let err = service.scaffold("create post").unwrap_err();
        assert!(matches!(err, MigrateError::Configuration(_)));
    }

    #[test]
    fn test_scaffold_rejects_overlong_identifiers() {
        let dir = tempfile::tempdir().unwrap();
        let root = MigrationRoot::new("app").with_directory(dir.path());
        let service = service_over(vec![root], "app");

        let name = "word ".repeat(60);
        let err = service.scaffold(&name).unwrap_err();
        assert!(matches!(err, MigrateError::Configuration(_)));
    }
}
