//! Migration Registry - roots, entries, discovery, and identifier naming
//!
//! Migrations are registered in code: every entry pairs an identifier with a
//! constructor closure producing a fresh instance, plus the capabilities the
//! migrator checks before dispatch. Capability flags are declared here, at
//! registration, never inferred from the instance.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};

use crate::definitions::Migration;
use crate::error::{MigrateError, MigrateResult};

/// Constructor producing a fresh migration instance
///
/// Entries capture whatever dependencies the migration needs inside this
/// closure, so the registry itself stays free of any container machinery.
pub type MigrationConstructor = Arc<dyn Fn() -> Box<dyn Migration> + Send + Sync>;

/// A registered migration with its declared capabilities
#[derive(Clone)]
pub struct MigrationEntry {
    identifier: String,
    transactional: bool,
    revertible: bool,
    constructor: MigrationConstructor,
}

impl MigrationEntry {
    /// Register a migration; transactional and revertible by default
    pub fn new<F>(identifier: impl Into<String>, constructor: F) -> Self
    where
        F: Fn() -> Box<dyn Migration> + Send + Sync + 'static,
    {
        Self {
            identifier: identifier.into(),
            transactional: true,
            revertible: true,
            constructor: Arc::new(constructor),
        }
    }

    /// Declare that this migration must run outside a transaction
    ///
    /// Used for statements the engine refuses to run transactionally, such
    /// as CREATE INDEX CONCURRENTLY. A failure then leaves the database in
    /// an undefined state, which the migrator reports as a partial apply.
    pub fn no_transaction(mut self) -> Self {
        self.transactional = false;
        self
    }

    /// Declare that this migration cannot be reverted
    pub fn irreversible(mut self) -> Self {
        self.revertible = false;
        self
    }

    /// The migration identifier
    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    /// Whether the migrator wraps this migration in a transaction
    pub fn is_transactional(&self) -> bool {
        self.transactional
    }

    /// Whether this migration may be reverted
    pub fn is_revertible(&self) -> bool {
        self.revertible
    }
}

impl std::fmt::Debug for MigrationEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MigrationEntry")
            .field("identifier", &self.identifier)
            .field("transactional", &self.transactional)
            .field("revertible", &self.revertible)
            .finish()
    }
}

/// One discovery root: a namespace holding registered migrations
///
/// The optional directory is where scaffolded migration sources for this
/// root are written; discovery itself only walks the registered entries.
#[derive(Debug, Clone)]
pub struct MigrationRoot {
    namespace: String,
    directory: Option<PathBuf>,
    entries: Vec<MigrationEntry>,
}

impl MigrationRoot {
    /// Create an empty root under the given namespace
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            directory: None,
            entries: Vec::new(),
        }
    }

    /// Set the directory scaffolded sources for this root are written to
    pub fn with_directory(mut self, directory: impl Into<PathBuf>) -> Self {
        self.directory = Some(directory.into());
        self
    }

    /// Register a migration entry under this root
    pub fn register(mut self, entry: MigrationEntry) -> Self {
        self.entries.push(entry);
        self
    }

    /// The namespace of this root
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// The source directory of this root, if directory-backed
    pub fn directory(&self) -> Option<&Path> {
        self.directory.as_deref()
    }

    /// Entries registered under this root
    pub fn entries(&self) -> &[MigrationEntry] {
        &self.entries
    }
}

/// Discovery record for a single registered migration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationUnit {
    /// Migration identifier
    pub identifier: String,
    /// Namespace of the root it was found under
    pub namespace: String,
    /// Source directory of that root, when directory-backed
    pub location: Option<PathBuf>,
}

/// A migration instance paired with the capabilities declared for it
pub struct ResolvedMigration {
    /// Migration identifier
    pub identifier: String,
    /// Namespace of the root it came from
    pub namespace: String,
    /// Whether the migrator wraps it in a transaction
    pub transactional: bool,
    /// Whether it may be reverted
    pub revertible: bool,
    /// The instance itself
    pub instance: Box<dyn Migration>,
}

impl std::fmt::Debug for ResolvedMigration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedMigration")
            .field("identifier", &self.identifier)
            .field("namespace", &self.namespace)
            .field("transactional", &self.transactional)
            .field("revertible", &self.revertible)
            .finish()
    }
}

/// Registry over a list of discovery roots
#[derive(Debug, Clone, Default)]
pub struct MigrationRegistry {
    roots: Vec<MigrationRoot>,
}

impl MigrationRegistry {
    /// Create a registry over the given roots
    pub fn new(roots: Vec<MigrationRoot>) -> Self {
        Self { roots }
    }

    /// The registered roots
    pub fn roots(&self) -> &[MigrationRoot] {
        &self.roots
    }

    /// Replace every root
    pub fn set_roots(&mut self, roots: Vec<MigrationRoot>) {
        self.roots = roots;
    }

    /// Append a root
    pub fn add_root(&mut self, root: MigrationRoot) {
        self.roots.push(root);
    }

    /// Every registered migration in ascending identifier order
    ///
    /// The same identifier appearing under two roots is a configuration
    /// mistake and fails discovery outright.
    pub fn discover(&self) -> MigrateResult<Vec<MigrationUnit>> {
        let mut seen: HashMap<&str, &str> = HashMap::new();
        let mut units = Vec::new();

        for root in &self.roots {
            for entry in root.entries() {
                if let Some(other) = seen.insert(entry.identifier(), root.namespace()) {
                    return Err(MigrateError::Configuration(format!(
                        "migration {} is registered under both {} and {}",
                        entry.identifier(),
                        other,
                        root.namespace()
                    )));
                }
                units.push(MigrationUnit {
                    identifier: entry.identifier().to_string(),
                    namespace: root.namespace().to_string(),
                    location: root.directory().map(Path::to_path_buf),
                });
            }
        }

        units.sort_by(|a, b| a.identifier.cmp(&b.identifier));
        Ok(units)
    }

    /// Instantiate a migration together with its declared capabilities
    pub fn resolve(&self, identifier: &str) -> MigrateResult<ResolvedMigration> {
        for root in &self.roots {
            if let Some(entry) = root
                .entries()
                .iter()
                .find(|e| e.identifier() == identifier)
            {
                return Ok(ResolvedMigration {
                    identifier: entry.identifier.clone(),
                    namespace: root.namespace().to_string(),
                    transactional: entry.transactional,
                    revertible: entry.revertible,
                    instance: (entry.constructor)(),
                });
            }
        }
        Err(MigrateError::MigrationNotFound {
            identifier: identifier.to_string(),
        })
    }
}

/// Generates `M` + UTC timestamp + CamelCase name identifiers
///
/// Identifiers are strictly monotonic within a process: a request landing in
/// the same second as the previous one is stamped one second later, so
/// lexicographic identifier order stays equal to creation order.
pub struct IdentifierGenerator {
    last_secs: Mutex<i64>,
}

impl IdentifierGenerator {
    pub fn new() -> Self {
        Self {
            last_secs: Mutex::new(0),
        }
    }

    /// Generate an identifier for a human-readable migration name
    pub fn generate(&self, name: &str) -> MigrateResult<String> {
        let suffix = camel_case(name);
        if suffix.is_empty() {
            return Err(MigrateError::Configuration(format!(
                "migration name {:?} contains no usable characters",
                name
            )));
        }

        let now = Utc::now().timestamp();
        let mut last = match self.last_secs.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let stamp_secs = now.max(*last + 1);
        *last = stamp_secs;

        let stamp = DateTime::from_timestamp(stamp_secs, 0).ok_or_else(|| {
            MigrateError::Configuration(format!("clock produced invalid timestamp {}", stamp_secs))
        })?;
        Ok(format!("M{}{}", stamp.format("%y%m%d%H%M%S"), suffix))
    }
}

impl Default for IdentifierGenerator {
    fn default() -> Self {
        Self::new()
    }
}

/// Convert a human-readable name into a CamelCase identifier suffix
fn camel_case(name: &str) -> String {
    name.split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|word| !word.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect()
}

/// File name stem for a scaffolded migration source
pub(crate) fn snake_identifier(identifier: &str) -> String {
    let mut out = String::with_capacity(identifier.len() + 8);
    let mut prev_lower_or_digit = false;
    for c in identifier.chars() {
        if c.is_ascii_uppercase() {
            if prev_lower_or_digit {
                out.push('_');
            }
            out.push(c.to_ascii_lowercase());
            prev_lower_or_digit = false;
        } else {
            out.push(c);
            prev_lower_or_digit = c.is_ascii_lowercase() || c.is_ascii_digit();
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definitions::MigrationContext;

    struct Noop;

    #[async_trait::async_trait]
    impl Migration for Noop {
        async fn up(&self, _ctx: &mut MigrationContext<'_>) -> MigrateResult<()> {
            Ok(())
        }
    }

    fn entry(identifier: &str) -> MigrationEntry {
        MigrationEntry::new(identifier, || Box::new(Noop))
    }

    #[test]
    fn test_camel_case() {
        assert_eq!(camel_case("create post"), "CreatePost");
        assert_eq!(camel_case("add-index_to users"), "AddIndexToUsers");
        assert_eq!(camel_case("CreatePost"), "CreatePost");
        assert_eq!(camel_case("drop  old   stuff"), "DropOldStuff");
        assert_eq!(camel_case("***"), "");
    }

    #[test]
    fn test_snake_identifier() {
        assert_eq!(
            snake_identifier("M200903153847CreatePost"),
            "m200903153847_create_post"
        );
        assert_eq!(
            snake_identifier("M240101120000AddIndexToUsers"),
            "m240101120000_add_index_to_users"
        );
    }

    #[test]
    fn test_discover_sorts_and_merges_roots() {
        let registry = MigrationRegistry::new(vec![
            MigrationRoot::new("app").register(entry("M240102000000Second")),
            MigrationRoot::new("auth").register(entry("M240101000000First")),
        ]);

        let units = registry.discover().unwrap();
        assert_eq!(units.len(), 2);
        assert_eq!(units[0].identifier, "M240101000000First");
        assert_eq!(units[0].namespace, "auth");
        assert_eq!(units[1].identifier, "M240102000000Second");
        assert_eq!(units[1].namespace, "app");
    }

    #[test]
    fn test_duplicate_identifier_fails_discovery() {
        let registry = MigrationRegistry::new(vec![
            MigrationRoot::new("app").register(entry("M240101000000Same")),
            MigrationRoot::new("auth").register(entry("M240101000000Same")),
        ]);

        let err = registry.discover().unwrap_err();
        assert!(matches!(err, MigrateError::Configuration(_)));
    }

    #[test]
    fn test_resolve_carries_capability_flags() {
        let registry = MigrationRegistry::new(vec![MigrationRoot::new("app")
            .register(entry("M240101000000Plain"))
            .register(entry("M240102000000Special").no_transaction().irreversible())]);

        let plain = registry.resolve("M240101000000Plain").unwrap();
        assert!(plain.transactional);
        assert!(plain.revertible);

        let special = registry.resolve("M240102000000Special").unwrap();
        assert!(!special.transactional);
        assert!(!special.revertible);

        let err = registry.resolve("M240103000000Missing").unwrap_err();
        assert!(matches!(err, MigrateError::MigrationNotFound { .. }));
    }

    #[test]
    fn test_resolved_debug_omits_the_instance() {
        let registry = MigrationRegistry::new(vec![
            MigrationRoot::new("app").register(entry("M240101000000Plain"))
        ]);

        let rendered = format!("{:?}", registry.resolve("M240101000000Plain").unwrap());
        assert!(rendered.contains("M240101000000Plain"));
        assert!(rendered.contains("revertible: true"));
        assert!(!rendered.contains("instance"));
    }

    #[test]
    fn test_generator_is_monotonic_within_a_second() {
        let generator = IdentifierGenerator::new();
        let first = generator.generate("create post").unwrap();
        let second = generator.generate("create comment").unwrap();

        assert!(first.starts_with('M'));
        assert!(first.ends_with("CreatePost"));
        assert!(second.ends_with("CreateComment"));
        // timestamps differ even when both calls land in the same second
        assert!(second[1..13] > first[1..13]);
    }

    #[test]
    fn test_generator_rejects_empty_names() {
        let generator = IdentifierGenerator::new();
        let err = generator.generate("!!!").unwrap_err();
        assert!(matches!(err, MigrateError::Configuration(_)));
    }
}
