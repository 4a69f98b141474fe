//! Schema DSL - dialect-aware builder for the statements migrations issue
//!
//! A migration body fills a [`SchemaBuilder`] and hands it back to its
//! context for execution. Columns and constraints are collected as data and
//! rendered against the dialect the builder was seeded with, so one
//! migration source produces valid SQL on every supported engine.

use std::fmt::Write;

use crate::database::SqlDialect;

/// Collects schema statements for a single migration step
pub struct SchemaBuilder {
    dialect: SqlDialect,
    statements: Vec<String>,
}

impl SchemaBuilder {
    /// Create a builder rendering for the given dialect
    pub fn new(dialect: SqlDialect) -> Self {
        Self {
            dialect,
            statements: Vec::new(),
        }
    }

    /// The dialect this builder renders for
    pub fn dialect(&self) -> SqlDialect {
        self.dialect
    }

    /// Create a table, describing its columns through the closure
    pub fn create_table<F>(&mut self, name: &str, build: F) -> &mut Self
    where
        F: FnOnce(&mut TableBuilder),
    {
        let mut table = TableBuilder::new(self.dialect, name);
        build(&mut table);
        let statement = table.to_sql();
        self.push(statement)
    }

    /// Drop a table
    ///
    /// Deliberately not `IF EXISTS`: a revert that drops a table the engine
    /// refuses to drop (or that is already gone) must fail loudly.
    pub fn drop_table(&mut self, name: &str) -> &mut Self {
        self.push(format!("DROP TABLE {};", name))
    }

    /// Add a column to an existing table
    pub fn add_column(&mut self, table: &str, column: &str, sql_type: &str) -> &mut Self {
        self.push(format!(
            "ALTER TABLE {} ADD COLUMN {} {};",
            table, column, sql_type
        ))
    }

    /// Drop a column from an existing table
    pub fn drop_column(&mut self, table: &str, column: &str) -> &mut Self {
        self.push(format!("ALTER TABLE {} DROP COLUMN {};", table, column))
    }

    /// Create an index; the name defaults to `idx_<table>_<columns>`
    pub fn create_index(&mut self, table: &str, columns: &[&str], name: Option<&str>) -> &mut Self {
        let index = match name {
            Some(name) => name.to_string(),
            None => format!("idx_{}_{}", table, columns.join("_")),
        };
        self.push(format!(
            "CREATE INDEX {} ON {} ({});",
            index,
            table,
            columns.join(", ")
        ))
    }

    /// Drop an index
    pub fn drop_index(&mut self, name: &str) -> &mut Self {
        self.push(format!("DROP INDEX IF EXISTS {};", name))
    }

    /// Append a raw statement the DSL has no shorthand for
    pub fn raw(&mut self, sql: &str) -> &mut Self {
        self.push(sql.to_string())
    }

    /// The accumulated statements, in call order
    pub fn to_sql(&self) -> Vec<String> {
        self.statements.clone()
    }

    /// The accumulated statements joined into one string
    pub fn build(&self) -> String {
        self.statements.join("\n")
    }

    fn push(&mut self, statement: String) -> &mut Self {
        self.statements.push(statement);
        self
    }
}

/// Describes one table for a CREATE TABLE statement
pub struct TableBuilder {
    dialect: SqlDialect,
    name: String,
    columns: Vec<ColumnDef>,
    constraints: Vec<TableConstraint>,
}

impl TableBuilder {
    pub fn new(dialect: SqlDialect, name: &str) -> Self {
        Self {
            dialect,
            name: name.to_string(),
            columns: Vec::new(),
            constraints: Vec::new(),
        }
    }

    /// Add a column with a hand-written SQL type
    pub fn column(&mut self, name: &str, sql_type: &str) -> &mut Self {
        self.add(name, ColumnKind::Custom(sql_type.to_string()))
    }

    /// Add an auto-incrementing primary key column
    pub fn id(&mut self, name: &str) -> &mut Self {
        self.add(name, ColumnKind::AutoKey)
    }

    /// Add a string column; `None` length means unbounded text
    pub fn string(&mut self, name: &str, length: Option<u32>) -> &mut Self {
        match length {
            Some(len) => self.add(name, ColumnKind::Varchar(len)),
            None => self.add(name, ColumnKind::Text),
        }
    }

    /// Add an integer column
    pub fn integer(&mut self, name: &str) -> &mut Self {
        self.add(name, ColumnKind::Integer)
    }

    /// Add a 64-bit integer column
    pub fn big_integer(&mut self, name: &str) -> &mut Self {
        self.add(name, ColumnKind::BigInteger)
    }

    /// Add a boolean column
    pub fn boolean(&mut self, name: &str) -> &mut Self {
        self.add(name, ColumnKind::Boolean)
    }

    /// Mark the most recently added column NOT NULL
    pub fn not_null(&mut self) -> &mut Self {
        if let Some(column) = self.columns.last_mut() {
            column.not_null = true;
        }
        self
    }

    /// Add created_at and updated_at columns defaulting to the current time
    pub fn timestamps(&mut self) -> &mut Self {
        self.add("created_at", ColumnKind::TimestampDefaultNow);
        self.add("updated_at", ColumnKind::TimestampDefaultNow)
    }

    /// Add a primary key constraint over the given columns
    pub fn primary_key(&mut self, columns: &[&str]) -> &mut Self {
        self.constraints.push(TableConstraint::PrimaryKey(own(columns)));
        self
    }

    /// Add a foreign key constraint
    pub fn foreign_key(&mut self, column: &str, table: &str, references: &str) -> &mut Self {
        self.constraints.push(TableConstraint::ForeignKey {
            column: column.to_string(),
            table: table.to_string(),
            references: references.to_string(),
        });
        self
    }

    /// Add a unique constraint over the given columns
    pub fn unique(&mut self, columns: &[&str]) -> &mut Self {
        self.constraints.push(TableConstraint::Unique(own(columns)));
        self
    }

    /// Render the CREATE TABLE statement
    pub fn to_sql(&self) -> String {
        let mut body = String::new();
        for column in &self.columns {
            if !body.is_empty() {
                body.push_str(",\n    ");
            }
            column.render(self.dialect, &mut body);
        }
        for constraint in &self.constraints {
            if !body.is_empty() {
                body.push_str(",\n    ");
            }
            constraint.render(&mut body);
        }
        format!("CREATE TABLE {} (\n    {}\n);", self.name, body)
    }

    fn add(&mut self, name: &str, kind: ColumnKind) -> &mut Self {
        self.columns.push(ColumnDef {
            name: name.to_string(),
            kind,
            not_null: false,
        });
        self
    }
}

#[derive(Debug, Clone)]
struct ColumnDef {
    name: String,
    kind: ColumnKind,
    not_null: bool,
}

#[derive(Debug, Clone)]
enum ColumnKind {
    AutoKey,
    Varchar(u32),
    Text,
    Integer,
    BigInteger,
    Boolean,
    TimestampDefaultNow,
    Custom(String),
}

impl ColumnDef {
    fn render(&self, dialect: SqlDialect, out: &mut String) {
        out.push_str(&self.name);
        out.push(' ');
        match &self.kind {
            ColumnKind::AutoKey => out.push_str(dialect.auto_increment_primary_key()),
            ColumnKind::Varchar(len) => {
                let _ = write!(out, "VARCHAR({})", len);
            }
            ColumnKind::Text => out.push_str("TEXT"),
            ColumnKind::Integer => out.push_str("INTEGER"),
            ColumnKind::BigInteger => out.push_str("BIGINT"),
            ColumnKind::Boolean => out.push_str("BOOLEAN"),
            ColumnKind::TimestampDefaultNow => {
                let _ = write!(
                    out,
                    "TIMESTAMP NOT NULL DEFAULT {}",
                    dialect.current_timestamp()
                );
            }
            ColumnKind::Custom(sql_type) => out.push_str(sql_type),
        }
        // the timestamp kind already carries its own NOT NULL
        if self.not_null && !matches!(self.kind, ColumnKind::TimestampDefaultNow) {
            out.push_str(" NOT NULL");
        }
    }
}

#[derive(Debug, Clone)]
enum TableConstraint {
    PrimaryKey(Vec<String>),
    ForeignKey {
        column: String,
        table: String,
        references: String,
    },
    Unique(Vec<String>),
}

impl TableConstraint {
    fn render(&self, out: &mut String) {
        match self {
            TableConstraint::PrimaryKey(columns) => {
                let _ = write!(out, "PRIMARY KEY ({})", columns.join(", "));
            }
            TableConstraint::ForeignKey {
                column,
                table,
                references,
            } => {
                let _ = write!(
                    out,
                    "FOREIGN KEY ({}) REFERENCES {} ({})",
                    column, table, references
                );
            }
            TableConstraint::Unique(columns) => {
                let _ = write!(out, "UNIQUE ({})", columns.join(", "));
            }
        }
    }
}

fn own(columns: &[&str]) -> Vec<String> {
    columns.iter().map(|c| c.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_table_renders_the_whole_statement() {
        let mut builder = SchemaBuilder::new(SqlDialect::SQLite);
        builder.create_table("accounts", |table| {
            table.id("id");
            table.string("email", Some(255)).not_null();
            table.unique(&["email"]);
        });

        assert_eq!(
            builder.to_sql(),
            vec![
                "CREATE TABLE accounts (\n    \
                 id INTEGER PRIMARY KEY AUTOINCREMENT,\n    \
                 email VARCHAR(255) NOT NULL,\n    \
                 UNIQUE (email)\n);"
            ]
        );
    }

    #[test]
    fn test_id_column_follows_the_dialect() {
        for (dialect, rendered) in [
            (SqlDialect::PostgreSQL, "id BIGSERIAL PRIMARY KEY"),
            (SqlDialect::MySQL, "id BIGINT AUTO_INCREMENT PRIMARY KEY"),
            (SqlDialect::SQLite, "id INTEGER PRIMARY KEY AUTOINCREMENT"),
        ] {
            let mut builder = SchemaBuilder::new(dialect);
            builder.create_table("accounts", |table| {
                table.id("id");
            });
            assert!(builder.build().contains(rendered));
        }
    }

    #[test]
    fn test_references_and_timestamps() {
        let mut builder = SchemaBuilder::new(SqlDialect::PostgreSQL);
        builder.create_table("sessions", |table| {
            table.id("id");
            table.big_integer("account_id").not_null();
            table.column("payload", "JSONB");
            table.boolean("revoked");
            table.timestamps();
            table.foreign_key("account_id", "accounts", "id");
        });

        let sql = builder.build();
        assert!(sql.contains("account_id BIGINT NOT NULL"));
        assert!(sql.contains("payload JSONB"));
        assert!(sql.contains("revoked BOOLEAN"));
        assert!(sql.contains("created_at TIMESTAMP NOT NULL DEFAULT NOW()"));
        assert!(sql.contains("updated_at TIMESTAMP NOT NULL DEFAULT NOW()"));
        assert!(sql.contains("FOREIGN KEY (account_id) REFERENCES accounts (id)"));
    }

    #[test]
    fn test_composite_primary_key() {
        let mut builder = SchemaBuilder::new(SqlDialect::SQLite);
        builder.create_table("memberships", |table| {
            table.integer("account_id").not_null();
            table.integer("team_id").not_null();
            table.primary_key(&["account_id", "team_id"]);
        });

        assert!(builder.build().contains("PRIMARY KEY (account_id, team_id)"));
    }

    #[test]
    fn test_statements_accumulate_in_call_order() {
        let mut builder = SchemaBuilder::new(SqlDialect::SQLite);
        builder
            .add_column("accounts", "locale", "VARCHAR(12)")
            .create_index("accounts", &["locale"], None)
            .drop_index("idx_accounts_locale")
            .drop_column("accounts", "locale")
            .drop_table("accounts")
            .raw("VACUUM;");

        assert_eq!(
            builder.to_sql(),
            vec![
                "ALTER TABLE accounts ADD COLUMN locale VARCHAR(12);",
                "CREATE INDEX idx_accounts_locale ON accounts (locale);",
                "DROP INDEX IF EXISTS idx_accounts_locale;",
                "ALTER TABLE accounts DROP COLUMN locale;",
                "DROP TABLE accounts;",
                "VACUUM;",
            ]
        );
    }
}
