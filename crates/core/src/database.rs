//! Database Connection Seam - traits the migration system consumes
//!
//! The runner owns no driver code of its own. Everything it needs from a
//! database is expressed here as object-safe async traits, so any engine can
//! sit behind a `Box<dyn DatabaseConnection>`. The bundled SQLite backend in
//! `crate::sqlite` is one implementation; server databases plug in the same
//! way from the embedding application.

use async_trait::async_trait;

use crate::error::MigrateResult;

/// Abstract stateful database connection
///
/// A connection is used exclusively by one operation at a time, which is why
/// every method takes `&mut self`. Transaction control is part of the
/// surface, but migrations never see it: the migrator owns begin/commit/
/// rollback for the whole unit.
#[async_trait]
pub trait DatabaseConnection: Send {
    /// Execute a statement and return the affected row count
    async fn execute(&mut self, sql: &str, params: &[DatabaseValue]) -> MigrateResult<u64>;

    /// Run a query and return every result row in positional form
    async fn query(
        &mut self,
        sql: &str,
        params: &[DatabaseValue],
    ) -> MigrateResult<Vec<Vec<DatabaseValue>>>;

    /// Begin a transaction on this connection
    async fn begin(&mut self) -> MigrateResult<()>;

    /// Commit the open transaction
    async fn commit(&mut self) -> MigrateResult<()>;

    /// Roll back the open transaction
    async fn rollback(&mut self) -> MigrateResult<()>;

    /// The SQL dialect spoken by this connection
    fn dialect(&self) -> SqlDialect;

    /// Names of the user tables visible to this connection
    async fn table_names(&mut self) -> MigrateResult<Vec<String>>;
}

/// Produces connections on demand
///
/// The CLI layer treats the absence of a provider as "no database
/// configured" and refuses every command that would need one.
#[async_trait]
pub trait ConnectionProvider: Send + Sync {
    /// Open a fresh connection
    async fn connect(&self) -> MigrateResult<Box<dyn DatabaseConnection>>;
}

/// Positional parameter and result values crossing the connection seam
#[derive(Debug, Clone, PartialEq)]
pub enum DatabaseValue {
    Null,
    Bool(bool),
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
}

impl DatabaseValue {
    /// Whether this is the SQL NULL value
    pub fn is_null(&self) -> bool {
        matches!(self, DatabaseValue::Null)
    }

    /// Borrow the text payload, if this is a text value
    pub fn as_text(&self) -> Option<&str> {
        match self {
            DatabaseValue::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Extract an integer payload, if this is an integer value
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            DatabaseValue::Integer(i) => Some(*i),
            _ => None,
        }
    }
}

impl From<bool> for DatabaseValue {
    fn from(value: bool) -> Self {
        DatabaseValue::Bool(value)
    }
}

impl From<i32> for DatabaseValue {
    fn from(value: i32) -> Self {
        DatabaseValue::Integer(value as i64)
    }
}

impl From<i64> for DatabaseValue {
    fn from(value: i64) -> Self {
        DatabaseValue::Integer(value)
    }
}

impl From<f64> for DatabaseValue {
    fn from(value: f64) -> Self {
        DatabaseValue::Real(value)
    }
}

impl From<String> for DatabaseValue {
    fn from(value: String) -> Self {
        DatabaseValue::Text(value)
    }
}

impl From<&str> for DatabaseValue {
    fn from(value: &str) -> Self {
        DatabaseValue::Text(value.to_string())
    }
}

impl From<Vec<u8>> for DatabaseValue {
    fn from(value: Vec<u8>) -> Self {
        DatabaseValue::Blob(value)
    }
}

impl<T> From<Option<T>> for DatabaseValue
where
    T: Into<DatabaseValue>,
{
    fn from(value: Option<T>) -> Self {
        match value {
            Some(v) => v.into(),
            None => DatabaseValue::Null,
        }
    }
}

/// The SQL flavors the schema builder and the ledger know how to target
///
/// This is a seed for generated SQL, not a dialect abstraction layer.
/// Anything engine-specific beyond these helpers belongs in the migration
/// body itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlDialect {
    PostgreSQL,
    MySQL,
    SQLite,
}

impl SqlDialect {
    /// Bind-parameter placeholder for the given zero-based index
    pub fn parameter_placeholder(&self, index: usize) -> String {
        match self {
            SqlDialect::PostgreSQL => format!("${}", index + 1),
            SqlDialect::MySQL | SqlDialect::SQLite => "?".to_string(),
        }
    }

    /// Quote character for identifiers in this dialect
    pub fn identifier_quote(&self) -> char {
        match self {
            SqlDialect::PostgreSQL => '"',
            SqlDialect::MySQL => '`',
            SqlDialect::SQLite => '"',
        }
    }

    /// Expression yielding the current time in this dialect
    pub fn current_timestamp(&self) -> &'static str {
        match self {
            SqlDialect::PostgreSQL => "NOW()",
            SqlDialect::MySQL => "CURRENT_TIMESTAMP",
            SqlDialect::SQLite => "CURRENT_TIMESTAMP",
        }
    }

    /// Column definition for an auto-incrementing primary key
    pub fn auto_increment_primary_key(&self) -> &'static str {
        match self {
            SqlDialect::PostgreSQL => "BIGSERIAL PRIMARY KEY",
            SqlDialect::MySQL => "BIGINT AUTO_INCREMENT PRIMARY KEY",
            SqlDialect::SQLite => "INTEGER PRIMARY KEY AUTOINCREMENT",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parameter_placeholders() {
        assert_eq!(SqlDialect::PostgreSQL.parameter_placeholder(0), "$1");
        assert_eq!(SqlDialect::PostgreSQL.parameter_placeholder(2), "$3");
        assert_eq!(SqlDialect::MySQL.parameter_placeholder(0), "?");
        assert_eq!(SqlDialect::SQLite.parameter_placeholder(5), "?");
    }

    #[test]
    fn test_value_conversions() {
        assert_eq!(DatabaseValue::from(42i64), DatabaseValue::Integer(42));
        assert_eq!(DatabaseValue::from(7i32), DatabaseValue::Integer(7));
        assert_eq!(
            DatabaseValue::from("hello"),
            DatabaseValue::Text("hello".to_string())
        );
        assert_eq!(DatabaseValue::from(None::<i64>), DatabaseValue::Null);
        assert!(DatabaseValue::Null.is_null());
        assert_eq!(DatabaseValue::Integer(3).as_integer(), Some(3));
        assert_eq!(DatabaseValue::Text("x".into()).as_text(), Some("x"));
    }
}
