//! SQLite Backend - bundled reference implementation of the connection seam
//!
//! Backed by `rusqlite` with the bundled engine, so tests and small
//! embeddings need no external database. Foreign key enforcement is switched
//! on for every connection; SQLite leaves it off by default, and migrations
//! developed against a lenient database tend to blow up on stricter ones.

use async_trait::async_trait;
use rusqlite::types::{Value, ValueRef};
use rusqlite::Connection;
use std::path::PathBuf;

use crate::database::{ConnectionProvider, DatabaseConnection, DatabaseValue, SqlDialect};
use crate::error::{MigrateError, MigrateResult};

/// Connection provider for SQLite databases
///
/// An in-memory connector hands out a fresh empty database per `connect`
/// call; keep the connection alive for as long as the data should live.
pub struct SqliteConnector {
    path: Option<PathBuf>,
}

impl SqliteConnector {
    /// Connector for an in-memory database
    pub fn in_memory() -> Self {
        Self { path: None }
    }

    /// Connector for a database file, created on first connect
    pub fn at_path(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
        }
    }
}

#[async_trait]
impl ConnectionProvider for SqliteConnector {
    async fn connect(&self) -> MigrateResult<Box<dyn DatabaseConnection>> {
        let conn = match &self.path {
            Some(path) => Connection::open(path),
            None => Connection::open_in_memory(),
        }
        .map_err(|e| MigrateError::Database(format!("failed to open sqlite database: {}", e)))?;

        conn.pragma_update(None, "foreign_keys", true)
            .map_err(|e| MigrateError::Database(format!("failed to enable foreign keys: {}", e)))?;

        Ok(Box::new(SqliteConnection {
            conn,
            in_transaction: false,
        }))
    }
}

/// A single SQLite connection implementing the migration seam
pub struct SqliteConnection {
    conn: Connection,
    in_transaction: bool,
}

#[async_trait]
impl DatabaseConnection for SqliteConnection {
    async fn execute(&mut self, sql: &str, params: &[DatabaseValue]) -> MigrateResult<u64> {
        let values = bind_values(params);
        let affected = self
            .conn
            .execute(sql, rusqlite::params_from_iter(values))
            .map_err(|e| MigrateError::Database(format!("execute failed: {}", e)))?;
        Ok(affected as u64)
    }

    async fn query(
        &mut self,
        sql: &str,
        params: &[DatabaseValue],
    ) -> MigrateResult<Vec<Vec<DatabaseValue>>> {
        let values = bind_values(params);
        let mut stmt = self
            .conn
            .prepare(sql)
            .map_err(|e| MigrateError::Database(format!("prepare failed: {}", e)))?;
        let column_count = stmt.column_count();

        let mut rows = stmt
            .query(rusqlite::params_from_iter(values))
            .map_err(|e| MigrateError::Database(format!("query failed: {}", e)))?;

        let mut out = Vec::new();
        while let Some(row) = rows
            .next()
            .map_err(|e| MigrateError::Database(format!("row fetch failed: {}", e)))?
        {
            let mut record = Vec::with_capacity(column_count);
            for index in 0..column_count {
                let value = row
                    .get_ref(index)
                    .map_err(|e| MigrateError::Database(format!("column read failed: {}", e)))?;
                record.push(read_value(value));
            }
            out.push(record);
        }
        Ok(out)
    }

    async fn begin(&mut self) -> MigrateResult<()> {
        if self.in_transaction {
            return Err(MigrateError::Database(
                "a transaction is already open on this connection".to_string(),
            ));
        }
        self.conn
            .execute_batch("BEGIN")
            .map_err(|e| MigrateError::Database(format!("failed to begin transaction: {}", e)))?;
        self.in_transaction = true;
        Ok(())
    }

    async fn commit(&mut self) -> MigrateResult<()> {
        if !self.in_transaction {
            return Err(MigrateError::Database(
                "no open transaction to commit".to_string(),
            ));
        }
        self.conn
            .execute_batch("COMMIT")
            .map_err(|e| MigrateError::Database(format!("failed to commit transaction: {}", e)))?;
        self.in_transaction = false;
        Ok(())
    }

    async fn rollback(&mut self) -> MigrateResult<()> {
        if !self.in_transaction {
            return Err(MigrateError::Database(
                "no open transaction to roll back".to_string(),
            ));
        }
        self.conn
            .execute_batch("ROLLBACK")
            .map_err(|e| {
                MigrateError::Database(format!("failed to roll back transaction: {}", e))
            })?;
        self.in_transaction = false;
        Ok(())
    }

    fn dialect(&self) -> SqlDialect {
        SqlDialect::SQLite
    }

    async fn table_names(&mut self) -> MigrateResult<Vec<String>> {
        self.query(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
            &[],
        )
        .await?
        .into_iter()
        .map(|row| {
            row.first()
                .and_then(|value| value.as_text())
                .map(|name| name.to_string())
                .ok_or_else(|| {
                    MigrateError::Database("sqlite_master returned a non-text name".to_string())
                })
        })
        .collect()
    }
}

fn bind_values(params: &[DatabaseValue]) -> Vec<Value> {
    params
        .iter()
        .map(|param| match param {
            DatabaseValue::Null => Value::Null,
            DatabaseValue::Bool(b) => Value::Integer(*b as i64),
            DatabaseValue::Integer(i) => Value::Integer(*i),
            DatabaseValue::Real(f) => Value::Real(*f),
            DatabaseValue::Text(s) => Value::Text(s.clone()),
            DatabaseValue::Blob(b) => Value::Blob(b.clone()),
        })
        .collect()
}

fn read_value(value: ValueRef<'_>) -> DatabaseValue {
    match value {
        ValueRef::Null => DatabaseValue::Null,
        ValueRef::Integer(i) => DatabaseValue::Integer(i),
        ValueRef::Real(f) => DatabaseValue::Real(f),
        ValueRef::Text(t) => DatabaseValue::Text(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b) => DatabaseValue::Blob(b.to_vec()),
    }
}
