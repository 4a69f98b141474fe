//! Migration History - the persisted ledger of applied migrations
//!
//! One row per applied migration. The `seq` column records insertion order
//! and is the authoritative ordering for reverts; identifier sort order is
//! never consulted here, so migrations applied out of name order still
//! revert in the order they actually ran.

use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};

use crate::database::{DatabaseConnection, DatabaseValue};
use crate::definitions::AppliedMigration;
use crate::error::{MigrateError, MigrateResult};

/// Configuration for the history ledger
#[derive(Debug, Clone)]
pub struct HistoryConfig {
    /// Table name the ledger lives in
    pub table_name: String,
    /// Maximum identifier length, used for the primary key column type
    pub identifier_length: u32,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            table_name: "strata_migrations".to_string(),
            identifier_length: 180,
        }
    }
}

/// Ledger of applied migrations, stored in the target database itself
///
/// The store holds no connection. Every operation borrows the connection of
/// the surrounding migration run, so ledger writes share the transaction the
/// migrator opened.
pub struct HistoryStore {
    config: HistoryConfig,
    ensured: AtomicBool,
}

impl HistoryStore {
    /// Create a store with default configuration
    pub fn new() -> Self {
        Self::with_config(HistoryConfig::default())
    }

    /// Create a store with custom configuration
    pub fn with_config(config: HistoryConfig) -> Self {
        Self {
            config,
            ensured: AtomicBool::new(false),
        }
    }

    /// Get the configuration
    pub fn config(&self) -> &HistoryConfig {
        &self.config
    }

    /// Create the ledger table if it does not exist
    ///
    /// Issued at most once per store instance; later calls return without
    /// touching the database. Concurrent creation by another process is
    /// harmless because the statement is `IF NOT EXISTS`.
    pub async fn ensure_table(&self, conn: &mut dyn DatabaseConnection) -> MigrateResult<()> {
        if self.ensured.load(Ordering::SeqCst) {
            return Ok(());
        }

        let sql = self.create_table_sql();
        conn.execute(&sql, &[]).await.map_err(|e| {
            MigrateError::Database(format!("failed to create history table: {}", e))
        })?;
        self.ensured.store(true, Ordering::SeqCst);
        tracing::debug!("ensured history table {}", self.config.table_name);
        Ok(())
    }

    /// Applied migrations, newest first
    ///
    /// `limit` caps the result to the most recently applied entries.
    pub async fn applied(
        &self,
        conn: &mut dyn DatabaseConnection,
        limit: Option<usize>,
    ) -> MigrateResult<Vec<AppliedMigration>> {
        self.ensure_table(conn).await?;

        let mut sql = format!(
            "SELECT identifier, applied_at FROM {} ORDER BY seq DESC",
            self.config.table_name
        );
        if let Some(limit) = limit {
            sql.push_str(&format!(" LIMIT {}", limit));
        }

        let rows = conn
            .query(&sql, &[])
            .await
            .map_err(|e| MigrateError::Database(format!("failed to read history: {}", e)))?;

        let mut records = Vec::with_capacity(rows.len());
        for row in rows {
            let identifier = column_text(&row, 0)?;
            let applied_at = timestamp_from_secs(column_integer(&row, 1)?)?;
            records.push(AppliedMigration {
                identifier,
                applied_at,
            });
        }
        Ok(records)
    }

    /// Check whether an identifier is recorded as applied
    pub async fn is_applied(
        &self,
        conn: &mut dyn DatabaseConnection,
        identifier: &str,
    ) -> MigrateResult<bool> {
        self.ensure_table(conn).await?;

        let dialect = conn.dialect();
        let sql = format!(
            "SELECT identifier FROM {} WHERE identifier = {}",
            self.config.table_name,
            dialect.parameter_placeholder(0)
        );
        let rows = conn
            .query(&sql, &[DatabaseValue::from(identifier)])
            .await
            .map_err(|e| MigrateError::Database(format!("failed to check history: {}", e)))?;
        Ok(!rows.is_empty())
    }

    /// Record a migration as applied
    ///
    /// Fails with [`MigrateError::AlreadyApplied`] when the ledger already
    /// holds a row for the identifier.
    pub async fn record_applied(
        &self,
        conn: &mut dyn DatabaseConnection,
        identifier: &str,
    ) -> MigrateResult<()> {
        if self.is_applied(conn, identifier).await? {
            return Err(MigrateError::AlreadyApplied {
                identifier: identifier.to_string(),
            });
        }

        let dialect = conn.dialect();
        let next_seq = self.next_seq(conn).await?;
        let sql = format!(
            "INSERT INTO {} (identifier, seq, applied_at) VALUES ({}, {}, {})",
            self.config.table_name,
            dialect.parameter_placeholder(0),
            dialect.parameter_placeholder(1),
            dialect.parameter_placeholder(2)
        );
        conn.execute(
            &sql,
            &[
                DatabaseValue::from(identifier),
                DatabaseValue::from(next_seq),
                DatabaseValue::from(Utc::now().timestamp()),
            ],
        )
        .await
        .map_err(|e| MigrateError::Database(format!("failed to record migration: {}", e)))?;

        tracing::debug!("recorded {} as applied (seq {})", identifier, next_seq);
        Ok(())
    }

    /// Delete the ledger row of a reverted migration
    ///
    /// Fails with [`MigrateError::NotApplied`] when no row was deleted.
    pub async fn record_reverted(
        &self,
        conn: &mut dyn DatabaseConnection,
        identifier: &str,
    ) -> MigrateResult<()> {
        self.ensure_table(conn).await?;

        let dialect = conn.dialect();
        let sql = format!(
            "DELETE FROM {} WHERE identifier = {}",
            self.config.table_name,
            dialect.parameter_placeholder(0)
        );
        let affected = conn
            .execute(&sql, &[DatabaseValue::from(identifier)])
            .await
            .map_err(|e| {
                MigrateError::Database(format!("failed to delete history row: {}", e))
            })?;

        if affected == 0 {
            return Err(MigrateError::NotApplied {
                identifier: identifier.to_string(),
            });
        }
        tracing::debug!("removed {} from history", identifier);
        Ok(())
    }

    /// Next value for the insertion sequence
    async fn next_seq(&self, conn: &mut dyn DatabaseConnection) -> MigrateResult<i64> {
        let sql = format!(
            "SELECT COALESCE(MAX(seq), 0) FROM {}",
            self.config.table_name
        );
        let rows = conn
            .query(&sql, &[])
            .await
            .map_err(|e| MigrateError::Database(format!("failed to read max seq: {}", e)))?;
        let latest = rows
            .first()
            .map(|row| column_integer(row, 0))
            .transpose()?
            .unwrap_or(0);
        Ok(latest + 1)
    }

    /// SQL creating the ledger table
    fn create_table_sql(&self) -> String {
        format!(
            "CREATE TABLE IF NOT EXISTS {} (\n    \
                identifier VARCHAR({}) PRIMARY KEY,\n    \
                seq BIGINT NOT NULL,\n    \
                applied_at BIGINT NOT NULL\n\
            );",
            self.config.table_name, self.config.identifier_length
        )
    }
}

impl Default for HistoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn column_text(row: &[DatabaseValue], index: usize) -> MigrateResult<String> {
    row.get(index)
        .and_then(|v| v.as_text())
        .map(|s| s.to_string())
        .ok_or_else(|| {
            MigrateError::Database(format!("history column {} is not a text value", index))
        })
}

fn column_integer(row: &[DatabaseValue], index: usize) -> MigrateResult<i64> {
    row.get(index).and_then(|v| v.as_integer()).ok_or_else(|| {
        MigrateError::Database(format!("history column {} is not an integer value", index))
    })
}

fn timestamp_from_secs(secs: i64) -> MigrateResult<DateTime<Utc>> {
    DateTime::from_timestamp(secs, 0)
        .ok_or_else(|| MigrateError::Database(format!("invalid applied_at timestamp {}", secs)))
}

#[cfg(all(test, feature = "sqlite"))]
mod tests {
    use super::*;
    use crate::database::ConnectionProvider;
    use crate::sqlite::SqliteConnector;

    async fn connect() -> Box<dyn DatabaseConnection> {
        SqliteConnector::in_memory().connect().await.unwrap()
    }

    #[tokio::test]
    async fn test_record_and_list_newest_first() {
        let mut conn = connect().await;
        let store = HistoryStore::new();

        store.record_applied(conn.as_mut(), "M240101000000First").await.unwrap();
        store.record_applied(conn.as_mut(), "M240102000000Second").await.unwrap();
        store.record_applied(conn.as_mut(), "M240103000000Third").await.unwrap();

        let applied = store.applied(conn.as_mut(), None).await.unwrap();
        let identifiers: Vec<_> = applied.iter().map(|m| m.identifier.as_str()).collect();
        assert_eq!(
            identifiers,
            ["M240103000000Third", "M240102000000Second", "M240101000000First"]
        );

        let limited = store.applied(conn.as_mut(), Some(2)).await.unwrap();
        assert_eq!(limited.len(), 2);
        assert_eq!(limited[0].identifier, "M240103000000Third");
    }

    #[tokio::test]
    async fn test_seq_orders_out_of_name_order_applies() {
        let mut conn = connect().await;
        let store = HistoryStore::new();

        // applied in the opposite of identifier sort order
        store.record_applied(conn.as_mut(), "M240109000000Later").await.unwrap();
        store.record_applied(conn.as_mut(), "M240101000000Earlier").await.unwrap();

        let applied = store.applied(conn.as_mut(), None).await.unwrap();
        assert_eq!(applied[0].identifier, "M240101000000Earlier");
        assert_eq!(applied[1].identifier, "M240109000000Later");
    }

    #[tokio::test]
    async fn test_double_record_is_rejected() {
        let mut conn = connect().await;
        let store = HistoryStore::new();

        store.record_applied(conn.as_mut(), "M240101000000First").await.unwrap();
        let err = store
            .record_applied(conn.as_mut(), "M240101000000First")
            .await
            .unwrap_err();
        assert!(matches!(err, MigrateError::AlreadyApplied { .. }));
    }

    #[tokio::test]
    async fn test_revert_unknown_identifier_is_rejected() {
        let mut conn = connect().await;
        let store = HistoryStore::new();

        let err = store
            .record_reverted(conn.as_mut(), "M240101000000Missing")
            .await
            .unwrap_err();
        assert!(matches!(err, MigrateError::NotApplied { .. }));
    }

    #[tokio::test]
    async fn test_ensure_table_is_idempotent() {
        let mut conn = connect().await;
        let store = HistoryStore::new();

        store.ensure_table(conn.as_mut()).await.unwrap();
        store.ensure_table(conn.as_mut()).await.unwrap();

        // a second store instance against the same database is also fine
        let other = HistoryStore::new();
        other.ensure_table(conn.as_mut()).await.unwrap();

        let applied = store.applied(conn.as_mut(), None).await.unwrap();
        assert!(applied.is_empty());
    }
}
