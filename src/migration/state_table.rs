//! Applied-state table management
//!
//! One row per currently-applied step, keyed by step id. Rows are inserted in
//! the same transaction as the step's forward action and deleted in the same
//! transaction as its backward action.

use crate::config::DEFAULT_STATE_TABLE;
use crate::executor::{Executor, StoreError};
use crate::migration::{MigrationRecord, SchemaManager};
use crate::value::Value;
use sea_query::{ColumnDef, Expr, Index, IndexCreateStatement, Table, TableCreateStatement};

/// Handle on the applied-state table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateTable {
    name: String,
}

impl Default for StateTable {
    fn default() -> Self {
        Self::new(DEFAULT_STATE_TABLE)
    }
}

impl StateTable {
    /// `name` must already be a validated lowercase identifier (see `LedgerConfig::validate`)
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// `CREATE TABLE IF NOT EXISTS` for the state table
    ///
    /// The table stores one row per applied step:
    /// - Step id (primary key)
    /// - Predecessor id
    /// - Checksum (SHA-256 of the step definition)
    /// - Applied timestamp
    /// - Execution time
    ///
    /// # Returns
    ///
    /// A `TableCreateStatement` that can be executed via `SchemaManager::create_table()`
    #[must_use]
    pub fn create_statement(&self) -> TableCreateStatement {
        Table::create()
            .table(self.name.clone())
            .if_not_exists()
            .col(
                ColumnDef::new("id")
                    .string_len(255)
                    .not_null()
                    .primary_key(),
            )
            .col(ColumnDef::new("predecessor").string_len(255).null())
            .col(ColumnDef::new("checksum").string_len(64).not_null())
            .col(
                ColumnDef::new("applied_at")
                    .timestamp_with_time_zone()
                    .not_null()
                    .default(Expr::current_timestamp()),
            )
            .col(ColumnDef::new("execution_time_ms").big_integer().null())
            .to_owned()
    }

    /// Index on `applied_at` for ordered reads
    #[must_use]
    pub fn index_statement(&self) -> IndexCreateStatement {
        Index::create()
            .if_not_exists()
            .name(format!("idx_{}_applied_at", self.name))
            .table(self.name.clone())
            .col("applied_at")
            .to_owned()
    }

    /// Create the table and its index if they don't exist
    ///
    /// # Arguments
    ///
    /// * `executor` - The database executor
    ///
    /// # Errors
    ///
    /// Returns `StoreError` if the DDL fails. An existing table is left as is.
    pub fn ensure(&self, executor: &dyn Executor) -> Result<(), StoreError> {
        let manager = SchemaManager::new(executor);
        manager.create_table(self.create_statement())?;
        manager.create_index(self.index_statement())
    }

    /// All applied records, oldest first
    ///
    /// # Errors
    ///
    /// Returns `StoreError` if the query fails or a row cannot be decoded.
    pub fn records(&self, executor: &dyn Executor) -> Result<Vec<MigrationRecord>, StoreError> {
        let sql = format!(
            "SELECT id, predecessor, checksum, (applied_at AT TIME ZONE 'UTC')::text, execution_time_ms \
             FROM {} ORDER BY applied_at ASC, id ASC",
            self.name
        );
        executor
            .query_all(&sql, &[])?
            .iter()
            .map(MigrationRecord::from_row)
            .collect()
    }

    /// # Errors
    ///
    /// Returns `StoreError` if the query fails.
    pub fn is_applied(&self, executor: &dyn Executor, id: &str) -> Result<bool, StoreError> {
        let sql = format!("SELECT COUNT(*) FROM {} WHERE id = $1", self.name);
        Ok(executor.query_scalar_i64(&sql, &[Value::from(id)])? > 0)
    }

    /// Record `id` as applied; the primary key rejects duplicates
    ///
    /// # Errors
    ///
    /// Returns `StoreError` if the insert fails (including a duplicate id).
    pub fn insert(
        &self,
        executor: &dyn Executor,
        id: &str,
        predecessor: Option<&str>,
        checksum: &str,
        execution_time_ms: i64,
    ) -> Result<(), StoreError> {
        let sql = format!(
            "INSERT INTO {} (id, predecessor, checksum, execution_time_ms) VALUES ($1, $2, $3, $4)",
            self.name
        );
        executor.execute(
            &sql,
            &[
                Value::from(id),
                Value::from(predecessor),
                Value::from(checksum),
                Value::BigInt(execution_time_ms),
            ],
        )?;
        Ok(())
    }

    /// Remove the record for `id`
    ///
    /// # Errors
    ///
    /// Returns `StoreError` if the delete fails, or `StoreError::Query` if no
    /// record existed.
    pub fn remove(&self, executor: &dyn Executor, id: &str) -> Result<(), StoreError> {
        let sql = format!("DELETE FROM {} WHERE id = $1", self.name);
        let removed = executor.execute(&sql, &[Value::from(id)])?;
        if removed == 0 {
            return Err(StoreError::Query(format!(
                "no applied-state record for '{id}' in {}",
                self.name
            )));
        }
        Ok(())
    }
}
