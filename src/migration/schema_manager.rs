//! SchemaManager - Provides methods for schema operations in migrations

use crate::executor::{Executor, StoreError};
use crate::value::{Row, Value};
use sea_query::{
    ColumnDef, ForeignKeyCreateStatement, ForeignKeyDropStatement, Index, IndexCreateStatement,
    IndexDropStatement, PostgresQueryBuilder, SchemaStatementBuilder, Table, TableAlterStatement,
    TableCreateStatement, TableDropStatement,
};

/// SchemaManager provides methods for performing schema operations in migrations
///
/// It wraps an [`Executor`] reference and offers builders for common DDL plus
/// catalog checks (`column_exists`, `column_is_nullable`, ...) that steps use to
/// make their actions idempotent and to verify preconditions.
///
/// Catalog checks are scoped to `current_schema()`.
pub struct SchemaManager<'a> {
    executor: &'a dyn Executor,
}

impl<'a> SchemaManager<'a> {
    /// Create a new SchemaManager over the given executor
    pub fn new(executor: &'a dyn Executor) -> Self {
        Self { executor }
    }

    /// Get a reference to the underlying executor
    pub fn executor(&self) -> &'a dyn Executor {
        self.executor
    }

    /// Execute raw SQL without parameters
    ///
    /// # Returns
    ///
    /// The number of rows affected.
    ///
    /// # Example
    /// ```rust,no_run
    /// # fn f(manager: &ledgerline::migration::SchemaManager<'_>) -> Result<(), ledgerline::StoreError> {
    /// manager.execute("CREATE EXTENSION IF NOT EXISTS pg_trgm")?;
    /// # Ok(()) }
    /// ```
    pub fn execute(&self, sql: &str) -> Result<u64, StoreError> {
        self.executor.execute(sql, &[])
    }

    /// Execute raw SQL with bound parameters
    ///
    /// # Arguments
    ///
    /// * `sql` - Statement using `$1`, `$2`, ... placeholders
    /// * `params` - Values bound to the placeholders in order
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Query` if the statement fails.
    pub fn execute_with(&self, sql: &str, params: &[Value]) -> Result<u64, StoreError> {
        self.executor.execute(sql, params)
    }

    /// Execute each statement in order, stopping at the first failure
    pub fn execute_all<S: AsRef<str>>(&self, statements: &[S]) -> Result<(), StoreError> {
        for sql in statements {
            self.executor.execute(sql.as_ref(), &[])?;
        }
        Ok(())
    }

    pub fn query_all(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>, StoreError> {
        self.executor.query_all(sql, params)
    }

    /// Run a `SELECT COUNT(*) ...` style query
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Decode` if the first column of the first row is not an integer.
    pub fn count(&self, sql: &str, params: &[Value]) -> Result<i64, StoreError> {
        self.executor.query_scalar_i64(sql, params)
    }

    /// Create a table from a sea-query builder
    ///
    /// # Example
    /// ```rust,no_run
    /// use sea_query::{ColumnDef, Table};
    /// # fn f(manager: &ledgerline::migration::SchemaManager<'_>) -> Result<(), ledgerline::StoreError> {
    /// let table = Table::create()
    ///     .table("tags")
    ///     .if_not_exists()
    ///     .col(ColumnDef::new("id").uuid().not_null().primary_key())
    ///     .to_owned();
    /// manager.create_table(table)?;
    /// # Ok(()) }
    /// ```
    pub fn create_table(&self, table: TableCreateStatement) -> Result<(), StoreError> {
        let sql = table.build(PostgresQueryBuilder);
        self.executor.execute(&sql, &[]).map(|_| ())
    }

    /// Drop a table
    ///
    /// # Example
    /// ```rust,no_run
    /// use sea_query::Table;
    /// # fn f(manager: &ledgerline::migration::SchemaManager<'_>) -> Result<(), ledgerline::StoreError> {
    /// manager.drop_table(Table::drop().table("tags").if_exists().to_owned())?;
    /// # Ok(()) }
    /// ```
    pub fn drop_table(&self, table: TableDropStatement) -> Result<(), StoreError> {
        let sql = table.build(PostgresQueryBuilder);
        self.executor.execute(&sql, &[]).map(|_| ())
    }

    /// Alter a table
    ///
    /// Uses `Table::alter()` to build ALTER TABLE statements.
    pub fn alter_table(&self, alter: TableAlterStatement) -> Result<(), StoreError> {
        let sql = alter.build(PostgresQueryBuilder);
        self.executor.execute(&sql, &[]).map(|_| ())
    }

    /// Create an index
    ///
    /// # Example
    /// ```rust,no_run
    /// use sea_query::Index;
    /// # fn f(manager: &ledgerline::migration::SchemaManager<'_>) -> Result<(), ledgerline::StoreError> {
    /// let index = Index::create()
    ///     .if_not_exists()
    ///     .name("idx_tags_name")
    ///     .table("tags")
    ///     .col("name")
    ///     .to_owned();
    /// manager.create_index(index)?;
    /// # Ok(()) }
    /// ```
    pub fn create_index(&self, index: IndexCreateStatement) -> Result<(), StoreError> {
        let sql = index.build(PostgresQueryBuilder);
        self.executor.execute(&sql, &[]).map(|_| ())
    }

    /// Drop an index
    pub fn drop_index(&self, index: IndexDropStatement) -> Result<(), StoreError> {
        let sql = index.build(PostgresQueryBuilder);
        self.executor.execute(&sql, &[]).map(|_| ())
    }

    /// `DROP INDEX IF EXISTS` by name
    pub fn drop_index_if_exists(&self, name: &str) -> Result<(), StoreError> {
        let index = Index::drop().name(name.to_string()).if_exists().to_owned();
        self.drop_index(index)
    }

    /// Add a foreign-key constraint to an existing table
    ///
    /// # Example
    /// ```rust,no_run
    /// use sea_query::{ForeignKey, ForeignKeyAction};
    /// # fn f(manager: &ledgerline::migration::SchemaManager<'_>) -> Result<(), ledgerline::StoreError> {
    /// let fk = ForeignKey::create()
    ///     .name("fk_accounts_institution_id")
    ///     .from("accounts", "institution_id")
    ///     .to("financial_institutions", "id")
    ///     .on_delete(ForeignKeyAction::Restrict)
    ///     .to_owned();
    /// manager.create_foreign_key(fk)?;
    /// # Ok(()) }
    /// ```
    pub fn create_foreign_key(&self, fk: ForeignKeyCreateStatement) -> Result<(), StoreError> {
        let sql = fk.build(PostgresQueryBuilder);
        self.executor.execute(&sql, &[]).map(|_| ())
    }

    /// Drop a foreign-key constraint
    pub fn drop_foreign_key(&self, fk: ForeignKeyDropStatement) -> Result<(), StoreError> {
        let sql = fk.build(PostgresQueryBuilder);
        self.executor.execute(&sql, &[]).map(|_| ())
    }

    /// Add a column to an existing table
    ///
    /// # Example
    /// ```rust,no_run
    /// use sea_query::ColumnDef;
    /// # fn f(manager: &ledgerline::migration::SchemaManager<'_>) -> Result<(), ledgerline::StoreError> {
    /// manager.add_column("accounts", ColumnDef::new("nickname").text().null().to_owned())?;
    /// # Ok(()) }
    /// ```
    pub fn add_column(&self, table: &str, mut column: ColumnDef) -> Result<(), StoreError> {
        let alter = Table::alter()
            .table(table.to_string())
            .add_column(&mut column)
            .to_owned();
        self.alter_table(alter)
    }

    /// `ADD COLUMN IF NOT EXISTS`
    pub fn add_column_if_not_exists(&self, table: &str, mut column: ColumnDef) -> Result<(), StoreError> {
        let alter = Table::alter()
            .table(table.to_string())
            .add_column_if_not_exists(&mut column)
            .to_owned();
        self.alter_table(alter)
    }

    /// Drop a column from an existing table
    ///
    /// # Example
    /// ```rust,no_run
    /// # fn f(manager: &ledgerline::migration::SchemaManager<'_>) -> Result<(), ledgerline::StoreError> {
    /// manager.drop_column("accounts", "nickname")?;
    /// # Ok(()) }
    /// ```
    pub fn drop_column(&self, table: &str, column: &str) -> Result<(), StoreError> {
        let alter = Table::alter()
            .table(table.to_string())
            .drop_column(column.to_string())
            .to_owned();
        self.alter_table(alter)
    }

    /// Drop a column if the catalog lists it
    ///
    /// # Arguments
    ///
    /// * `table` - Table to alter
    /// * `column` - Column to drop
    ///
    /// # Returns
    ///
    /// `true` if the column existed and was dropped.
    ///
    /// # Errors
    ///
    /// Returns `StoreError` if the catalog query or the `ALTER TABLE` fails.
    pub fn drop_column_if_exists(&self, table: &str, column: &str) -> Result<bool, StoreError> {
        if !self.column_exists(table, column)? {
            return Ok(false);
        }
        self.drop_column(table, column)?;
        Ok(true)
    }

    /// Rename a column in an existing table
    ///
    /// # Example
    /// ```rust,no_run
    /// # fn f(manager: &ledgerline::migration::SchemaManager<'_>) -> Result<(), ledgerline::StoreError> {
    /// manager.rename_column("transactions", "memo", "notes")?;
    /// # Ok(()) }
    /// ```
    pub fn rename_column(&self, table: &str, from: &str, to: &str) -> Result<(), StoreError> {
        let alter = Table::alter()
            .table(table.to_string())
            .rename_column(from.to_string(), to.to_string())
            .to_owned();
        self.alter_table(alter)
    }

    /// `ALTER COLUMN .. SET NOT NULL`
    pub fn set_not_null(&self, table: &str, column: &str) -> Result<(), StoreError> {
        let alter = Table::alter()
            .table(table.to_string())
            .modify_column(ColumnDef::new(column.to_string()).not_null())
            .to_owned();
        self.alter_table(alter)
    }

    /// `ALTER COLUMN .. DROP NOT NULL`
    pub fn drop_not_null(&self, table: &str, column: &str) -> Result<(), StoreError> {
        let alter = Table::alter()
            .table(table.to_string())
            .modify_column(ColumnDef::new(column.to_string()).null())
            .to_owned();
        self.alter_table(alter)
    }

    /// Whether `table` has `column`
    pub fn column_exists(&self, table: &str, column: &str) -> Result<bool, StoreError> {
        let n = self.count(
            "SELECT COUNT(*) FROM information_schema.columns \
             WHERE table_schema = current_schema() AND table_name = $1 AND column_name = $2",
            &[Value::from(table), Value::from(column)],
        )?;
        Ok(n > 0)
    }

    /// Nullability of `table.column` as recorded in `information_schema`
    ///
    /// # Returns
    ///
    /// `Some(true)` when the column accepts NULL, `Some(false)` when it is
    /// `NOT NULL`, and `None` when the column does not exist.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Decode` if `is_nullable` cannot be read as text.
    pub fn column_is_nullable(&self, table: &str, column: &str) -> Result<Option<bool>, StoreError> {
        let rows = self.query_all(
            "SELECT is_nullable::text FROM information_schema.columns \
             WHERE table_schema = current_schema() AND table_name = $1 AND column_name = $2",
            &[Value::from(table), Value::from(column)],
        )?;
        match rows.first() {
            Some(row) => Ok(Some(row.get_string(0)? == "YES")),
            None => Ok(None),
        }
    }

    /// Whether `table` carries a constraint named `constraint`
    pub fn constraint_exists(&self, table: &str, constraint: &str) -> Result<bool, StoreError> {
        let n = self.count(
            "SELECT COUNT(*) FROM pg_constraint c \
             JOIN pg_class t ON t.oid = c.conrelid \
             JOIN pg_namespace n ON n.oid = t.relnamespace \
             WHERE n.nspname = current_schema() AND t.relname = $1 AND c.conname = $2",
            &[Value::from(table), Value::from(constraint)],
        )?;
        Ok(n > 0)
    }

    /// Whether a type named `type_name` exists in the current schema
    pub fn type_exists(&self, type_name: &str) -> Result<bool, StoreError> {
        let n = self.count(
            "SELECT COUNT(*) FROM pg_type t \
             JOIN pg_namespace n ON n.oid = t.typnamespace \
             WHERE n.nspname = current_schema() AND t.typname = $1",
            &[Value::from(type_name)],
        )?;
        Ok(n > 0)
    }

    /// Rows in `table` where `column IS NULL`
    pub fn count_nulls(&self, table: &str, column: &str) -> Result<i64, StoreError> {
        self.count(
            &format!(
                "SELECT COUNT(*) FROM {} WHERE {} IS NULL",
                quote_ident(table),
                quote_ident(column)
            ),
            &[],
        )
    }
}

/// Column definition from a raw SQL type and modifiers
///
/// # Arguments
///
/// * `column` - Column name
/// * `definition` - Type plus modifiers as written in DDL, e.g. `TEXT` or
///   `NUMERIC(19,4) DEFAULT 0`; quote user-defined type names with [`quote_ident`]
#[must_use]
pub fn column_def(column: &str, definition: &str) -> ColumnDef {
    ColumnDef::new(column.to_string())
        .custom(definition.to_string())
        .to_owned()
}

/// Quote an SQL identifier (`"name"`), doubling embedded quotes
#[must_use]
pub fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

/// Quote an SQL string literal (`'value'`), doubling embedded quotes
#[must_use]
pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::RecordingExecutor;
    use sea_query::ColumnDef;

    #[test]
    fn test_quote_ident_and_literal() {
        assert_eq!(quote_ident("accounts"), "\"accounts\"");
        assert_eq!(quote_ident("we\"ird"), "\"we\"\"ird\"");
        assert_eq!(quote_literal("o'brien"), "'o''brien'");
    }

    #[test]
    fn test_column_helpers_emit_alter_table() {
        let store = RecordingExecutor::new();
        let manager = SchemaManager::new(&store);

        manager
            .add_column("accounts", ColumnDef::new("nickname").text().null().to_owned())
            .unwrap();
        manager
            .add_column_if_not_exists("accounts", column_def("opening_note", "TEXT"))
            .unwrap();
        manager.drop_column("accounts", "nickname").unwrap();
        manager.rename_column("transactions", "memo", "notes").unwrap();
        manager.set_not_null("accounts", "opening_note").unwrap();
        manager.drop_not_null("accounts", "opening_note").unwrap();

        let log = store.statements();
        assert!(log[0].starts_with("ALTER TABLE \"accounts\" ADD COLUMN \"nickname\""));
        assert!(log[1].starts_with(
            "ALTER TABLE \"accounts\" ADD COLUMN IF NOT EXISTS \"opening_note\" TEXT"
        ));
        assert_eq!(log[2], "ALTER TABLE \"accounts\" DROP COLUMN \"nickname\"");
        assert_eq!(
            log[3],
            "ALTER TABLE \"transactions\" RENAME COLUMN \"memo\" TO \"notes\""
        );
        assert!(log[4].ends_with("ALTER COLUMN \"opening_note\" SET NOT NULL"));
        assert!(log[5].ends_with("ALTER COLUMN \"opening_note\" DROP NOT NULL"));
    }

    #[test]
    fn test_drop_column_if_exists_consults_catalog() {
        let store = RecordingExecutor::new();
        let manager = SchemaManager::new(&store);
        assert!(!manager.drop_column_if_exists("accounts", "ghost").unwrap());
        assert!(store.statements().is_empty());

        store.respond(
            "SELECT COUNT(*) FROM information_schema.columns",
            vec![Row::new(vec![Value::BigInt(1)])],
        );
        assert!(manager.drop_column_if_exists("accounts", "nickname").unwrap());
        assert_eq!(
            store.statements(),
            vec!["ALTER TABLE \"accounts\" DROP COLUMN \"nickname\""]
        );
    }

    #[test]
    fn test_foreign_key_helpers() {
        use sea_query::{ForeignKey, ForeignKeyAction};

        let store = RecordingExecutor::new();
        let manager = SchemaManager::new(&store);
        manager
            .create_foreign_key(
                ForeignKey::create()
                    .name("fk_accounts_institution_id")
                    .from("accounts", "institution_id")
                    .to("financial_institutions", "id")
                    .on_delete(ForeignKeyAction::Restrict)
                    .to_owned(),
            )
            .unwrap();
        manager
            .drop_foreign_key(
                ForeignKey::drop()
                    .name("fk_accounts_institution_id")
                    .table("accounts")
                    .to_owned(),
            )
            .unwrap();

        let log = store.statements();
        assert!(log[0].starts_with(
            "ALTER TABLE \"accounts\" ADD CONSTRAINT \"fk_accounts_institution_id\" FOREIGN KEY (\"institution_id\")"
        ));
        assert!(log[0].contains("REFERENCES \"financial_institutions\" (\"id\")"));
        assert!(log[0].contains("ON DELETE RESTRICT"));
        assert_eq!(
            log[1],
            "ALTER TABLE \"accounts\" DROP CONSTRAINT \"fk_accounts_institution_id\""
        );
    }

    #[test]
    fn test_column_is_nullable_reads_catalog() {
        let store = RecordingExecutor::new();
        store.respond(
            "information_schema.columns",
            vec![Row::new(vec![Value::from("NO")])],
        );
        let manager = SchemaManager::new(&store);
        assert_eq!(
            manager.column_is_nullable("accounts", "name").unwrap(),
            Some(false)
        );
    }

    #[test]
    fn test_missing_column_is_none() {
        let store = RecordingExecutor::new();
        let manager = SchemaManager::new(&store);
        assert_eq!(manager.column_is_nullable("accounts", "ghost").unwrap(), None);
    }
}
