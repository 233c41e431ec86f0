//! Column lifecycle steps
//!
//! Replacing a column online takes several steps, each its own unit of work:
//! add the new column nullable, backfill it, verify and require it, and
//! finally drop the column it replaces. Each step is exactly reversible as
//! long as the data it derives from is still present.

use crate::migration::schema_manager::{column_def, quote_ident};
use crate::migration::{Migration, MigrationError, Reversibility, SchemaManager, StepHeader};

/// Add a nullable column
#[derive(Debug, Clone)]
pub struct AddColumn {
    header: StepHeader,
    table: String,
    column: String,
    /// SQL type plus modifiers, e.g. `TEXT` or `BIGINT DEFAULT 0`
    definition: String,
}

impl AddColumn {
    pub fn new(header: StepHeader, table: &str, column: &str, definition: &str) -> Self {
        Self {
            header,
            table: table.to_string(),
            column: column.to_string(),
            definition: definition.to_string(),
        }
    }
}

impl Migration for AddColumn {
    fn id(&self) -> &str {
        &self.header.id
    }

    fn predecessor(&self) -> Option<&str> {
        self.header.predecessor.as_deref()
    }

    fn description(&self) -> &str {
        &self.header.description
    }

    fn apply(&self, manager: &SchemaManager<'_>) -> Result<(), MigrationError> {
        manager.add_column_if_not_exists(&self.table, column_def(&self.column, &self.definition))?;
        Ok(())
    }

    fn revert(&self, manager: &SchemaManager<'_>) -> Result<(), MigrationError> {
        manager.drop_column_if_exists(&self.table, &self.column)?;
        Ok(())
    }

    fn checksum(&self) -> String {
        self.header
            .checksum_with(&[self.table.as_str(), self.column.as_str(), self.definition.as_str()])
    }
}

/// Populate `NULL` cells of a column from an SQL expression, then verify none remain
#[derive(Debug, Clone)]
pub struct Backfill {
    header: StepHeader,
    table: String,
    column: String,
    /// Expression evaluated per row, e.g. `upper(legacy_code)`
    expression: String,
}

impl Backfill {
    pub fn new(header: StepHeader, table: &str, column: &str, expression: &str) -> Self {
        Self {
            header,
            table: table.to_string(),
            column: column.to_string(),
            expression: expression.to_string(),
        }
    }
}

impl Migration for Backfill {
    fn id(&self) -> &str {
        &self.header.id
    }

    fn predecessor(&self) -> Option<&str> {
        self.header.predecessor.as_deref()
    }

    fn description(&self) -> &str {
        &self.header.description
    }

    fn apply(&self, manager: &SchemaManager<'_>) -> Result<(), MigrationError> {
        let updated = manager.execute(&format!(
            "UPDATE {table} SET {column} = {expr} WHERE {column} IS NULL",
            table = quote_ident(&self.table),
            column = quote_ident(&self.column),
            expr = self.expression
        ))?;
        log::debug!("Backfilled {updated} row(s) of {}.{}", self.table, self.column);

        let remaining = manager.count_nulls(&self.table, &self.column)?;
        if remaining > 0 {
            return Err(MigrationError::data_integrity(format!(
                "{remaining} row(s) of {}.{} are still NULL after backfill from `{}`",
                self.table, self.column, self.expression
            )));
        }
        Ok(())
    }

    fn revert(&self, manager: &SchemaManager<'_>) -> Result<(), MigrationError> {
        manager.execute(&format!(
            "UPDATE {} SET {} = NULL",
            quote_ident(&self.table),
            quote_ident(&self.column)
        ))?;
        Ok(())
    }

    fn checksum(&self) -> String {
        self.header
            .checksum_with(&[self.table.as_str(), self.column.as_str(), self.expression.as_str()])
    }
}

/// Make a fully populated column `NOT NULL`
#[derive(Debug, Clone)]
pub struct RequireColumn {
    header: StepHeader,
    table: String,
    column: String,
}

impl RequireColumn {
    pub fn new(header: StepHeader, table: &str, column: &str) -> Self {
        Self {
            header,
            table: table.to_string(),
            column: column.to_string(),
        }
    }
}

impl Migration for RequireColumn {
    fn id(&self) -> &str {
        &self.header.id
    }

    fn predecessor(&self) -> Option<&str> {
        self.header.predecessor.as_deref()
    }

    fn description(&self) -> &str {
        &self.header.description
    }

    fn apply(&self, manager: &SchemaManager<'_>) -> Result<(), MigrationError> {
        let nulls = manager.count_nulls(&self.table, &self.column)?;
        if nulls > 0 {
            return Err(MigrationError::data_integrity(format!(
                "cannot require {}.{}: {nulls} row(s) are NULL",
                self.table, self.column
            )));
        }
        manager.set_not_null(&self.table, &self.column)?;
        Ok(())
    }

    fn revert(&self, manager: &SchemaManager<'_>) -> Result<(), MigrationError> {
        manager.drop_not_null(&self.table, &self.column)?;
        Ok(())
    }

    fn checksum(&self) -> String {
        self.header.checksum_with(&[self.table.as_str(), self.column.as_str()])
    }
}

/// How [`DropColumn`] rebuilds the column on revert
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnRestore {
    /// SQL type plus modifiers used to re-add the column
    pub definition: String,
    /// Expression recomputing the dropped values from the columns that remain
    pub expression: Option<String>,
    /// Re-apply `NOT NULL` after repopulating
    pub required: bool,
}

/// Drop a column whose data now lives elsewhere
///
/// Without a restore expression the revert re-adds an empty column, which is
/// reported as best-effort.
#[derive(Debug, Clone)]
pub struct DropColumn {
    header: StepHeader,
    table: String,
    column: String,
    restore: ColumnRestore,
}

impl DropColumn {
    pub fn new(header: StepHeader, table: &str, column: &str, restore: ColumnRestore) -> Self {
        Self {
            header,
            table: table.to_string(),
            column: column.to_string(),
            restore,
        }
    }
}

impl Migration for DropColumn {
    fn id(&self) -> &str {
        &self.header.id
    }

    fn predecessor(&self) -> Option<&str> {
        self.header.predecessor.as_deref()
    }

    fn description(&self) -> &str {
        &self.header.description
    }

    fn apply(&self, manager: &SchemaManager<'_>) -> Result<(), MigrationError> {
        manager.drop_column_if_exists(&self.table, &self.column)?;
        Ok(())
    }

    fn revert(&self, manager: &SchemaManager<'_>) -> Result<(), MigrationError> {
        manager.add_column(&self.table, column_def(&self.column, &self.restore.definition))?;

        if let Some(expr) = &self.restore.expression {
            manager.execute(&format!(
                "UPDATE {} SET {} = {expr}",
                quote_ident(&self.table),
                quote_ident(&self.column)
            ))?;
        }
        if self.restore.required {
            let nulls = manager.count_nulls(&self.table, &self.column)?;
            if nulls > 0 {
                return Err(MigrationError::data_integrity(format!(
                    "cannot restore {}.{} as NOT NULL: {nulls} row(s) have no value",
                    self.table, self.column
                )));
            }
            manager.set_not_null(&self.table, &self.column)?;
        }
        Ok(())
    }

    fn reversibility(&self) -> Reversibility {
        if self.restore.expression.is_some() {
            Reversibility::Exact
        } else {
            Reversibility::BestEffort("dropped values are not restored")
        }
    }

    fn checksum(&self) -> String {
        self.header.checksum_with(&[
            self.table.as_str(),
            self.column.as_str(),
            self.restore.definition.as_str(),
            self.restore.expression.as_deref().unwrap_or(""),
            if self.restore.required { "required" } else { "" },
        ])
    }
}

/// Rename a column in place
#[derive(Debug, Clone)]
pub struct RenameColumn {
    header: StepHeader,
    table: String,
    from: String,
    to: String,
}

impl RenameColumn {
    pub fn new(header: StepHeader, table: &str, from: &str, to: &str) -> Self {
        Self {
            header,
            table: table.to_string(),
            from: from.to_string(),
            to: to.to_string(),
        }
    }
}

impl Migration for RenameColumn {
    fn id(&self) -> &str {
        &self.header.id
    }

    fn predecessor(&self) -> Option<&str> {
        self.header.predecessor.as_deref()
    }

    fn description(&self) -> &str {
        &self.header.description
    }

    fn apply(&self, manager: &SchemaManager<'_>) -> Result<(), MigrationError> {
        manager.rename_column(&self.table, &self.from, &self.to)?;
        Ok(())
    }

    fn revert(&self, manager: &SchemaManager<'_>) -> Result<(), MigrationError> {
        manager.rename_column(&self.table, &self.to, &self.from)?;
        Ok(())
    }

    fn checksum(&self) -> String {
        self.header
            .checksum_with(&[self.table.as_str(), self.from.as_str(), self.to.as_str()])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::RecordingExecutor;
    use crate::value::{Row, Value};

    fn header(id: &str) -> StepHeader {
        StepHeader::new(id, Some("m20240101000000_create_base"))
    }

    #[test]
    fn test_backfill_verifies_no_nulls_remain() {
        let store = RecordingExecutor::new();
        let manager = SchemaManager::new(&store);
        let step = Backfill::new(
            header("m20240103000000_backfill"),
            "accounts",
            "display_name",
            "upper(legacy_name)",
        );

        step.apply(&manager).unwrap();
        assert_eq!(
            store.statements(),
            vec![
                "UPDATE \"accounts\" SET \"display_name\" = upper(legacy_name) WHERE \"display_name\" IS NULL"
            ]
        );
    }

    #[test]
    fn test_backfill_fails_when_expression_yields_null() {
        let store = RecordingExecutor::new();
        store.respond(
            "\"display_name\" IS NULL",
            vec![Row::new(vec![Value::BigInt(3)])],
        );
        let manager = SchemaManager::new(&store);
        let step = Backfill::new(
            header("m20240103000000_backfill"),
            "accounts",
            "display_name",
            "legacy_name",
        );

        let err = step.apply(&manager).unwrap_err();
        assert!(matches!(err, MigrationError::DataIntegrity(_)));
        assert!(err.to_string().contains("3 row(s)"));
    }

    #[test]
    fn test_require_column_refuses_nulls_before_ddl() {
        let store = RecordingExecutor::new();
        store.respond("IS NULL", vec![Row::new(vec![Value::BigInt(1)])]);
        let manager = SchemaManager::new(&store);
        let step = RequireColumn::new(
            header("m20240104000000_make_required"),
            "accounts",
            "display_name",
        );

        assert!(step.apply(&manager).is_err());
        assert!(store.statements_matching("SET NOT NULL").is_empty());
    }

    #[test]
    fn test_drop_column_revert_restores_values() {
        let store = RecordingExecutor::new();
        let manager = SchemaManager::new(&store);
        let step = DropColumn::new(
            header("m20240105000000_drop_legacy"),
            "accounts",
            "legacy_name",
            ColumnRestore {
                definition: "TEXT".to_string(),
                expression: Some("lower(display_name)".to_string()),
                required: true,
            },
        );
        assert_eq!(step.reversibility(), Reversibility::Exact);

        step.revert(&manager).unwrap();
        let log = store.statements();
        assert_eq!(log.len(), 3);
        assert!(log[0].starts_with("ALTER TABLE \"accounts\" ADD COLUMN \"legacy_name\" TEXT"));
        assert_eq!(
            log[1],
            "UPDATE \"accounts\" SET \"legacy_name\" = lower(display_name)"
        );
        assert!(log[2].ends_with("ALTER COLUMN \"legacy_name\" SET NOT NULL"));
    }

    #[test]
    fn test_drop_column_skips_missing_column() {
        let store = RecordingExecutor::new();
        let manager = SchemaManager::new(&store);
        let step = DropColumn::new(
            header("m20240105000000_drop_legacy"),
            "accounts",
            "legacy_name",
            ColumnRestore {
                definition: "TEXT".to_string(),
                expression: None,
                required: false,
            },
        );
        step.apply(&manager).unwrap();
        assert!(store.statements().is_empty());

        store.respond(
            "SELECT COUNT(*) FROM information_schema.columns",
            vec![Row::new(vec![Value::BigInt(1)])],
        );
        step.apply(&manager).unwrap();
        assert_eq!(
            store.statements(),
            vec!["ALTER TABLE \"accounts\" DROP COLUMN \"legacy_name\""]
        );
    }

    #[test]
    fn test_add_column_uses_if_not_exists() {
        let store = RecordingExecutor::new();
        let manager = SchemaManager::new(&store);
        AddColumn::new(header("m20240102000000_add_display_name"), "accounts", "display_name", "TEXT")
            .apply(&manager)
            .unwrap();
        assert!(store.statements()[0]
            .starts_with("ALTER TABLE \"accounts\" ADD COLUMN IF NOT EXISTS \"display_name\" TEXT"));
    }

    #[test]
    fn test_rename_column_round_trip() {
        let store = RecordingExecutor::new();
        let manager = SchemaManager::new(&store);
        let step = RenameColumn::new(
            header("m20240106000000_rename_memo"),
            "transactions",
            "memo",
            "notes",
        );
        step.apply(&manager).unwrap();
        step.revert(&manager).unwrap();
        assert_eq!(
            store.statements(),
            vec![
                "ALTER TABLE \"transactions\" RENAME COLUMN \"memo\" TO \"notes\"",
                "ALTER TABLE \"transactions\" RENAME COLUMN \"notes\" TO \"memo\"",
            ]
        );
    }

    #[test]
    fn test_drop_column_without_expression_is_best_effort() {
        let step = DropColumn::new(
            header("m20240105000000_drop_legacy"),
            "accounts",
            "legacy_name",
            ColumnRestore {
                definition: "TEXT".to_string(),
                expression: None,
                required: false,
            },
        );
        assert!(matches!(step.reversibility(), Reversibility::BestEffort(_)));
    }
}
