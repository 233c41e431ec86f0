//! Converging two liveness signals (active flag, deletion timestamp) onto one
//!
//! The soft-delete column is added and backfilled from the flag in one step;
//! the flag is dropped in a later step after the two are re-verified to agree.

use crate::migration::schema_manager::{column_def, quote_ident};
use crate::migration::{Migration, MigrationError, SchemaManager, StepHeader};

const DEFAULT_FLAG: &str = "is_active";
const DEFAULT_DELETED: &str = "deleted_at";

/// Fail unless `flag` is true exactly for the rows where `deleted` is `NULL`
///
/// # Errors
///
/// Returns `DataIntegrity` naming the number of disagreeing rows.
pub fn verify_equivalent(
    manager: &SchemaManager<'_>,
    table: &str,
    flag: &str,
    deleted: &str,
) -> Result<(), MigrationError> {
    let disagreeing = manager.count(
        &format!(
            "SELECT COUNT(*) FROM {} WHERE {} IS DISTINCT FROM ({} IS NULL)",
            quote_ident(table),
            quote_ident(flag),
            quote_ident(deleted)
        ),
        &[],
    )?;
    if disagreeing > 0 {
        return Err(MigrationError::data_integrity(format!(
            "{disagreeing} row(s) of {table} disagree between {flag} and {deleted}"
        )));
    }
    Ok(())
}

/// Add a soft-delete timestamp derived from the active flag
#[derive(Debug, Clone)]
pub struct AddSoftDelete {
    header: StepHeader,
    table: String,
    flag: String,
    deleted: String,
}

impl AddSoftDelete {
    pub fn new(header: StepHeader, table: &str) -> Self {
        Self {
            header,
            table: table.to_string(),
            flag: DEFAULT_FLAG.to_string(),
            deleted: DEFAULT_DELETED.to_string(),
        }
    }

    #[must_use]
    pub fn columns(mut self, flag: &str, deleted: &str) -> Self {
        self.flag = flag.to_string();
        self.deleted = deleted.to_string();
        self
    }
}

impl Migration for AddSoftDelete {
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
        manager.add_column_if_not_exists(&self.table, column_def(&self.deleted, "TIMESTAMPTZ"))?;
        let table = quote_ident(&self.table);
        let deleted = quote_ident(&self.deleted);
        let marked = manager.execute(&format!(
            "UPDATE {table} SET {deleted} = now() WHERE {} = FALSE AND {deleted} IS NULL",
            quote_ident(&self.flag)
        ))?;
        log::info!("Marked {marked} inactive row(s) of {} as deleted", self.table);
        verify_equivalent(manager, &self.table, &self.flag, &self.deleted)
    }

    fn revert(&self, manager: &SchemaManager<'_>) -> Result<(), MigrationError> {
        manager.drop_column_if_exists(&self.table, &self.deleted)?;
        Ok(())
    }

    fn checksum(&self) -> String {
        self.header.checksum_with(&[
            self.table.as_str(),
            self.flag.as_str(),
            self.deleted.as_str(),
        ])
    }
}

/// Drop the active flag once the deletion timestamp carries the same information
#[derive(Debug, Clone)]
pub struct DropActiveFlag {
    header: StepHeader,
    table: String,
    flag: String,
    deleted: String,
}

impl DropActiveFlag {
    pub fn new(header: StepHeader, table: &str) -> Self {
        Self {
            header,
            table: table.to_string(),
            flag: DEFAULT_FLAG.to_string(),
            deleted: DEFAULT_DELETED.to_string(),
        }
    }

    #[must_use]
    pub fn columns(mut self, flag: &str, deleted: &str) -> Self {
        self.flag = flag.to_string();
        self.deleted = deleted.to_string();
        self
    }
}

impl Migration for DropActiveFlag {
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
        verify_equivalent(manager, &self.table, &self.flag, &self.deleted)?;
        manager.drop_column(&self.table, &self.flag)?;
        Ok(())
    }

    fn revert(&self, manager: &SchemaManager<'_>) -> Result<(), MigrationError> {
        manager.add_column(&self.table, column_def(&self.flag, "BOOLEAN DEFAULT TRUE"))?;
        manager.execute(&format!(
            "UPDATE {} SET {} = ({} IS NULL)",
            quote_ident(&self.table),
            quote_ident(&self.flag),
            quote_ident(&self.deleted)
        ))?;
        manager.set_not_null(&self.table, &self.flag)?;
        Ok(())
    }

    fn checksum(&self) -> String {
        self.header.checksum_with(&[
            self.table.as_str(),
            self.flag.as_str(),
            self.deleted.as_str(),
        ])
    }
}
