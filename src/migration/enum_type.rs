//! Closed-set (enum) type evolution
//!
//! PostgreSQL enums can grow in place but never shrink, so removing a value
//! recreates the type: a replacement type without the value is created,
//! every dependent column is cast onto it, and the replacement takes over
//! the original name. The type's shape is tracked apart from the columns
//! that use it.

use crate::executor::StoreError;
use crate::migration::schema_manager::{quote_ident, quote_literal};
use crate::migration::{
    Migration, MigrationError, Reversibility, SchemaManager, StepHeader, TransactionMode,
};
use crate::value::Value;

/// Suffix of the replacement type built while shrinking an enum
pub const REPLACEMENT_SUFFIX: &str = "__next";

/// An enum type and its labels in declaration order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumType {
    pub name: String,
    pub values: Vec<String>,
}

/// A column whose type is an enum
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumColumn {
    pub table: String,
    pub column: String,
    /// Column default as stored in the catalog, e.g. `'pending'::review_status`
    pub default: Option<String>,
}

impl EnumType {
    pub fn new<S: Into<String>>(name: impl Into<String>, values: impl IntoIterator<Item = S>) -> Self {
        Self {
            name: name.into(),
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    /// Read the labels of `name` in `current_schema()`
    ///
    /// # Returns
    ///
    /// The labels in sort order, or `None` when the type does not exist.
    ///
    /// # Errors
    ///
    /// Returns `StoreError` if the catalog query fails.
    pub fn load(manager: &SchemaManager<'_>, name: &str) -> Result<Option<Self>, StoreError> {
        let rows = manager.query_all(
            "SELECT e.enumlabel::text FROM pg_enum e \
             JOIN pg_type t ON t.oid = e.enumtypid \
             JOIN pg_namespace n ON n.oid = t.typnamespace \
             WHERE n.nspname = current_schema() AND t.typname = $1 \
             ORDER BY e.enumsortorder",
            &[Value::from(name)],
        )?;
        if rows.is_empty() && !manager.type_exists(name)? {
            return Ok(None);
        }
        let values = rows
            .iter()
            .map(|row| row.get_string(0))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Some(Self::new(name, values)))
    }

    /// Columns in `current_schema()` typed as `name`
    pub fn dependents(manager: &SchemaManager<'_>, name: &str) -> Result<Vec<EnumColumn>, StoreError> {
        let rows = manager.query_all(
            "SELECT table_name::text, column_name::text, column_default::text \
             FROM information_schema.columns \
             WHERE table_schema = current_schema() AND udt_schema = current_schema() AND udt_name = $1 \
             ORDER BY table_name, column_name",
            &[Value::from(name)],
        )?;
        rows.iter()
            .map(|row| {
                Ok(EnumColumn {
                    table: row.get_string(0)?,
                    column: row.get_string(1)?,
                    default: row.get_opt_string(2)?,
                })
            })
            .collect()
    }

    #[must_use]
    pub fn contains(&self, value: &str) -> bool {
        self.values.iter().any(|v| v == value)
    }

    /// `CREATE TYPE name AS ENUM (...)`
    #[must_use]
    pub fn create_sql(&self) -> String {
        let labels: Vec<String> = self.values.iter().map(|v| quote_literal(v)).collect();
        format!(
            "CREATE TYPE {} AS ENUM ({})",
            quote_ident(&self.name),
            labels.join(", ")
        )
    }
}

/// Where `ADD VALUE` places the new label
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValuePosition {
    End,
    Before(String),
    After(String),
}

pub fn create_enum(manager: &SchemaManager<'_>, enum_type: &EnumType) -> Result<(), StoreError> {
    manager.execute(&enum_type.create_sql())?;
    Ok(())
}

pub fn drop_enum(manager: &SchemaManager<'_>, name: &str) -> Result<(), StoreError> {
    manager.execute(&format!("DROP TYPE IF EXISTS {}", quote_ident(name)))?;
    Ok(())
}

/// Append a label in place; idempotent
///
/// Must run outside a transaction block on servers that reject
/// `ADD VALUE` within one, and the new label is unusable until committed.
pub fn add_value(
    manager: &SchemaManager<'_>,
    name: &str,
    value: &str,
    position: &ValuePosition,
) -> Result<(), StoreError> {
    let placement = match position {
        ValuePosition::End => String::new(),
        ValuePosition::Before(other) => format!(" BEFORE {}", quote_literal(other)),
        ValuePosition::After(other) => format!(" AFTER {}", quote_literal(other)),
    };
    manager.execute(&format!(
        "ALTER TYPE {} ADD VALUE IF NOT EXISTS {}{placement}",
        quote_ident(name),
        quote_literal(value)
    ))?;
    Ok(())
}

pub fn rename_value(
    manager: &SchemaManager<'_>,
    name: &str,
    from: &str,
    to: &str,
) -> Result<(), StoreError> {
    manager.execute(&format!(
        "ALTER TYPE {} RENAME VALUE {} TO {}",
        quote_ident(name),
        quote_literal(from),
        quote_literal(to)
    ))?;
    Ok(())
}

/// Remove `value` from enum `name` by recreating the type
///
/// Every check runs before the first DDL statement, so a refusal leaves the
/// type and its columns untouched.
///
/// # Arguments
///
/// * `manager` - Schema manager for the current unit of work
/// * `name` - Enum type to shrink
/// * `value` - Label to remove
///
/// # Returns
///
/// `false` when the value was already absent.
///
/// # Errors
///
/// - `DataIntegrity` if a dependent column stores `value` or defaults to it
/// - `Precondition` if the type does not exist
/// - `Store` if any statement fails
pub fn remove_value(
    manager: &SchemaManager<'_>,
    name: &str,
    value: &str,
) -> Result<bool, MigrationError> {
    let Some(current) = EnumType::load(manager, name)? else {
        return Err(MigrationError::Precondition(format!(
            "enum type '{name}' does not exist"
        )));
    };
    if !current.contains(value) {
        log::info!("Enum {name} has no value '{value}'; nothing to remove");
        return Ok(false);
    }

    let dependents = EnumType::dependents(manager, name)?;
    let literal = quote_literal(value);

    for dep in &dependents {
        let stored = manager.count(
            &format!(
                "SELECT COUNT(*) FROM {} WHERE {}::text = $1",
                quote_ident(&dep.table),
                quote_ident(&dep.column)
            ),
            &[Value::from(value)],
        )?;
        if stored > 0 {
            return Err(MigrationError::data_integrity(format!(
                "cannot remove '{value}' from enum {name}: {stored} row(s) of {}.{} still use it",
                dep.table, dep.column
            )));
        }
        if dep.default.as_deref().is_some_and(|d| d.contains(&literal)) {
            return Err(MigrationError::data_integrity(format!(
                "cannot remove '{value}' from enum {name}: it is the default of {}.{}",
                dep.table, dep.column
            )));
        }
    }

    let replacement = EnumType::new(
        format!("{name}{REPLACEMENT_SUFFIX}"),
        current.values.iter().filter(|v| *v != value).cloned(),
    );
    create_enum(manager, &replacement)?;

    let next = quote_ident(&replacement.name);
    for dep in &dependents {
        let table = quote_ident(&dep.table);
        let column = quote_ident(&dep.column);
        if dep.default.is_some() {
            manager.execute(&format!("ALTER TABLE {table} ALTER COLUMN {column} DROP DEFAULT"))?;
        }
        manager.execute(&format!(
            "ALTER TABLE {table} ALTER COLUMN {column} TYPE {next} USING {column}::text::{next}"
        ))?;
    }

    manager.execute(&format!("DROP TYPE {}", quote_ident(name)))?;
    manager.execute(&format!("ALTER TYPE {next} RENAME TO {}", quote_ident(name)))?;

    for dep in &dependents {
        if let Some(default) = &dep.default {
            manager.execute(&format!(
                "ALTER TABLE {} ALTER COLUMN {} SET DEFAULT {default}",
                quote_ident(&dep.table),
                quote_ident(&dep.column)
            ))?;
        }
    }

    log::info!(
        "Removed '{value}' from enum {name} ({} dependent column(s) recast)",
        dependents.len()
    );
    Ok(true)
}

/// Add a label to an enum
///
/// Applied outside a transaction; an interrupted run is reconciled by
/// [`Migration::is_present`], which checks the label in `pg_enum`.
#[derive(Debug, Clone)]
pub struct AddEnumValue {
    header: StepHeader,
    type_name: String,
    value: String,
    position: ValuePosition,
}

impl AddEnumValue {
    pub fn new(header: StepHeader, type_name: &str, value: &str) -> Self {
        Self {
            header,
            type_name: type_name.to_string(),
            value: value.to_string(),
            position: ValuePosition::End,
        }
    }

    #[must_use]
    pub fn at(mut self, position: ValuePosition) -> Self {
        self.position = position;
        self
    }
}

impl Migration for AddEnumValue {
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
        add_value(manager, &self.type_name, &self.value, &self.position)?;
        Ok(())
    }

    fn revert(&self, manager: &SchemaManager<'_>) -> Result<(), MigrationError> {
        remove_value(manager, &self.type_name, &self.value)?;
        Ok(())
    }

    fn apply_mode(&self) -> TransactionMode {
        TransactionMode::NonTransactional
    }

    fn is_present(&self, manager: &SchemaManager<'_>) -> Result<bool, MigrationError> {
        Ok(EnumType::load(manager, &self.type_name)?.is_some_and(|t| t.contains(&self.value)))
    }

    fn checksum(&self) -> String {
        let position = format!("{:?}", self.position);
        self.header.checksum_with(&[
            self.type_name.as_str(),
            self.value.as_str(),
            position.as_str(),
        ])
    }
}

/// Remove a label from an enum, optionally moving its rows to another label first
///
/// Without a remap the step refuses to run while rows store the value. With
/// a remap the revert cannot tell moved rows apart, so it is best-effort.
#[derive(Debug, Clone)]
pub struct RemoveEnumValue {
    header: StepHeader,
    type_name: String,
    value: String,
    remap_to: Option<String>,
    restore_at: ValuePosition,
}

impl RemoveEnumValue {
    pub fn new(header: StepHeader, type_name: &str, value: &str) -> Self {
        Self {
            header,
            type_name: type_name.to_string(),
            value: value.to_string(),
            remap_to: None,
            restore_at: ValuePosition::End,
        }
    }

    /// Move rows holding the removed value to `replacement` before shrinking
    #[must_use]
    pub fn remap_to(mut self, replacement: &str) -> Self {
        self.remap_to = Some(replacement.to_string());
        self
    }

    /// Where revert re-inserts the label
    #[must_use]
    pub fn restore_at(mut self, position: ValuePosition) -> Self {
        self.restore_at = position;
        self
    }
}

impl Migration for RemoveEnumValue {
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
        if let Some(replacement) = &self.remap_to {
            for dep in EnumType::dependents(manager, &self.type_name)? {
                let moved = manager.execute_with(
                    &format!(
                        "UPDATE {table} SET {column} = {} WHERE {column}::text = $1",
                        quote_literal(replacement),
                        table = quote_ident(&dep.table),
                        column = quote_ident(&dep.column)
                    ),
                    &[Value::from(self.value.as_str())],
                )?;
                if moved > 0 {
                    log::info!(
                        "Moved {moved} row(s) of {}.{} from '{}' to '{replacement}'",
                        dep.table,
                        dep.column,
                        self.value
                    );
                }
            }
        }
        remove_value(manager, &self.type_name, &self.value)?;
        Ok(())
    }

    fn revert(&self, manager: &SchemaManager<'_>) -> Result<(), MigrationError> {
        add_value(manager, &self.type_name, &self.value, &self.restore_at)?;
        Ok(())
    }

    fn revert_mode(&self) -> TransactionMode {
        TransactionMode::NonTransactional
    }

    fn reversibility(&self) -> Reversibility {
        if self.remap_to.is_some() {
            Reversibility::BestEffort("rows moved to the replacement value are not moved back")
        } else {
            Reversibility::Exact
        }
    }

    fn checksum(&self) -> String {
        let restore_at = format!("{:?}", self.restore_at);
        self.header.checksum_with(&[
            self.type_name.as_str(),
            self.value.as_str(),
            self.remap_to.as_deref().unwrap_or(""),
            restore_at.as_str(),
        ])
    }
}

/// Rename a label in place
#[derive(Debug, Clone)]
pub struct RenameEnumValue {
    header: StepHeader,
    type_name: String,
    from: String,
    to: String,
}

impl RenameEnumValue {
    pub fn new(header: StepHeader, type_name: &str, from: &str, to: &str) -> Self {
        Self {
            header,
            type_name: type_name.to_string(),
            from: from.to_string(),
            to: to.to_string(),
        }
    }
}

impl Migration for RenameEnumValue {
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
        rename_value(manager, &self.type_name, &self.from, &self.to)?;
        Ok(())
    }

    fn revert(&self, manager: &SchemaManager<'_>) -> Result<(), MigrationError> {
        rename_value(manager, &self.type_name, &self.to, &self.from)?;
        Ok(())
    }

    fn checksum(&self) -> String {
        self.header.checksum_with(&[
            self.type_name.as_str(),
            self.from.as_str(),
            self.to.as_str(),
        ])
    }
}
