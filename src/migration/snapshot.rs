//! Catalog snapshot of the current schema
//!
//! Captures columns, constraints, indexes, triggers and enum labels of
//! `current_schema()` so two points in a migration history can be compared.
//! Column order is not part of the snapshot; a column re-added by a revert
//! lands at the end of the table but is otherwise identical.

use crate::executor::StoreError;
use crate::migration::SchemaManager;
use crate::value::Value;
use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColumnSnapshot {
    pub data_type: String,
    pub udt_name: String,
    pub nullable: bool,
    pub default: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SchemaSnapshot {
    /// table -> column -> shape
    pub tables: BTreeMap<String, BTreeMap<String, ColumnSnapshot>>,
    /// `table.constraint` -> definition
    pub constraints: BTreeMap<String, String>,
    /// index name -> definition
    pub indexes: BTreeMap<String, String>,
    /// `table.trigger` -> definition
    pub triggers: BTreeMap<String, String>,
    /// type -> labels in order
    pub enums: BTreeMap<String, Vec<String>>,
}

impl SchemaSnapshot {
    /// Capture the schema, leaving out `exclude_table` (the applied-state table)
    pub fn capture(manager: &SchemaManager<'_>, exclude_table: &str) -> Result<Self, StoreError> {
        let exclude = [Value::from(exclude_table)];
        let mut snapshot = Self::default();

        for row in manager.query_all(
            "SELECT table_name::text, column_name::text, data_type::text, udt_name::text, \
             is_nullable::text, column_default::text \
             FROM information_schema.columns \
             WHERE table_schema = current_schema() AND table_name <> $1 \
             ORDER BY table_name, column_name",
            &exclude,
        )? {
            snapshot.tables.entry(row.get_string(0)?).or_default().insert(
                row.get_string(1)?,
                ColumnSnapshot {
                    data_type: row.get_string(2)?,
                    udt_name: row.get_string(3)?,
                    nullable: row.get_string(4)? == "YES",
                    default: row.get_opt_string(5)?,
                },
            );
        }

        for row in manager.query_all(
            "SELECT t.relname::text, c.conname::text, pg_get_constraintdef(c.oid) \
             FROM pg_constraint c \
             JOIN pg_class t ON t.oid = c.conrelid \
             JOIN pg_namespace n ON n.oid = t.relnamespace \
             WHERE n.nspname = current_schema() AND t.relname <> $1 \
             ORDER BY 1, 2",
            &exclude,
        )? {
            snapshot.constraints.insert(
                format!("{}.{}", row.get_string(0)?, row.get_string(1)?),
                row.get_string(2)?,
            );
        }

        for row in manager.query_all(
            "SELECT indexname::text, indexdef FROM pg_indexes \
             WHERE schemaname = current_schema() AND tablename <> $1 \
             ORDER BY indexname",
            &exclude,
        )? {
            snapshot.indexes.insert(row.get_string(0)?, row.get_string(1)?);
        }

        for row in manager.query_all(
            "SELECT c.relname::text, t.tgname::text, pg_get_triggerdef(t.oid) \
             FROM pg_trigger t \
             JOIN pg_class c ON c.oid = t.tgrelid \
             JOIN pg_namespace n ON n.oid = c.relnamespace \
             WHERE n.nspname = current_schema() AND NOT t.tgisinternal \
             ORDER BY 1, 2",
            &[],
        )? {
            snapshot.triggers.insert(
                format!("{}.{}", row.get_string(0)?, row.get_string(1)?),
                row.get_string(2)?,
            );
        }

        for row in manager.query_all(
            "SELECT t.typname::text, e.enumlabel::text FROM pg_enum e \
             JOIN pg_type t ON t.oid = e.enumtypid \
             JOIN pg_namespace n ON n.oid = t.typnamespace \
             WHERE n.nspname = current_schema() \
             ORDER BY t.typname, e.enumsortorder",
            &[],
        )? {
            snapshot
                .enums
                .entry(row.get_string(0)?)
                .or_default()
                .push(row.get_string(1)?);
        }

        Ok(snapshot)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tables.is_empty() && self.enums.is_empty()
    }

    /// Human-readable differences from `other`, empty when equal
    #[must_use]
    pub fn diff(&self, other: &SchemaSnapshot) -> Vec<String> {
        let mut out = Vec::new();
        diff_maps("table", &self.tables, &other.tables, &mut out);
        diff_maps("constraint", &self.constraints, &other.constraints, &mut out);
        diff_maps("index", &self.indexes, &other.indexes, &mut out);
        diff_maps("trigger", &self.triggers, &other.triggers, &mut out);
        diff_maps("enum", &self.enums, &other.enums, &mut out);
        out
    }
}

fn diff_maps<V: PartialEq + std::fmt::Debug>(
    what: &str,
    left: &BTreeMap<String, V>,
    right: &BTreeMap<String, V>,
    out: &mut Vec<String>,
) {
    for (key, value) in left {
        match right.get(key) {
            None => out.push(format!("- {what} {key}")),
            Some(other) if other != value => {
                out.push(format!("~ {what} {key}: {value:?} -> {other:?}"));
            }
            Some(_) => {}
        }
    }
    for key in right.keys().filter(|k| !left.contains_key(*k)) {
        out.push(format!("+ {what} {key}"));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::RecordingExecutor;
    use crate::value::Row;

    fn column_row(table: &str, column: &str, nullable: &str) -> Row {
        Row::new(vec![
            Value::from(table),
            Value::from(column),
            Value::from("text"),
            Value::from("text"),
            Value::from(nullable),
            Value::Null,
        ])
    }

    #[test]
    fn test_capture_groups_catalog_rows() {
        let store = RecordingExecutor::new();
        store.respond(
            "FROM information_schema.columns",
            vec![
                column_row("accounts", "name", "NO"),
                column_row("accounts", "nickname", "YES"),
            ],
        );
        store.respond(
            "FROM pg_enum",
            vec![
                Row::new(vec![Value::from("review_status"), Value::from("pending")]),
                Row::new(vec![Value::from("review_status"), Value::from("reviewed")]),
            ],
        );
        let manager = SchemaManager::new(&store);
        let snapshot = SchemaSnapshot::capture(&manager, "ledgerline_migrations").unwrap();

        let accounts = &snapshot.tables["accounts"];
        assert!(!accounts["name"].nullable);
        assert!(accounts["nickname"].nullable);
        assert_eq!(snapshot.enums["review_status"], vec!["pending", "reviewed"]);
        assert!(!snapshot.is_empty());
    }

    #[test]
    fn test_diff_reports_changes() {
        let mut before = SchemaSnapshot::default();
        before
            .indexes
            .insert("idx_a".to_string(), "CREATE INDEX idx_a ON a (x)".to_string());
        before
            .enums
            .insert("kind".to_string(), vec!["a".to_string(), "b".to_string()]);

        let mut after = before.clone();
        assert!(before.diff(&after).is_empty());

        after.indexes.remove("idx_a");
        after.enums.insert("kind".to_string(), vec!["a".to_string()]);
        after
            .constraints
            .insert("a.a_pkey".to_string(), "PRIMARY KEY (id)".to_string());

        let diff = before.diff(&after);
        assert_eq!(diff.len(), 3);
        assert!(diff.contains(&"- index idx_a".to_string()));
        assert!(diff.contains(&"+ constraint a.a_pkey".to_string()));
    }
}
