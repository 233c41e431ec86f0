//! Enum column to foreign-key conversion
//!
//! Replaces an enum-typed column with a reference to a lookup table whose
//! business key holds the former labels. The conversion runs in fixed
//! phases so a chain can split it across several steps, for example to let
//! application code start writing the link before the enum column goes away.

use crate::migration::enum_type::{create_enum, EnumType};
use crate::migration::schema_manager::{column_def, quote_ident};
use crate::migration::{Migration, MigrationError, Reversibility, SchemaManager, StepHeader};
use sea_query::{ForeignKey, ForeignKeyAction, Index};
use std::ops::RangeBounds;

/// Most unmatched values named in a verification failure
const MAX_REPORTED_VALUES: i64 = 10;

/// Phases of the conversion, in application order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ConversionPhase {
    /// Add the nullable link column
    AddLinkColumn,
    /// Foreign-key constraint plus supporting index
    AddConstraint,
    /// Fill the link by joining the enum label to the lookup business key
    Backfill,
    /// Fail if any row still lacks a link
    Verify,
    /// `SET NOT NULL` on the link
    RequireLink,
    DropEnumColumn,
    /// Skipped with a warning while other columns still use the type
    DropEnumType,
}

impl ConversionPhase {
    pub const ALL: [ConversionPhase; 7] = [
        ConversionPhase::AddLinkColumn,
        ConversionPhase::AddConstraint,
        ConversionPhase::Backfill,
        ConversionPhase::Verify,
        ConversionPhase::RequireLink,
        ConversionPhase::DropEnumColumn,
        ConversionPhase::DropEnumType,
    ];
}

/// Tables and columns taking part in a conversion
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkSpec {
    pub table: String,
    pub enum_column: String,
    pub enum_type: String,
    /// Defaults to `{enum_column}_id`
    pub link_column: String,
    /// SQL type of the link, matching the lookup primary key
    pub link_type: String,
    pub lookup_table: String,
    pub lookup_pk: String,
    /// Lookup column holding the former enum labels
    pub lookup_key: String,
    /// When set, only lookup rows with this column `NULL` are matched
    pub lookup_deleted_column: Option<String>,
    /// Lookup column ordering the labels when the type is rebuilt
    pub lookup_order_column: Option<String>,
    /// Whether every row must end up with a link
    pub required: bool,
    /// Default of the enum column, restored when it is re-added
    pub enum_default: Option<String>,
}

impl LinkSpec {
    pub fn new(table: &str, enum_column: &str, enum_type: &str, lookup_table: &str) -> Self {
        Self {
            table: table.to_string(),
            enum_column: enum_column.to_string(),
            enum_type: enum_type.to_string(),
            link_column: format!("{enum_column}_id"),
            link_type: "UUID".to_string(),
            lookup_table: lookup_table.to_string(),
            lookup_pk: "id".to_string(),
            lookup_key: "code".to_string(),
            lookup_deleted_column: None,
            lookup_order_column: None,
            required: true,
            enum_default: None,
        }
    }

    #[must_use]
    pub fn constraint_name(&self) -> String {
        format!("fk_{}_{}", self.table, self.link_column)
    }

    #[must_use]
    pub fn index_name(&self) -> String {
        format!("idx_{}_{}", self.table, self.link_column)
    }

    fn fingerprint(&self) -> String {
        format!("{self:?}")
    }
}

/// Convert an enum column to a foreign key, phase by phase
#[derive(Debug, Clone)]
pub struct EnumToForeignKey {
    header: StepHeader,
    spec: LinkSpec,
    phases: Vec<ConversionPhase>,
}

impl EnumToForeignKey {
    /// A step running every phase
    pub fn new(header: StepHeader, spec: LinkSpec) -> Self {
        Self {
            header,
            spec,
            phases: ConversionPhase::ALL.to_vec(),
        }
    }

    /// Restrict the step to the phases in `range`
    #[must_use]
    pub fn phases(mut self, range: impl RangeBounds<ConversionPhase>) -> Self {
        self.phases = ConversionPhase::ALL
            .into_iter()
            .filter(|p| range.contains(p))
            .collect();
        self
    }

    pub fn phase_list(&self) -> &[ConversionPhase] {
        &self.phases
    }

    pub fn spec(&self) -> &LinkSpec {
        &self.spec
    }

    fn apply_phase(
        &self,
        manager: &SchemaManager<'_>,
        phase: ConversionPhase,
    ) -> Result<(), MigrationError> {
        let s = &self.spec;
        let table = quote_ident(&s.table);
        let link = quote_ident(&s.link_column);
        let enum_col = quote_ident(&s.enum_column);
        log::debug!("{}: {phase:?}", self.header.id);

        match phase {
            ConversionPhase::AddLinkColumn => {
                manager.add_column_if_not_exists(&s.table, column_def(&s.link_column, &s.link_type))?;
            }
            ConversionPhase::AddConstraint => {
                let fk = ForeignKey::create()
                    .name(s.constraint_name())
                    .from(s.table.clone(), s.link_column.clone())
                    .to(s.lookup_table.clone(), s.lookup_pk.clone())
                    .on_delete(ForeignKeyAction::Restrict)
                    .to_owned();
                manager.create_foreign_key(fk)?;
                let index = Index::create()
                    .if_not_exists()
                    .name(s.index_name())
                    .table(s.table.clone())
                    .col(s.link_column.clone())
                    .to_owned();
                manager.create_index(index)?;
            }
            ConversionPhase::Backfill => {
                let live = s
                    .lookup_deleted_column
                    .as_ref()
                    .map(|c| format!(" AND l.{} IS NULL", quote_ident(c)))
                    .unwrap_or_default();
                let updated = manager.execute(&format!(
                    "UPDATE {table} AS t SET {link} = l.{} FROM {} AS l \
                     WHERE l.{} = t.{enum_col}::text AND t.{link} IS NULL{live}",
                    quote_ident(&s.lookup_pk),
                    quote_ident(&s.lookup_table),
                    quote_ident(&s.lookup_key)
                ))?;
                log::info!("Linked {updated} row(s) of {} to {}", s.table, s.lookup_table);
            }
            ConversionPhase::Verify => self.verify(manager)?,
            ConversionPhase::RequireLink => {
                if s.required {
                    manager.set_not_null(&s.table, &s.link_column)?;
                }
            }
            ConversionPhase::DropEnumColumn => {
                manager.drop_column_if_exists(&s.table, &s.enum_column)?;
            }
            ConversionPhase::DropEnumType => {
                let remaining = EnumType::dependents(manager, &s.enum_type)?;
                if remaining.is_empty() {
                    manager.execute(&format!(
                        "DROP TYPE IF EXISTS {}",
                        quote_ident(&s.enum_type)
                    ))?;
                } else {
                    let users: Vec<String> = remaining
                        .iter()
                        .map(|c| format!("{}.{}", c.table, c.column))
                        .collect();
                    log::warn!(
                        "Keeping enum {}: still used by {}",
                        s.enum_type,
                        users.join(", ")
                    );
                }
            }
        }
        Ok(())
    }

    fn verify(&self, manager: &SchemaManager<'_>) -> Result<(), MigrationError> {
        let s = &self.spec;
        let table = quote_ident(&s.table);
        let link = quote_ident(&s.link_column);
        let enum_col = quote_ident(&s.enum_column);

        let unmatched = manager.count(
            &format!(
                "SELECT COUNT(*) FROM {table} WHERE {link} IS NULL AND {enum_col} IS NOT NULL"
            ),
            &[],
        )?;
        if unmatched > 0 {
            let rows = manager.query_all(
                &format!(
                    "SELECT DISTINCT {enum_col}::text FROM {table} \
                     WHERE {link} IS NULL AND {enum_col} IS NOT NULL \
                     ORDER BY 1 LIMIT {MAX_REPORTED_VALUES}"
                ),
                &[],
            )?;
            let values = rows
                .iter()
                .map(|r| r.get_string(0))
                .collect::<Result<Vec<_>, _>>()?;
            return Err(MigrationError::data_integrity(format!(
                "{unmatched} row(s) of {} have no matching {} row for {}: {}",
                s.table,
                s.lookup_table,
                s.enum_column,
                values.join(", ")
            )));
        }

        if s.required {
            let missing = manager.count_nulls(&s.table, &s.link_column)?;
            if missing > 0 {
                return Err(MigrationError::data_integrity(format!(
                    "{missing} row(s) of {} have neither {} nor {}",
                    s.table, s.enum_column, s.link_column
                )));
            }
        }
        Ok(())
    }

    fn revert_phase(
        &self,
        manager: &SchemaManager<'_>,
        phase: ConversionPhase,
    ) -> Result<(), MigrationError> {
        let s = &self.spec;
        let table = quote_ident(&s.table);
        let link = quote_ident(&s.link_column);
        let enum_col = quote_ident(&s.enum_column);

        match phase {
            ConversionPhase::AddLinkColumn => {
                manager.drop_column_if_exists(&s.table, &s.link_column)?;
            }
            ConversionPhase::AddConstraint => {
                manager.drop_index_if_exists(&s.index_name())?;
                let name = s.constraint_name();
                if manager.constraint_exists(&s.table, &name)? {
                    manager.drop_foreign_key(
                        ForeignKey::drop().name(name).table(s.table.clone()).to_owned(),
                    )?;
                }
            }
            ConversionPhase::Backfill => {
                manager.execute(&format!("UPDATE {table} SET {link} = NULL"))?;
            }
            ConversionPhase::Verify => {}
            ConversionPhase::RequireLink => {
                if s.required {
                    manager.drop_not_null(&s.table, &s.link_column)?;
                }
            }
            ConversionPhase::DropEnumColumn => {
                let enum_type = quote_ident(&s.enum_type);
                manager.add_column(&s.table, column_def(&s.enum_column, &enum_type))?;
                manager.execute(&format!(
                    "UPDATE {table} AS t SET {enum_col} = l.{}::text::{enum_type} \
                     FROM {} AS l WHERE l.{} = t.{link}",
                    quote_ident(&s.lookup_key),
                    quote_ident(&s.lookup_table),
                    quote_ident(&s.lookup_pk)
                ))?;
                if let Some(default) = &s.enum_default {
                    manager.execute(&format!(
                        "ALTER TABLE {table} ALTER COLUMN {enum_col} SET DEFAULT {default}"
                    ))?;
                }
                if s.required {
                    let nulls = manager.count_nulls(&s.table, &s.enum_column)?;
                    if nulls > 0 {
                        return Err(MigrationError::data_integrity(format!(
                            "cannot restore {}.{}: {nulls} row(s) link to no {} row",
                            s.table, s.enum_column, s.lookup_table
                        )));
                    }
                    manager.set_not_null(&s.table, &s.enum_column)?;
                }
            }
            ConversionPhase::DropEnumType => {
                if manager.type_exists(&s.enum_type)? {
                    return Ok(());
                }
                // soft-deleted rows may repeat a live key
                let key = quote_ident(&s.lookup_key);
                let order = quote_ident(s.lookup_order_column.as_deref().unwrap_or(&s.lookup_key));
                let rows = manager.query_all(
                    &format!(
                        "SELECT {key}::text FROM {} GROUP BY {key} ORDER BY min({order}), {key}",
                        quote_ident(&s.lookup_table)
                    ),
                    &[],
                )?;
                let labels = rows
                    .iter()
                    .map(|r| r.get_string(0))
                    .collect::<Result<Vec<_>, _>>()?;
                log::warn!(
                    "Rebuilding enum {} from {} keys ({} value(s))",
                    s.enum_type,
                    s.lookup_table,
                    labels.len()
                );
                create_enum(manager, &EnumType::new(s.enum_type.as_str(), labels))?;
            }
        }
        Ok(())
    }
}

impl Migration for EnumToForeignKey {
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
        for phase in &self.phases {
            self.apply_phase(manager, *phase)?;
        }
        Ok(())
    }

    fn revert(&self, manager: &SchemaManager<'_>) -> Result<(), MigrationError> {
        for phase in self.phases.iter().rev() {
            self.revert_phase(manager, *phase)?;
        }
        Ok(())
    }

    fn reversibility(&self) -> Reversibility {
        if self.phases.contains(&ConversionPhase::DropEnumType) {
            Reversibility::BestEffort("enum labels are rebuilt from the lookup table keys")
        } else {
            Reversibility::Exact
        }
    }

    fn checksum(&self) -> String {
        let fingerprint = self.spec.fingerprint();
        let phases = format!("{:?}", self.phases);
        self.header
            .checksum_with(&[fingerprint.as_str(), phases.as_str()])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::RecordingExecutor;
    use crate::value::{Row, Value};

    fn spec() -> LinkSpec {
        let mut spec = LinkSpec::new("accounts", "account_type", "account_type_kind", "account_types");
        spec.lookup_deleted_column = Some("deleted_at".to_string());
        spec
    }

    fn step() -> EnumToForeignKey {
        EnumToForeignKey::new(
            StepHeader::new("m20240401000002_convert_account_type_to_fk", Some("m20240401000001_create_account_types")),
            spec(),
        )
    }

    fn columns_exist(store: &RecordingExecutor) {
        store.respond(
            "SELECT COUNT(*) FROM information_schema.columns",
            vec![Row::new(vec![Value::BigInt(1)])],
        );
    }

    #[test]
    fn test_phases_run_in_order() {
        let store = RecordingExecutor::new();
        columns_exist(&store);
        let manager = SchemaManager::new(&store);
        step().apply(&manager).unwrap();

        let log = store.statements();
        assert_eq!(log.len(), 7);
        assert!(log[0]
            .starts_with("ALTER TABLE \"accounts\" ADD COLUMN IF NOT EXISTS \"account_type_id\" UUID"));
        assert!(log[1].contains("ADD CONSTRAINT \"fk_accounts_account_type_id\" FOREIGN KEY"));
        assert!(log[1].contains("REFERENCES \"account_types\" (\"id\")"));
        assert!(log[1].contains("ON DELETE RESTRICT"));
        assert!(log[2].starts_with("CREATE INDEX IF NOT EXISTS \"idx_accounts_account_type_id\""));
        assert!(log[3].starts_with("UPDATE \"accounts\" AS t SET \"account_type_id\" = l.\"id\""));
        assert!(log[3].ends_with("AND l.\"deleted_at\" IS NULL"));
        assert!(log[4].ends_with("SET NOT NULL"));
        assert_eq!(log[5], "ALTER TABLE \"accounts\" DROP COLUMN \"account_type\"");
        assert_eq!(log[6], "DROP TYPE IF EXISTS \"account_type_kind\"");
    }

    #[test]
    fn test_unmatched_rows_abort_before_require() {
        let store = RecordingExecutor::new();
        store.respond(
            "IS NULL AND \"account_type\" IS NOT NULL",
            vec![Row::new(vec![Value::BigInt(2)])],
        );
        store.respond(
            "SELECT DISTINCT",
            vec![
                Row::new(vec![Value::from("brokerage")]),
                Row::new(vec![Value::from("crypto")]),
            ],
        );
        let manager = SchemaManager::new(&store);

        let err = step().apply(&manager).unwrap_err();
        assert!(matches!(err, MigrationError::DataIntegrity(_)));
        let msg = err.to_string();
        assert!(msg.contains("2 row(s)"));
        assert!(msg.contains("brokerage, crypto"));
        assert!(store.statements_matching("SET NOT NULL").is_empty());
        assert!(store.statements_matching("DROP COLUMN").is_empty());
    }

    #[test]
    fn test_phase_range_splits_conversion() {
        let first = step().phases(ConversionPhase::AddLinkColumn..=ConversionPhase::RequireLink);
        let second = step().phases(ConversionPhase::DropEnumColumn..);
        assert_eq!(first.phase_list().len(), 5);
        assert_eq!(
            second.phase_list(),
            &[ConversionPhase::DropEnumColumn, ConversionPhase::DropEnumType]
        );
        assert_eq!(first.reversibility(), Reversibility::Exact);
        assert!(matches!(second.reversibility(), Reversibility::BestEffort(_)));
        assert_ne!(first.checksum(), second.checksum());
    }

    #[test]
    fn test_enum_type_kept_while_still_used() {
        let store = RecordingExecutor::new();
        store.respond(
            "udt_name = $1",
            vec![Row::new(vec![
                Value::from("budgets"),
                Value::from("account_type"),
                Value::Null,
            ])],
        );
        let manager = SchemaManager::new(&store);
        step()
            .phases(ConversionPhase::DropEnumType..)
            .apply(&manager)
            .unwrap();
        assert!(store.statements().is_empty());
    }

    #[test]
    fn test_revert_rebuilds_type_from_lookup_keys() {
        let store = RecordingExecutor::new();
        columns_exist(&store);
        store.respond(
            "SELECT \"code\"::text FROM \"account_types\"",
            vec![
                Row::new(vec![Value::from("checking")]),
                Row::new(vec![Value::from("savings")]),
            ],
        );
        let manager = SchemaManager::new(&store);
        step().revert(&manager).unwrap();

        let log = store.statements();
        assert_eq!(
            log[0],
            "CREATE TYPE \"account_type_kind\" AS ENUM ('checking', 'savings')"
        );
        assert!(log[1]
            .starts_with("ALTER TABLE \"accounts\" ADD COLUMN \"account_type\" \"account_type_kind\""));
        assert!(log[2].contains("= l.\"code\"::text::\"account_type_kind\""));
        assert_eq!(
            log.last().map(String::as_str),
            Some("ALTER TABLE \"accounts\" DROP COLUMN \"account_type_id\"")
        );
    }

    #[test]
    fn test_rebuilt_type_lists_each_key_once() {
        let store = RecordingExecutor::new();
        let mut spec = spec();
        spec.lookup_order_column = Some("sort_order".to_string());
        let step = EnumToForeignKey::new(
            StepHeader::new("m20240401000002_convert_account_type_to_fk", Some("m20240401000001_create_account_types")),
            spec,
        )
        .phases(ConversionPhase::DropEnumType..);
        step.revert(&SchemaManager::new(&store)).unwrap();

        let lookup = store
            .queries()
            .into_iter()
            .find(|q| q.contains("FROM \"account_types\""))
            .unwrap();
        assert_eq!(
            lookup,
            "SELECT \"code\"::text FROM \"account_types\" GROUP BY \"code\" ORDER BY min(\"sort_order\"), \"code\""
        );
    }

    #[test]
    fn test_revert_drops_constraint_only_when_present() {
        let store = RecordingExecutor::new();
        let manager = SchemaManager::new(&store);
        let step = step().phases(ConversionPhase::AddConstraint..=ConversionPhase::AddConstraint);
        step.revert(&manager).unwrap();
        assert_eq!(
            store.statements(),
            vec!["DROP INDEX IF EXISTS \"idx_accounts_account_type_id\""]
        );

        store.respond("c.conname = $2", vec![Row::new(vec![Value::BigInt(1)])]);
        step.revert(&manager).unwrap();
        assert_eq!(
            store.statements().last().map(String::as_str),
            Some("ALTER TABLE \"accounts\" DROP CONSTRAINT \"fk_accounts_account_type_id\"")
        );
    }
}
