//! Integration tests for the migration engine
//!
//! These tests run against a real PostgreSQL database named by
//! `LEDGERLINE_TEST_DATABASE_URL` and are skipped when it is unset.
//!
//! Each test works in a fresh schema (first on `search_path`) and with its
//! own advisory lock key, so tests can run in parallel against one database.

use ledgerline::migration::{
    AddColumn, Backfill, ColumnRestore, DropColumn, ErrorKind, EnumType, Migration,
    MigrationChain, MigrationError, Migrator, RemoveEnumValue, RequireColumn, SchemaManager,
    SchemaSnapshot, SqlMigration, StepHeader, BASE,
};
use ledgerline::ledger::migrations as ledger;
use ledgerline::{connect_executor, Executor, PostgresExecutor};
use std::env;
use std::sync::Mutex;
use uuid::Uuid;

/// `CREATE EXTENSION` is database-wide and races when run concurrently
static LEDGER_CHAIN: Mutex<()> = Mutex::new(());

struct TestSchema {
    executor: PostgresExecutor,
    name: String,
    lock_key: i64,
}

impl TestSchema {
    fn open() -> Option<Self> {
        let Ok(url) = env::var("LEDGERLINE_TEST_DATABASE_URL") else {
            eprintln!("skipping: LEDGERLINE_TEST_DATABASE_URL is not set");
            return None;
        };
        let executor = connect_executor(&url).expect("connect to test database");
        let id = Uuid::new_v4();
        let name = format!("ll_test_{}", id.simple());
        executor
            .execute(&format!("CREATE SCHEMA {name}"), &[])
            .expect("create test schema");
        executor
            .execute(&format!("SET search_path TO {name}, public"), &[])
            .expect("set search_path");
        Some(Self {
            executor,
            name,
            lock_key: (id.as_u64_pair().0 >> 1) as i64,
        })
    }

    fn migrator(&self, chain: MigrationChain) -> Migrator {
        Migrator::new(chain).with_lock(self.lock_key, 10)
    }

    fn manager(&self) -> SchemaManager<'_> {
        SchemaManager::new(&self.executor)
    }

    fn exec(&self, sql: &str) {
        self.executor
            .execute(sql, &[])
            .unwrap_or_else(|e| panic!("{sql}: {e}"));
    }

    fn count(&self, sql: &str) -> i64 {
        self.executor
            .query_scalar_i64(sql, &[])
            .unwrap_or_else(|e| panic!("{sql}: {e}"))
    }

    fn strings(&self, sql: &str) -> Vec<String> {
        self.executor
            .query_all(sql, &[])
            .unwrap_or_else(|e| panic!("{sql}: {e}"))
            .iter()
            .map(|row| row.get_string(0).unwrap())
            .collect()
    }

    fn snapshot(&self) -> SchemaSnapshot {
        SchemaSnapshot::capture(&self.manager(), "ledgerline_migrations").unwrap()
    }
}

impl Drop for TestSchema {
    fn drop(&mut self) {
        let _ = self
            .executor
            .execute(&format!("DROP SCHEMA IF EXISTS {} CASCADE", self.name), &[]);
    }
}

fn header(id: &str, predecessor: Option<&str>) -> StepHeader {
    StepHeader::new(id, predecessor)
}

const CREATE_BASE: &str = "m20240101000001_create_base";
const ADD_COLUMN_NULLABLE: &str = "m20240101000002_add_column_nullable";
const BACKFILL: &str = "m20240101000003_backfill";
const MAKE_REQUIRED: &str = "m20240101000004_make_required";
const DROP_LEGACY: &str = "m20240101000005_drop_legacy";

fn column_chain() -> MigrationChain {
    let steps: Vec<Box<dyn Migration>> = vec![
        Box::new(
            SqlMigration::new(CREATE_BASE, None)
                .forward(
                    "CREATE TABLE IF NOT EXISTS payees (id BIGSERIAL PRIMARY KEY, legacy_name TEXT NOT NULL)",
                )
                .forward(
                    "INSERT INTO payees (legacy_name) VALUES ('Corner Grocer'), ('City Power'), ('Rent')",
                )
                .backward("DROP TABLE IF EXISTS payees"),
        ),
        Box::new(AddColumn::new(
            header(ADD_COLUMN_NULLABLE, Some(CREATE_BASE)),
            "payees",
            "display_name",
            "TEXT",
        )),
        Box::new(Backfill::new(
            header(BACKFILL, Some(ADD_COLUMN_NULLABLE)),
            "payees",
            "display_name",
            "legacy_name",
        )),
        Box::new(RequireColumn::new(
            header(MAKE_REQUIRED, Some(BACKFILL)),
            "payees",
            "display_name",
        )),
        Box::new(DropColumn::new(
            header(DROP_LEGACY, Some(MAKE_REQUIRED)),
            "payees",
            "legacy_name",
            ColumnRestore {
                definition: "TEXT".to_string(),
                expression: Some("display_name".to_string()),
                required: true,
            },
        )),
    ];
    MigrationChain::resolve(steps).unwrap()
}

#[test]
fn test_column_replacement_applies_and_reverts() {
    let Some(db) = TestSchema::open() else { return };
    let migrator = db.migrator(column_chain());
    let manager = db.manager();

    let report = migrator.apply_latest(&db.executor).unwrap();
    assert_eq!(report.count(), 5);
    assert!(!manager.column_exists("payees", "legacy_name").unwrap());
    assert_eq!(
        manager.column_is_nullable("payees", "display_name").unwrap(),
        Some(false)
    );
    assert_eq!(manager.count_nulls("payees", "display_name").unwrap(), 0);

    migrator.revert_to(&db.executor, ADD_COLUMN_NULLABLE).unwrap();
    assert_eq!(
        migrator.head(&db.executor).unwrap().as_deref(),
        Some(ADD_COLUMN_NULLABLE)
    );
    assert_eq!(
        db.strings("SELECT legacy_name FROM payees ORDER BY id"),
        vec!["Corner Grocer", "City Power", "Rent"]
    );
    assert_eq!(
        manager.column_is_nullable("payees", "legacy_name").unwrap(),
        Some(false)
    );
    // still applied, so the column stays but holds nothing
    assert_eq!(
        manager.column_is_nullable("payees", "display_name").unwrap(),
        Some(true)
    );
    assert_eq!(manager.count_nulls("payees", "display_name").unwrap(), 3);

    migrator.revert_to(&db.executor, CREATE_BASE).unwrap();
    assert!(!manager.column_exists("payees", "display_name").unwrap());
}

#[test]
fn test_apply_latest_twice_is_a_no_op() {
    let Some(db) = TestSchema::open() else { return };
    let migrator = db.migrator(column_chain());

    migrator.apply_latest(&db.executor).unwrap();
    let second = migrator.apply_latest(&db.executor).unwrap();
    assert_eq!(second.count(), 0);
    assert_eq!(db.count("SELECT COUNT(*) FROM ledgerline_migrations"), 5);
    assert_eq!(db.count("SELECT COUNT(*) FROM payees"), 3);
}

#[test]
fn test_failed_step_halts_and_keeps_earlier_steps() {
    let Some(db) = TestSchema::open() else { return };
    let steps: Vec<Box<dyn Migration>> = vec![
        Box::new(
            SqlMigration::new(CREATE_BASE, None)
                .forward("CREATE TABLE payees (id BIGSERIAL PRIMARY KEY, legacy_name TEXT)")
                .forward("INSERT INTO payees (legacy_name) VALUES ('Rent'), (NULL)")
                .backward("DROP TABLE payees"),
        ),
        Box::new(AddColumn::new(
            header(ADD_COLUMN_NULLABLE, Some(CREATE_BASE)),
            "payees",
            "display_name",
            "TEXT",
        )),
        Box::new(Backfill::new(
            header(BACKFILL, Some(ADD_COLUMN_NULLABLE)),
            "payees",
            "display_name",
            "legacy_name",
        )),
    ];
    let migrator = db.migrator(MigrationChain::resolve(steps).unwrap());

    let err = migrator.apply_latest(&db.executor).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::DataIntegrity);
    assert_eq!(
        migrator.head(&db.executor).unwrap().as_deref(),
        Some(ADD_COLUMN_NULLABLE)
    );
    // the backfill's UPDATE was rolled back with the failed step
    assert_eq!(db.manager().count_nulls("payees", "display_name").unwrap(), 2);
}

const CREATE_GRADES: &str = "m20240201000001_create_grades";
const REMOVE_C: &str = "m20240201000002_remove_c";

fn grade_chain(removed: &str) -> MigrationChain {
    let steps: Vec<Box<dyn Migration>> = vec![
        Box::new(
            SqlMigration::new(CREATE_GRADES, None)
                .forward(EnumType::new("grade", ["A", "B", "C"]).create_sql())
                .forward("CREATE TABLE graded (id BIGSERIAL PRIMARY KEY, grade grade NOT NULL DEFAULT 'B')")
                .forward("INSERT INTO graded (grade) SELECT 'B' FROM generate_series(1, 10)")
                .backward("DROP TABLE graded")
                .backward("DROP TYPE grade"),
        ),
        Box::new(RemoveEnumValue::new(
            header(REMOVE_C, Some(CREATE_GRADES)),
            "grade",
            removed,
        )),
    ];
    MigrationChain::resolve(steps).unwrap()
}

#[test]
fn test_remove_unused_enum_value_keeps_rows() {
    let Some(db) = TestSchema::open() else { return };
    let migrator = db.migrator(grade_chain("C"));

    migrator.apply_latest(&db.executor).unwrap();

    let grade = EnumType::load(&db.manager(), "grade").unwrap().unwrap();
    assert_eq!(grade.values, vec!["A", "B"]);
    assert_eq!(db.count("SELECT COUNT(*) FROM graded WHERE grade = 'B'"), 10);
    assert_eq!(
        db.strings("SELECT udt_name::text FROM information_schema.columns WHERE table_schema = current_schema() AND table_name = 'graded' AND column_name = 'grade'"),
        vec!["grade"]
    );
    assert_eq!(
        db.strings("SELECT column_default::text FROM information_schema.columns WHERE table_schema = current_schema() AND table_name = 'graded' AND column_name = 'grade'"),
        vec!["'B'::grade"]
    );

    migrator.revert_to(&db.executor, CREATE_GRADES).unwrap();
    let grade = EnumType::load(&db.manager(), "grade").unwrap().unwrap();
    assert_eq!(grade.values, vec!["A", "B", "C"]);
}

#[test]
fn test_remove_stored_enum_value_fails_without_changes() {
    let Some(db) = TestSchema::open() else { return };
    let migrator = db.migrator(grade_chain("B"));
    migrator.apply_to(&db.executor, CREATE_GRADES).unwrap();
    let before = db.snapshot();

    let err = migrator.apply_latest(&db.executor).unwrap_err();
    assert!(matches!(err.root(), MigrationError::DataIntegrity(_)));
    assert_eq!(db.snapshot(), before);
    assert_eq!(
        migrator.head(&db.executor).unwrap().as_deref(),
        Some(CREATE_GRADES)
    );
}

#[test]
fn test_ledger_chain_round_trip_restores_schema() {
    let _serial = LEDGER_CHAIN.lock().unwrap_or_else(|e| e.into_inner());
    let Some(db) = TestSchema::open() else { return };
    let migrator = db.migrator(ledger::chain().unwrap());

    migrator.apply_latest(&db.executor).unwrap();
    let latest = db.snapshot();

    migrator
        .revert_to(&db.executor, ledger::m20240401000001_create_account_types::ID)
        .unwrap();
    let before_conversion = db.snapshot();
    assert!(before_conversion.tables["accounts"].contains_key("account_type"));
    assert!(!before_conversion.tables["accounts"].contains_key("account_type_id"));

    migrator.revert_to(&db.executor, BASE).unwrap();
    assert!(db.snapshot().is_empty());
    assert_eq!(migrator.head(&db.executor).unwrap(), None);

    migrator.apply_latest(&db.executor).unwrap();
    let diff = latest.diff(&db.snapshot());
    assert!(diff.is_empty(), "schema drifted: {diff:#?}");
}

#[test]
fn test_ledger_chain_migrates_existing_rows() {
    let _serial = LEDGER_CHAIN.lock().unwrap_or_else(|e| e.into_inner());
    let Some(db) = TestSchema::open() else { return };
    let migrator = db.migrator(ledger::chain().unwrap());

    migrator
        .apply_to(
            &db.executor,
            ledger::m20240315000001_add_review_status_needs_receipt::ID,
        )
        .unwrap();

    db.exec(
        "INSERT INTO financial_institutions (id, name, is_active) VALUES \
         ('00000000-0000-0000-0000-0000000000a1', 'First Local', TRUE), \
         ('00000000-0000-0000-0000-0000000000a2', 'Closed Savings & Loan', FALSE)",
    );
    db.exec(
        "INSERT INTO accounts (id, institution_id, name, account_type, currency) VALUES \
         ('00000000-0000-0000-0000-0000000000b1', '00000000-0000-0000-0000-0000000000a1', 'Everyday', 'checking', 'USD'), \
         ('00000000-0000-0000-0000-0000000000b2', '00000000-0000-0000-0000-0000000000a2', 'Rainy Day', 'savings', 'USD')",
    );
    db.exec(
        "INSERT INTO transactions (id, account_id, amount, currency, date, description, memo, review_status) VALUES \
         ('00000000-0000-0000-0000-0000000000c1', '00000000-0000-0000-0000-0000000000b1', -120.50, 'USD', '2024-03-02', 'Weekly shop', 'split below', 'flagged')",
    );
    db.exec(
        "INSERT INTO transactions (id, account_id, parent_id, amount, currency, date, description) VALUES \
         ('00000000-0000-0000-0000-0000000000c2', '00000000-0000-0000-0000-0000000000b1', '00000000-0000-0000-0000-0000000000c1', -80.50, 'USD', '2024-03-02', 'Groceries'), \
         ('00000000-0000-0000-0000-0000000000c3', '00000000-0000-0000-0000-0000000000b1', '00000000-0000-0000-0000-0000000000c1', -40.00, 'USD', '2024-03-02', 'Household')",
    );

    let report = migrator.apply_latest(&db.executor).unwrap();
    assert_eq!(report.count(), 7);

    assert_eq!(
        db.strings("SELECT review_status::text FROM transactions WHERE parent_id IS NULL"),
        vec!["needs_receipt"]
    );
    let review_status = EnumType::load(&db.manager(), "review_status").unwrap().unwrap();
    assert_eq!(review_status.values, vec!["pending", "reviewed", "needs_receipt"]);

    assert_eq!(
        db.strings(
            "SELECT t.code::text FROM accounts a JOIN account_types t ON t.id = a.account_type_id ORDER BY a.name"
        ),
        vec!["checking", "savings"]
    );
    assert!(!db.manager().type_exists("account_type_kind").unwrap());

    assert_eq!(
        db.strings("SELECT name::text FROM financial_institutions WHERE deleted_at IS NOT NULL"),
        vec!["Closed Savings & Loan"]
    );
    assert!(!db.manager().column_exists("financial_institutions", "is_active").unwrap());
    assert_eq!(
        db.strings("SELECT notes::text FROM transactions WHERE notes IS NOT NULL"),
        vec!["split below"]
    );

    // splits stay one level deep
    let nested = db.executor.execute(
        "INSERT INTO transactions (account_id, parent_id, amount, currency, date) VALUES \
         ('00000000-0000-0000-0000-0000000000b1', '00000000-0000-0000-0000-0000000000c2', -1, 'USD', '2024-03-02')",
        &[],
    );
    assert!(nested.is_err());
    let zero = db.executor.execute(
        "INSERT INTO transactions (account_id, amount, currency, date) VALUES \
         ('00000000-0000-0000-0000-0000000000b1', 0, 'USD', '2024-03-02')",
        &[],
    );
    assert!(zero.is_err());
}

#[test]
fn test_enum_rebuild_ignores_soft_deleted_duplicates() {
    let _serial = LEDGER_CHAIN.lock().unwrap_or_else(|e| e.into_inner());
    let Some(db) = TestSchema::open() else { return };
    let migrator = db.migrator(ledger::chain().unwrap());

    migrator.apply_latest(&db.executor).unwrap();
    db.exec(
        "INSERT INTO account_types (code, name, sort_order, deleted_at) \
         VALUES ('checking', 'Legacy Checking', 99, now())",
    );
    assert_eq!(
        db.count("SELECT COUNT(*) FROM account_types WHERE code = 'checking'"),
        2
    );

    migrator
        .revert_to(&db.executor, ledger::m20240401000001_create_account_types::ID)
        .unwrap();

    let rebuilt = EnumType::load(&db.manager(), "account_type_kind")
        .unwrap()
        .unwrap();
    assert_eq!(
        rebuilt.values,
        vec!["checking", "savings", "credit_card", "investment", "loan", "cash"]
    );
}
