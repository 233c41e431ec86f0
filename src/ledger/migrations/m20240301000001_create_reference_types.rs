//! Closed-set types shared by the ledger tables, plus the helpers the
//! later steps depend on

use crate::migration::{EnumType, SqlMigration};

pub const ID: &str = "m20240301000001_create_reference_types";

pub const ACCOUNT_TYPE_KINDS: [&str; 6] = [
    "checking",
    "savings",
    "credit_card",
    "investment",
    "loan",
    "cash",
];

pub const INITIAL_REVIEW_STATUSES: [&str; 3] = ["pending", "reviewed", "flagged"];

pub fn migration() -> SqlMigration {
    SqlMigration::new(ID, None)
        .describe("Create account_type_kind and review_status enums")
        // Extensions are shared by every schema in the database and stay on revert
        .forward("CREATE EXTENSION IF NOT EXISTS pg_trgm WITH SCHEMA public")
        .forward(EnumType::new("account_type_kind", ACCOUNT_TYPE_KINDS).create_sql())
        .forward(EnumType::new("review_status", INITIAL_REVIEW_STATUSES).create_sql())
        .forward(
            r#"
            CREATE OR REPLACE FUNCTION touch_updated_at() RETURNS trigger AS $$
            BEGIN
                NEW.updated_at := now();
                RETURN NEW;
            END;
            $$ LANGUAGE plpgsql
            "#,
        )
        .backward("DROP FUNCTION IF EXISTS touch_updated_at()")
        .backward("DROP TYPE IF EXISTS review_status")
        .backward("DROP TYPE IF EXISTS account_type_kind")
}
