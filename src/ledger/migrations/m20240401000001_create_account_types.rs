//! Account types as reference data, seeded from the enum they replace

use crate::migration::SqlMigration;

pub const ID: &str = "m20240401000001_create_account_types";

pub fn migration() -> SqlMigration {
    SqlMigration::new(
        ID,
        Some(super::m20240315000002_remove_review_status_flagged::ID),
    )
    .describe("Create account_types lookup table seeded from account_type_kind")
    .forward(
        r#"
        CREATE TABLE IF NOT EXISTS account_types (
            id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
            code VARCHAR(64) NOT NULL,
            name VARCHAR(255) NOT NULL,
            sort_order INTEGER NOT NULL,
            created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
            updated_at TIMESTAMPTZ NOT NULL DEFAULT now(),
            deleted_at TIMESTAMPTZ
        )
        "#,
    )
    .forward(
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_account_types_code_live \
         ON account_types (code) WHERE deleted_at IS NULL",
    )
    .forward(
        r#"
        INSERT INTO account_types (code, name, sort_order)
        SELECT e.enumlabel,
               initcap(replace(e.enumlabel, '_', ' ')),
               (row_number() OVER (ORDER BY e.enumsortorder))::int
        FROM pg_enum e
        JOIN pg_type t ON t.oid = e.enumtypid
        JOIN pg_namespace n ON n.oid = t.typnamespace
        WHERE n.nspname = current_schema() AND t.typname = 'account_type_kind'
        ON CONFLICT (code) WHERE deleted_at IS NULL DO NOTHING
        "#,
    )
    .forward("DROP TRIGGER IF EXISTS trg_account_types_touch ON account_types")
    .forward(
        "CREATE TRIGGER trg_account_types_touch BEFORE UPDATE ON account_types \
         FOR EACH ROW EXECUTE FUNCTION touch_updated_at()",
    )
    .backward("DROP TABLE IF EXISTS account_types")
}
