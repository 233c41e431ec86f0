//! Banks and brokers holding accounts

use crate::migration::SqlMigration;

pub const ID: &str = "m20240301000002_create_financial_institutions";

pub fn migration() -> SqlMigration {
    SqlMigration::new(ID, Some(super::m20240301000001_create_reference_types::ID))
        .describe("Create financial_institutions")
        .forward(
            r#"
            CREATE TABLE IF NOT EXISTS financial_institutions (
                id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
                name VARCHAR(255) NOT NULL,
                website TEXT,
                is_active BOOLEAN NOT NULL DEFAULT TRUE,
                created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
                updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
            )
            "#,
        )
        .forward(
            "CREATE UNIQUE INDEX IF NOT EXISTS idx_financial_institutions_name \
             ON financial_institutions (lower(name))",
        )
        .forward("DROP TRIGGER IF EXISTS trg_financial_institutions_touch ON financial_institutions")
        .forward(
            "CREATE TRIGGER trg_financial_institutions_touch BEFORE UPDATE ON financial_institutions \
             FOR EACH ROW EXECUTE FUNCTION touch_updated_at()",
        )
        .backward("DROP TABLE IF EXISTS financial_institutions")
}
