//! Accounts held at an institution

use crate::migration::SqlMigration;

pub const ID: &str = "m20240301000003_create_accounts";

pub fn migration() -> SqlMigration {
    SqlMigration::new(
        ID,
        Some(super::m20240301000002_create_financial_institutions::ID),
    )
    .describe("Create accounts")
    .forward(
        r#"
        CREATE TABLE IF NOT EXISTS accounts (
            id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
            institution_id UUID REFERENCES financial_institutions(id) ON DELETE RESTRICT,
            name VARCHAR(255) NOT NULL,
            account_type account_type_kind NOT NULL,
            currency CHAR(3) NOT NULL,
            opening_balance NUMERIC(19, 4) NOT NULL DEFAULT 0,
            created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
            updated_at TIMESTAMPTZ NOT NULL DEFAULT now(),
            deleted_at TIMESTAMPTZ,
            created_by UUID,
            updated_by UUID,
            CONSTRAINT accounts_currency_format CHECK (currency ~ '^[A-Z]{3}$')
        )
        "#,
    )
    .forward(
        "CREATE INDEX IF NOT EXISTS idx_accounts_institution_id ON accounts (institution_id) \
         WHERE deleted_at IS NULL",
    )
    .forward("DROP TRIGGER IF EXISTS trg_accounts_touch ON accounts")
    .forward(
        "CREATE TRIGGER trg_accounts_touch BEFORE UPDATE ON accounts \
         FOR EACH ROW EXECUTE FUNCTION touch_updated_at()",
    )
    .backward("DROP TABLE IF EXISTS accounts")
}
