//! Ledger records with single-level splits
//!
//! A split row points at its parent through `parent_id`. The CHECK stops a
//! row from parenting itself; the trigger keeps the hierarchy one level deep
//! and the currencies of a split aligned with its parent.

use crate::migration::SqlMigration;

pub const ID: &str = "m20240301000004_create_transactions";

const SPLIT_TRIGGER_FUNCTION: &str = r#"
    CREATE OR REPLACE FUNCTION enforce_single_level_split() RETURNS trigger AS $$
    DECLARE
        parent transactions%ROWTYPE;
    BEGIN
        IF NEW.parent_id IS NOT NULL THEN
            SELECT * INTO parent FROM transactions WHERE id = NEW.parent_id;
            IF FOUND THEN
                IF parent.parent_id IS NOT NULL THEN
                    RAISE EXCEPTION 'transaction % cannot split %, which is itself a split',
                        NEW.id, NEW.parent_id USING ERRCODE = 'check_violation';
                END IF;
                IF parent.currency <> NEW.currency THEN
                    RAISE EXCEPTION 'split % must use the currency of its parent %',
                        NEW.id, NEW.parent_id USING ERRCODE = 'check_violation';
                END IF;
            END IF;
            IF EXISTS (SELECT 1 FROM transactions WHERE parent_id = NEW.id) THEN
                RAISE EXCEPTION 'transaction % has splits and cannot become a split',
                    NEW.id USING ERRCODE = 'check_violation';
            END IF;
        END IF;
        RETURN NEW;
    END;
    $$ LANGUAGE plpgsql
"#;

pub fn migration() -> SqlMigration {
    SqlMigration::new(ID, Some(super::m20240301000003_create_accounts::ID))
        .describe("Create transactions with split hierarchy and search index")
        .forward(
            r#"
            CREATE TABLE IF NOT EXISTS transactions (
                id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
                account_id UUID NOT NULL REFERENCES accounts(id) ON DELETE CASCADE,
                parent_id UUID REFERENCES transactions(id) ON DELETE CASCADE,
                amount NUMERIC(19, 4) NOT NULL,
                currency CHAR(3) NOT NULL,
                date DATE NOT NULL,
                description TEXT NOT NULL DEFAULT '',
                memo TEXT,
                review_status review_status NOT NULL DEFAULT 'pending',
                created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
                updated_at TIMESTAMPTZ NOT NULL DEFAULT now(),
                deleted_at TIMESTAMPTZ,
                created_by UUID,
                updated_by UUID,
                CONSTRAINT transactions_amount_nonzero CHECK (amount <> 0),
                CONSTRAINT transactions_currency_format CHECK (currency ~ '^[A-Z]{3}$'),
                CONSTRAINT transactions_parent_not_self CHECK (parent_id IS NULL OR parent_id <> id)
            )
            "#,
        )
        .forward(
            "CREATE INDEX IF NOT EXISTS idx_transactions_account_date \
             ON transactions (account_id, date DESC) WHERE deleted_at IS NULL",
        )
        .forward(
            "CREATE INDEX IF NOT EXISTS idx_transactions_parent_id \
             ON transactions (parent_id) WHERE parent_id IS NOT NULL",
        )
        .forward(
            "CREATE INDEX IF NOT EXISTS idx_transactions_review_status \
             ON transactions (review_status) WHERE deleted_at IS NULL",
        )
        .forward(
            "CREATE INDEX IF NOT EXISTS idx_transactions_description_trgm \
             ON transactions USING gin (description public.gin_trgm_ops)",
        )
        .forward(SPLIT_TRIGGER_FUNCTION)
        .forward("DROP TRIGGER IF EXISTS trg_transactions_single_level_split ON transactions")
        .forward(
            "CREATE TRIGGER trg_transactions_single_level_split \
             BEFORE INSERT OR UPDATE OF parent_id, currency ON transactions \
             FOR EACH ROW EXECUTE FUNCTION enforce_single_level_split()",
        )
        .forward("DROP TRIGGER IF EXISTS trg_transactions_touch ON transactions")
        .forward(
            "CREATE TRIGGER trg_transactions_touch BEFORE UPDATE ON transactions \
             FOR EACH ROW EXECUTE FUNCTION touch_updated_at()",
        )
        .backward("DROP TABLE IF EXISTS transactions")
        .backward("DROP FUNCTION IF EXISTS enforce_single_level_split()")
}
