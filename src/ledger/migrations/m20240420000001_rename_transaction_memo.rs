use crate::migration::{RenameColumn, StepHeader};

pub const ID: &str = "m20240420000001_rename_transaction_memo";

pub fn migration() -> RenameColumn {
    RenameColumn::new(
        StepHeader::new(ID, Some(super::m20240410000002_drop_institution_active_flag::ID))
            .describe("Rename transactions.memo to notes"),
        "transactions",
        "memo",
        "notes",
    )
}
