//! `accounts.account_type` becomes `accounts.account_type_id`

use crate::migration::{EnumToForeignKey, LinkSpec, StepHeader};

pub const ID: &str = "m20240401000002_convert_account_type_to_fk";

pub fn migration() -> EnumToForeignKey {
    let mut spec = LinkSpec::new("accounts", "account_type", "account_type_kind", "account_types");
    spec.lookup_deleted_column = Some("deleted_at".to_string());
    spec.lookup_order_column = Some("sort_order".to_string());

    EnumToForeignKey::new(
        StepHeader::new(ID, Some(super::m20240401000001_create_account_types::ID))
            .describe("Replace accounts.account_type with a link to account_types"),
        spec,
    )
}
