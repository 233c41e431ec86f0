use crate::migration::{AddSoftDelete, StepHeader};

pub const ID: &str = "m20240410000001_add_institution_soft_delete";

pub fn migration() -> AddSoftDelete {
    AddSoftDelete::new(
        StepHeader::new(ID, Some(super::m20240401000002_convert_account_type_to_fk::ID))
            .describe("Add financial_institutions.deleted_at derived from is_active"),
        "financial_institutions",
    )
}
