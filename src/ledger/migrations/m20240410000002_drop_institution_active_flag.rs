use crate::migration::{DropActiveFlag, StepHeader};

pub const ID: &str = "m20240410000002_drop_institution_active_flag";

pub fn migration() -> DropActiveFlag {
    DropActiveFlag::new(
        StepHeader::new(ID, Some(super::m20240410000001_add_institution_soft_delete::ID))
            .describe("Drop financial_institutions.is_active"),
        "financial_institutions",
    )
}
