use crate::migration::{AddEnumValue, StepHeader};

pub const ID: &str = "m20240315000001_add_review_status_needs_receipt";

pub fn migration() -> AddEnumValue {
    AddEnumValue::new(
        StepHeader::new(ID, Some(super::m20240301000005_create_transaction_tags::ID))
            .describe("Add review_status value needs_receipt"),
        "review_status",
        "needs_receipt",
    )
}
