//! `flagged` is superseded by `needs_receipt`; rows holding it are moved over
//! before the type is shrunk.

use crate::migration::{RemoveEnumValue, StepHeader, ValuePosition};

pub const ID: &str = "m20240315000002_remove_review_status_flagged";

pub fn migration() -> RemoveEnumValue {
    RemoveEnumValue::new(
        StepHeader::new(
            ID,
            Some(super::m20240315000001_add_review_status_needs_receipt::ID),
        )
        .describe("Remove review_status value flagged"),
        "review_status",
        "flagged",
    )
    .remap_to("needs_receipt")
    .restore_at(ValuePosition::Before("needs_receipt".to_string()))
}
