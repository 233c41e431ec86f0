//! Schema history of the ledger database
//!
//! One file per step, named after the step id. New steps are scaffolded with
//! `ledgerline-migrate generate <name>` and appended to [`migrations`].

use crate::migration::{Migration, MigrationChain, MigrationError, MigrationRegistry};

pub mod m20240301000001_create_reference_types;
pub mod m20240301000002_create_financial_institutions;
pub mod m20240301000003_create_accounts;
pub mod m20240301000004_create_transactions;
pub mod m20240301000005_create_transaction_tags;
pub mod m20240315000001_add_review_status_needs_receipt;
pub mod m20240315000002_remove_review_status_flagged;
pub mod m20240401000001_create_account_types;
pub mod m20240401000002_convert_account_type_to_fk;
pub mod m20240410000001_add_institution_soft_delete;
pub mod m20240410000002_drop_institution_active_flag;
pub mod m20240420000001_rename_transaction_memo;

/// Every ledger step, in no particular order
pub fn migrations() -> Vec<Box<dyn Migration>> {
    vec![
        Box::new(m20240301000001_create_reference_types::migration()),
        Box::new(m20240301000002_create_financial_institutions::migration()),
        Box::new(m20240301000003_create_accounts::migration()),
        Box::new(m20240301000004_create_transactions::migration()),
        Box::new(m20240301000005_create_transaction_tags::CreateTransactionTags),
        Box::new(m20240315000001_add_review_status_needs_receipt::migration()),
        Box::new(m20240315000002_remove_review_status_flagged::migration()),
        Box::new(m20240401000001_create_account_types::migration()),
        Box::new(m20240401000002_convert_account_type_to_fk::migration()),
        Box::new(m20240410000001_add_institution_soft_delete::migration()),
        Box::new(m20240410000002_drop_institution_active_flag::migration()),
        Box::new(m20240420000001_rename_transaction_memo::migration()),
    ]
}

/// The resolved ledger chain
///
/// # Errors
///
/// Returns `MigrationError::AlreadyRegistered` or a chain error if the step
/// declarations are inconsistent.
pub fn chain() -> Result<MigrationChain, MigrationError> {
    let mut registry = MigrationRegistry::new();
    registry.register_all(migrations())?;
    registry.into_chain()
}
