//! The personal-finance ledger: domain types and the schema history
//! backing them

pub mod migrations;
pub mod model;

pub use model::{
    validate_split, CurrencyCode, LedgerError, LedgerRecord, Liveness, LookupEntity, Money,
    ReviewStatus,
};
